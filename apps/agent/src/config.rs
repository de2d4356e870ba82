//! Agent configuration read from `CHECKIN_*` environment variables.

use std::path::PathBuf;

use thiserror::Error;

use checkin_core::config::CheckinConfig;
use checkin_remote_api::RemoteEndpoint;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    pub endpoint: RemoteEndpoint,
    pub list_id: i64,
    pub data_dir: PathBuf,
    pub checkin: CheckinConfig,
}

impl AgentConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any name → value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let endpoint = RemoteEndpoint {
            base_url: required("CHECKIN_API_URL")?,
            device_token: required("CHECKIN_API_TOKEN")?,
            organizer: required("CHECKIN_ORGANIZER")?,
            event: required("CHECKIN_EVENT")?,
        };
        let list_id = parse_number("CHECKIN_LIST_ID", &required("CHECKIN_LIST_ID")?)?;
        let data_dir = lookup("CHECKIN_DATA_DIR")
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./checkin-data"));

        let defaults = CheckinConfig::default();
        let flag = |name: &'static str, default: bool| match lookup(name) {
            Some(value) => parse_flag(name, &value),
            None => Ok(default),
        };
        let checkin = CheckinConfig {
            offline_mode: flag("CHECKIN_OFFLINE_MODE", defaults.offline_mode)?,
            download_orders: flag("CHECKIN_DOWNLOAD_ORDERS", defaults.download_orders)?,
            auto_sync: flag("CHECKIN_AUTO_SYNC", defaults.auto_sync)?,
            report_failed_checkins: flag(
                "CHECKIN_REPORT_FAILED_CHECKINS",
                defaults.report_failed_checkins,
            )?,
            sync_interval_secs: match lookup("CHECKIN_SYNC_INTERVAL_SECS") {
                Some(value) => parse_number("CHECKIN_SYNC_INTERVAL_SECS", &value)?,
                None => defaults.sync_interval_secs,
            },
            ..defaults
        };

        Ok(Self {
            endpoint,
            list_id,
            data_dir,
            checkin,
        })
    }
}

fn parse_flag(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
        }),
    }
}

fn parse_number<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        name,
        value: value.to_string(),
    })
}
