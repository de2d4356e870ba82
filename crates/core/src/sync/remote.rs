//! Contract of the remote check-in authority.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::sync_model::{PageFetch, PageRequest};
use super::sync_policy::{classify_http_status, RetryClass};
use crate::catalog::{CheckInListStatus, OrderPosition, Question, SearchResult};
use crate::redemption::{ErrorReason, RedemptionStatus};
use crate::uploads::{FailedCheckInUpload, RedeemRequestBody};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// No connectivity, timeout, TLS failure.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Rate limited, retry after {0:?}")]
    RateLimited(Duration),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

impl RemoteError {
    pub fn retry_class(&self) -> RetryClass {
        match self {
            Self::Transport(_) | Self::InvalidResponse(_) => RetryClass::Retryable,
            Self::Http { status, .. } => classify_http_status(*status),
            Self::RateLimited(delay) => RetryClass::RateLimited(*delay),
            Self::Unauthorized(_) => RetryClass::ReauthRequired,
        }
    }

    /// Reason recorded when the remote refuses a queued request for good.
    pub fn rejection_reason(&self) -> ErrorReason {
        match self {
            Self::Http { status: 404, .. } => ErrorReason::Invalid,
            _ => ErrorReason::Error,
        }
    }
}

/// Redeem response as returned by the remote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRedeemResponse {
    pub status: RedemptionStatus,
    #[serde(default)]
    pub reason: Option<ErrorReason>,
    #[serde(default)]
    pub reason_explanation: Option<String>,
    #[serde(default)]
    pub position: Option<serde_json::Value>,
    #[serde(default)]
    pub questions: Vec<Question>,
    #[serde(default)]
    pub require_attention: bool,
}

impl RemoteRedeemResponse {
    /// The embedded position, when it has the usual shape.
    pub fn position(&self) -> Option<OrderPosition> {
        self.position
            .clone()
            .and_then(|value| serde_json::from_value(value).ok())
    }
}

/// Device description reported after a push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub hardware_brand: String,
    pub hardware_model: String,
    pub software_brand: String,
    pub software_version: String,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            hardware_brand: std::env::consts::OS.to_string(),
            hardware_model: std::env::consts::ARCH.to_string(),
            software_brand: "checkin-agent".to_string(),
            software_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    #[serde(default, alias = "pretix")]
    pub version: Option<String>,
    #[serde(default, alias = "pretix_numeric")]
    pub numeric: Option<i64>,
}

/// The remote authority for one organizer/event, as seen by the engines.
#[async_trait]
pub trait RemoteAuthority: Send + Sync {
    async fn fetch_page(&self, request: &PageRequest) -> Result<PageFetch, RemoteError>;

    async fn redeem(
        &self,
        list_id: i64,
        secret: &str,
        body: &RedeemRequestBody,
    ) -> Result<RemoteRedeemResponse, RemoteError>;

    async fn upload_failed_checkin(
        &self,
        list_id: i64,
        upload: &FailedCheckInUpload,
    ) -> Result<(), RemoteError>;

    async fn search(&self, list_id: i64, query: &str) -> Result<Vec<SearchResult>, RemoteError>;

    async fn checkin_list_status(&self, list_id: i64) -> Result<CheckInListStatus, RemoteError>;

    async fn update_device_info(&self, info: &DeviceInfo) -> Result<(), RemoteError>;

    async fn fetch_version_info(&self) -> Result<VersionInfo, RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_errors_map_to_retry_classes() {
        assert_eq!(
            RemoteError::Transport("offline".into()).retry_class(),
            RetryClass::Retryable
        );
        assert_eq!(
            RemoteError::Http {
                status: 404,
                message: "gone".into()
            }
            .retry_class(),
            RetryClass::Permanent
        );
        assert_eq!(
            RemoteError::RateLimited(Duration::from_secs(7)).retry_class(),
            RetryClass::RateLimited(Duration::from_secs(7))
        );
    }

    #[test]
    fn redeem_response_tolerates_unknown_codes() {
        let response: RemoteRedeemResponse = serde_json::from_value(serde_json::json!({
            "status": "error",
            "reason": "something_new",
            "position": {"unexpected": true}
        }))
        .expect("decode response");
        assert_eq!(response.status, RedemptionStatus::Error);
        assert_eq!(
            response.reason,
            Some(ErrorReason::Unknown("something_new".to_string()))
        );
        assert_eq!(response.position(), None);
    }
}
