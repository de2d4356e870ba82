//! Runtime configuration for validation and sync behaviour.

use serde::{Deserialize, Serialize};

use crate::sync::DEFAULT_SYNC_INTERVAL_SECS;

/// Default delay before a typeahead search is sent.
pub const DEFAULT_SEARCH_DEBOUNCE_MS: u64 = 300;

/// Default page size requested from the remote authority.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CheckinConfig {
    /// Validate against the local catalog instead of calling the remote per scan.
    pub offline_mode: bool,
    /// Download orders and positions. When off, offline validation is dataless.
    pub download_orders: bool,
    /// Signal the sync engine after every local redemption decision.
    pub auto_sync: bool,
    /// Queue local rejections for upload to the remote audit log.
    pub report_failed_checkins: bool,
    pub sync_interval_secs: u64,
    pub search_debounce_ms: u64,
    pub page_size: u32,
}

impl Default for CheckinConfig {
    fn default() -> Self {
        Self {
            offline_mode: false,
            download_orders: true,
            auto_sync: true,
            report_failed_checkins: true,
            sync_interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            search_debounce_ms: DEFAULT_SEARCH_DEBOUNCE_MS,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}
