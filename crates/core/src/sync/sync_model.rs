//! Sync cursors, page requests and cycle reporting.

use serde::{Deserialize, Serialize};

/// Catalog resources tracked by the pull loop, in pull order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Event,
    Items,
    Questions,
    CheckInLists,
    Orders,
    RevokedSecrets,
    BlockedSecrets,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 7] = [
        ResourceKind::Event,
        ResourceKind::Items,
        ResourceKind::Questions,
        ResourceKind::CheckInLists,
        ResourceKind::Orders,
        ResourceKind::RevokedSecrets,
        ResourceKind::BlockedSecrets,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Items => "items",
            Self::Questions => "questions",
            Self::CheckInLists => "checkinlists",
            Self::Orders => "orders",
            Self::RevokedSecrets => "revokedsecrets",
            Self::BlockedSecrets => "blockedsecrets",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }

    /// URL segment below the event, `None` for the event itself.
    pub fn path_segment(&self) -> Option<&'static str> {
        match self {
            Self::Event => None,
            other => Some(other.as_str()),
        }
    }

    /// Fetched whole and guarded by `If-Modified-Since`.
    pub fn is_conditional(&self) -> bool {
        matches!(
            self,
            Self::Event | Self::Items | Self::Questions | Self::CheckInLists
        )
    }

    /// Query parameter carrying the incremental watermark.
    pub fn since_param(&self) -> Option<&'static str> {
        match self {
            Self::Orders => Some("modified_since"),
            Self::RevokedSecrets => Some("created_since"),
            Self::BlockedSecrets => Some("updated_since"),
            _ => None,
        }
    }

    /// Full fetches walk by creation time; incremental ones by last change.
    pub fn ordering(&self, incremental: bool) -> Option<&'static str> {
        match (self, incremental) {
            (Self::Orders, false) => Some("datetime"),
            (Self::Orders, true) => Some("-last_modified"),
            _ => None,
        }
    }
}

/// Pull watermark for one resource of one event.
///
/// While a multi-page fetch is running, `next_page` and `in_progress_since`
/// say where to resume. `page_generation_timestamp` is the server time of the
/// first page and becomes `last_modified_token` once the last page merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCursor {
    pub resource: ResourceKind,
    pub last_modified_token: Option<String>,
    pub page_generation_timestamp: Option<String>,
    pub next_page: Option<u32>,
    pub in_progress_since: Option<String>,
}

impl SyncCursor {
    pub fn new(resource: ResourceKind) -> Self {
        Self {
            resource,
            last_modified_token: None,
            page_generation_timestamp: None,
            next_page: None,
            in_progress_since: None,
        }
    }

    pub fn is_resuming(&self) -> bool {
        self.next_page.is_some()
    }

    /// Cursor after a page that has more pages behind it.
    pub fn advanced(&self, next_page: u32, since: Option<String>, generation: Option<String>) -> Self {
        Self {
            resource: self.resource,
            last_modified_token: self.last_modified_token.clone(),
            page_generation_timestamp: generation,
            next_page: Some(next_page),
            in_progress_since: since,
        }
    }

    /// Cursor after the last page; the generation becomes the new watermark.
    pub fn completed(&self, generation: Option<String>) -> Self {
        Self {
            resource: self.resource,
            last_modified_token: generation
                .clone()
                .or_else(|| self.last_modified_token.clone()),
            page_generation_timestamp: generation,
            next_page: None,
            in_progress_since: None,
        }
    }
}

/// One page to fetch from the remote authority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub resource: ResourceKind,
    pub page: u32,
    pub page_size: u32,
    /// Value for the resource's `since_param`.
    pub since: Option<String>,
    pub ordering: Option<&'static str>,
    pub if_modified_since: Option<String>,
}

/// A fetched page of raw records.
#[derive(Debug, Clone, PartialEq)]
pub struct RemotePage {
    pub results: Vec<serde_json::Value>,
    pub has_next: bool,
    /// `X-Page-Generated` header.
    pub generated_at: Option<String>,
    /// `Last-Modified` header.
    pub last_modified: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PageFetch {
    /// HTTP 304: nothing changed since `If-Modified-Since`.
    NotModified,
    Page(RemotePage),
}

/// Persisted engine bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncEngineStatus {
    pub last_push_at: Option<String>,
    pub last_pull_at: Option<String>,
    pub last_error: Option<String>,
    pub consecutive_failures: i32,
    pub next_retry_at: Option<String>,
    pub paused_until: Option<String>,
    pub last_cycle_status: Option<String>,
    pub last_cycle_duration_ms: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncCycleStatus {
    Ok,
    /// Push stopped early; entries stay queued for the next cycle.
    Deferred,
    Cancelled,
    Failed,
    /// Another cycle was already running.
    Skipped,
}

impl SyncCycleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Deferred => "deferred",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushReport {
    pub uploaded: usize,
    pub rejected: usize,
    pub failed_uploaded: usize,
    pub remaining: i64,
    /// Why draining stopped before the queue was empty.
    pub stopped: Option<String>,
    pub skipped: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullReport {
    pub records: usize,
    pub resources: Vec<ResourceKind>,
    pub cancelled: bool,
    pub skipped: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCycleResult {
    pub status: SyncCycleStatus,
    pub pushed_count: usize,
    pub pulled_count: usize,
    pub failed_uploaded: usize,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_completion_promotes_generation() {
        let cursor = SyncCursor::new(ResourceKind::Orders);
        let mid = cursor.advanced(2, None, Some("2026-01-01T10:00:00Z".to_string()));
        assert!(mid.is_resuming());
        assert_eq!(mid.last_modified_token, None);

        let done = mid.completed(mid.page_generation_timestamp.clone());
        assert!(!done.is_resuming());
        assert_eq!(done.last_modified_token.as_deref(), Some("2026-01-01T10:00:00Z"));
    }

    #[test]
    fn resource_names_round_trip() {
        for kind in ResourceKind::ALL {
            assert_eq!(ResourceKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ResourceKind::Event.path_segment(), None);
        assert_eq!(ResourceKind::Orders.ordering(true), Some("-last_modified"));
    }
}
