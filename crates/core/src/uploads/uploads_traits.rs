use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::uploads_model::{
    FailedCheckIn, NewFailedCheckIn, NewQueuedRedemption, QueuedRedemptionRequest,
    UploadOutcome,
};
use crate::errors::Result;
use crate::sync::SyncEngineStatus;

/// Device-scoped upload queues and sync engine bookkeeping.
///
/// Both queues are FIFO by insertion. At most one live redemption entry
/// exists per ticket, check-in list and direction.
#[async_trait]
pub trait UploadQueueRepositoryTrait: Send + Sync {
    async fn enqueue(&self, request: NewQueuedRedemption) -> Result<QueuedRedemptionRequest>;

    /// Oldest live entry, whether or not it is due for retry.
    fn dequeue_next(&self) -> Result<Option<QueuedRedemptionRequest>>;

    fn peek_by_secret(&self, secret: &str) -> Result<Option<QueuedRedemptionRequest>>;

    fn list_pending(&self, limit: i64) -> Result<Vec<QueuedRedemptionRequest>>;

    fn pending_count(&self) -> Result<i64>;

    /// Removes the entry and records what the remote decided.
    async fn acknowledge(&self, id: i64, outcome: UploadOutcome) -> Result<()>;

    /// Keeps the entry and pushes its next attempt out with backoff.
    async fn schedule_retry(&self, id: i64, error: String) -> Result<()>;

    fn recent_outcomes(&self, limit: i64) -> Result<Vec<UploadOutcome>>;

    async fn enqueue_failed_checkin(&self, failed: NewFailedCheckIn) -> Result<FailedCheckIn>;

    fn next_failed_checkin(&self) -> Result<Option<FailedCheckIn>>;

    fn failed_checkin_count(&self) -> Result<i64>;

    async fn acknowledge_failed_checkin(&self, id: i64) -> Result<()>;

    async fn schedule_failed_checkin_retry(&self, id: i64, error: String) -> Result<()>;

    fn get_engine_status(&self) -> Result<SyncEngineStatus>;

    async fn mark_push_completed(&self) -> Result<()>;

    async fn mark_pull_completed(&self) -> Result<()>;

    async fn mark_engine_error(&self, error: String) -> Result<()>;

    /// Suspends pushing until `until`, as requested by a rate limit.
    async fn pause_until(&self, until: DateTime<Utc>) -> Result<()>;

    async fn mark_cycle_outcome(&self, status: String, duration_ms: i64) -> Result<()>;
}
