//! Scheduler constants for the background sync loop.

/// Periodic sync cadence in seconds.
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 45;

/// Maximum jitter (seconds) added to periodic cycle intervals.
pub const SYNC_INTERVAL_JITTER_SECS: u64 = 5;

/// Delay before the next cycle while uploads are still queued.
pub const PENDING_UPLOAD_RETRY_MS: u64 = 2_000;

/// Fallback pause when a rate limit carries no `Retry-After`.
pub const DEFAULT_RATE_LIMIT_SECS: u64 = 60;
