//! Background sync loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use checkin_core::events::CheckinEvent;
use checkin_core::sync::{
    SyncEngineStatus, PENDING_UPLOAD_RETRY_MS, SYNC_INTERVAL_JITTER_SECS,
};
use checkin_core::uploads::UploadQueueRepositoryTrait;

use crate::context::AgentContext;

const MIN_DELAY_MS: u64 = 1_000;

fn millis_until_rfc3339(at: &str, now: DateTime<Utc>) -> Option<u64> {
    let at = DateTime::parse_from_rfc3339(at).ok()?.with_timezone(&Utc);
    let wait = (at - now).num_milliseconds();
    (wait > 0).then_some(wait as u64)
}

fn jitter_ms(now: DateTime<Utc>) -> u64 {
    let bound = SYNC_INTERVAL_JITTER_SECS.saturating_mul(1000);
    if bound == 0 {
        return 0;
    }
    now.timestamp_millis().unsigned_abs() % bound
}

/// Delay until the next cycle.
///
/// A rate-limit pause or engine backoff wins over the regular interval.
/// Queued uploads shorten the wait while the engine is healthy.
pub fn next_delay(
    status: &SyncEngineStatus,
    pending_uploads: i64,
    interval_secs: u64,
    now: DateTime<Utc>,
    jitter_ms: u64,
) -> Duration {
    if let Some(wait_ms) = status
        .paused_until
        .as_deref()
        .and_then(|until| millis_until_rfc3339(until, now))
    {
        return Duration::from_millis(wait_ms.saturating_add(jitter_ms).max(MIN_DELAY_MS));
    }

    let mut delay_ms = interval_secs.saturating_mul(1000).saturating_add(jitter_ms);
    if let Some(wait_ms) = status
        .next_retry_at
        .as_deref()
        .and_then(|at| millis_until_rfc3339(at, now))
    {
        delay_ms = wait_ms.saturating_add(jitter_ms).max(MIN_DELAY_MS);
    }

    if pending_uploads > 0 && status.consecutive_failures == 0 {
        delay_ms = delay_ms.min(PENDING_UPLOAD_RETRY_MS + (jitter_ms % 500));
    }
    Duration::from_millis(delay_ms)
}

/// Runs sync cycles until the task is aborted. A trigger request (after a
/// local redemption) starts the next cycle early.
pub fn spawn_background_sync(context: Arc<AgentContext>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match context.sync.run_cycle().await {
                Ok(result) => debug!(
                    "[Agent] Cycle complete status={} pushed={} pulled={} failed_uploaded={}",
                    result.status.as_str(),
                    result.pushed_count,
                    result.pulled_count,
                    result.failed_uploaded
                ),
                Err(err) => warn!("[Agent] Background cycle failed: {}", err),
            }

            let now = Utc::now();
            let status = context.uploads.get_engine_status().unwrap_or_default();
            let pending = context.uploads.pending_count().unwrap_or(0);
            let delay = next_delay(
                &status,
                pending,
                context.config.checkin.sync_interval_secs,
                now,
                jitter_ms(now),
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = context.trigger.notified() => {
                    debug!("[Agent] Sync requested");
                }
            }
        }
    })
}

/// Mirrors engine events into the log.
pub fn spawn_event_logger(mut events: broadcast::Receiver<CheckinEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(CheckinEvent::SyncFailed { message }) => {
                    warn!("[Agent] Sync failed: {}", message)
                }
                Ok(event) => debug!("[Agent] Event {:?}", event),
                Err(RecvError::Lagged(skipped)) => {
                    debug!("[Agent] Event log skipped {} events", skipped)
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-05-02T10:00:00Z")
            .expect("rfc3339")
            .with_timezone(&Utc)
    }

    #[test]
    fn idle_engine_waits_the_interval_plus_jitter() {
        let delay = next_delay(&SyncEngineStatus::default(), 0, 45, now(), 1_200);
        assert_eq!(delay, Duration::from_millis(46_200));
    }

    #[test]
    fn queued_uploads_retry_quickly_while_healthy() {
        let delay = next_delay(&SyncEngineStatus::default(), 3, 45, now(), 1_200);
        assert_eq!(delay, Duration::from_millis(PENDING_UPLOAD_RETRY_MS + 200));
    }

    #[test]
    fn backoff_is_not_shortened_by_pending_uploads() {
        let status = SyncEngineStatus {
            consecutive_failures: 2,
            next_retry_at: Some((now() + ChronoDuration::seconds(20)).to_rfc3339()),
            ..SyncEngineStatus::default()
        };
        let delay = next_delay(&status, 3, 45, now(), 0);
        assert_eq!(delay, Duration::from_secs(20));
    }

    #[test]
    fn rate_limit_pause_wins() {
        let status = SyncEngineStatus {
            paused_until: Some((now() + ChronoDuration::seconds(90)).to_rfc3339()),
            ..SyncEngineStatus::default()
        };
        let delay = next_delay(&status, 5, 45, now(), 0);
        assert_eq!(delay, Duration::from_secs(90));
    }

    #[test]
    fn past_deadlines_are_ignored() {
        let status = SyncEngineStatus {
            paused_until: Some((now() - ChronoDuration::seconds(5)).to_rfc3339()),
            next_retry_at: Some((now() - ChronoDuration::seconds(5)).to_rfc3339()),
            ..SyncEngineStatus::default()
        };
        let delay = next_delay(&status, 0, 10, now(), 0);
        assert_eq!(delay, Duration::from_secs(10));
    }
}
