//! Push/pull orchestration against the remote authority.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use chrono::{Duration as ChronoDuration, Utc};
use log::{debug, info, warn};
use tokio::sync::Mutex;

use super::remote::{DeviceInfo, RemoteAuthority, RemoteError, VersionInfo};
use super::sync_model::{
    PageFetch, PageRequest, PullReport, PushReport, ResourceKind, SyncCursor, SyncCycleResult,
    SyncCycleStatus,
};
use super::sync_policy::RetryClass;
use crate::catalog::{CatalogRecords, CatalogRepositoryTrait};
use crate::config::{CheckinConfig, DEFAULT_PAGE_SIZE};
use crate::errors::{Error, Result};
use crate::events::{CheckinEvent, CheckinEventSink};
use crate::redemption::RedemptionStatus;
use crate::uploads::{FailedCheckInUpload, UploadOutcome, UploadQueueRepositoryTrait};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub download_orders: bool,
    pub page_size: u32,
    pub device_info: DeviceInfo,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            download_orders: true,
            page_size: DEFAULT_PAGE_SIZE,
            device_info: DeviceInfo::default(),
        }
    }
}

impl From<&CheckinConfig> for SyncSettings {
    fn from(config: &CheckinConfig) -> Self {
        Self {
            download_orders: config.download_orders,
            page_size: config.page_size.max(1),
            device_info: DeviceInfo::default(),
        }
    }
}

/// Result of pulling one resource.
enum ResourcePull {
    Completed(usize),
    Cancelled(usize),
}

/// How one queued upload attempt ended.
enum DrainStep {
    Continue,
    Stop(String),
}

pub struct SyncEngine {
    remote: Arc<dyn RemoteAuthority>,
    catalog: Arc<dyn CatalogRepositoryTrait>,
    uploads: Arc<dyn UploadQueueRepositoryTrait>,
    events: Arc<dyn CheckinEventSink>,
    settings: SyncSettings,
    push_guard: Mutex<()>,
    pull_guard: Mutex<()>,
    cancel: Arc<AtomicBool>,
    version_info: RwLock<Option<VersionInfo>>,
}

impl SyncEngine {
    pub fn new(
        remote: Arc<dyn RemoteAuthority>,
        catalog: Arc<dyn CatalogRepositoryTrait>,
        uploads: Arc<dyn UploadQueueRepositoryTrait>,
        events: Arc<dyn CheckinEventSink>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            remote,
            catalog,
            uploads,
            events,
            settings,
            push_guard: Mutex::new(()),
            pull_guard: Mutex::new(()),
            cancel: Arc::new(AtomicBool::new(false)),
            version_info: RwLock::new(None),
        }
    }

    /// Flag observed before every page fetch, page merge and upload.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.cancel.store(false, Ordering::SeqCst);
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Last version info reported by the remote, if any.
    pub fn server_version(&self) -> Option<VersionInfo> {
        self.version_info.read().ok().and_then(|guard| guard.clone())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Push
    // ─────────────────────────────────────────────────────────────────────

    /// Drains the redemption queue, then the failed check-in queue.
    ///
    /// Single-flight: a concurrent call returns a skipped report.
    pub async fn push(&self) -> Result<PushReport> {
        let Ok(_guard) = self.push_guard.try_lock() else {
            debug!("[Sync] Push already running");
            return Ok(PushReport {
                skipped: true,
                ..PushReport::default()
            });
        };

        let mut report = PushReport::default();

        let status = self.uploads.get_engine_status()?;
        if let Some(paused_until) = status.paused_until.as_deref() {
            if let Ok(until) = chrono::DateTime::parse_from_rfc3339(paused_until) {
                if until > Utc::now() {
                    report.stopped = Some(format!("paused until {}", paused_until));
                    report.remaining = self.uploads.pending_count()?;
                    return Ok(report);
                }
            }
        }

        report.stopped = self.drain_redemptions(&mut report).await?;
        if report.stopped.is_none() {
            report.stopped = self.drain_failed_checkins(&mut report).await?;
        }
        report.remaining = self.uploads.pending_count()?;

        if report.stopped.is_none() {
            self.uploads.mark_push_completed().await?;
            if report.uploaded + report.rejected + report.failed_uploaded > 0 {
                self.housekeeping().await;
            }
        }

        info!(
            "[Sync] Push uploaded={} rejected={} failed_uploaded={} remaining={}",
            report.uploaded, report.rejected, report.failed_uploaded, report.remaining
        );
        self.events.emit(CheckinEvent::PushCompleted {
            uploaded: report.uploaded,
            remaining: report.remaining,
        });
        Ok(report)
    }

    async fn drain_redemptions(&self, report: &mut PushReport) -> Result<Option<String>> {
        loop {
            if self.is_cancelled() {
                return Ok(Some("cancelled".to_string()));
            }
            let Some(entry) = self.uploads.dequeue_next()? else {
                return Ok(None);
            };
            if !entry.is_due(Utc::now()) {
                return Ok(Some("waiting for retry".to_string()));
            }

            match self
                .remote
                .redeem(entry.checkin_list_id, &entry.secret, &entry.body)
                .await
            {
                Ok(response) => {
                    if response.status == RedemptionStatus::Redeemed {
                        report.uploaded += 1;
                    } else {
                        report.rejected += 1;
                        info!(
                            "[Sync] Remote answered {} for queued scan: {:?}",
                            response.status.as_str(),
                            response.reason
                        );
                    }
                    let outcome = UploadOutcome {
                        secret: entry.secret.clone(),
                        nonce: entry.nonce.clone(),
                        status: response.status,
                        reason: response.reason,
                        recorded_at: Utc::now(),
                    };
                    self.uploads.acknowledge(entry.id, outcome).await?;
                }
                Err(err) => {
                    let outcome = UploadOutcome {
                        secret: entry.secret.clone(),
                        nonce: entry.nonce.clone(),
                        status: RedemptionStatus::Error,
                        reason: Some(err.rejection_reason()),
                        recorded_at: Utc::now(),
                    };
                    match self.handle_upload_error(entry.id, err, Some(outcome)).await? {
                        DrainStep::Continue => report.rejected += 1,
                        DrainStep::Stop(reason) => return Ok(Some(reason)),
                    }
                }
            }
        }
    }

    async fn drain_failed_checkins(&self, report: &mut PushReport) -> Result<Option<String>> {
        loop {
            if self.is_cancelled() {
                return Ok(Some("cancelled".to_string()));
            }
            let Some(failed) = self.uploads.next_failed_checkin()? else {
                return Ok(None);
            };
            if !failed.is_due(Utc::now()) {
                return Ok(Some("waiting for retry".to_string()));
            }

            let upload = FailedCheckInUpload::from(&failed);
            match self
                .remote
                .upload_failed_checkin(failed.checkin_list_id, &upload)
                .await
            {
                Ok(()) => {
                    self.uploads.acknowledge_failed_checkin(failed.id).await?;
                    report.failed_uploaded += 1;
                }
                Err(err) => match err.retry_class() {
                    RetryClass::Permanent => {
                        warn!("[Sync] Dropping failed check-in report {}: {}", failed.id, err);
                        self.uploads.acknowledge_failed_checkin(failed.id).await?;
                    }
                    RetryClass::RateLimited(delay) => {
                        self.pause_for(delay).await?;
                        return Ok(Some(err.to_string()));
                    }
                    RetryClass::Retryable | RetryClass::ReauthRequired => {
                        self.uploads
                            .schedule_failed_checkin_retry(failed.id, err.to_string())
                            .await?;
                        return Ok(Some(err.to_string()));
                    }
                },
            }
        }
    }

    async fn handle_upload_error(
        &self,
        id: i64,
        err: RemoteError,
        outcome: Option<UploadOutcome>,
    ) -> Result<DrainStep> {
        match err.retry_class() {
            RetryClass::Permanent => {
                warn!("[Sync] Remote refused queued scan {} permanently: {}", id, err);
                if let Some(outcome) = outcome {
                    self.uploads.acknowledge(id, outcome).await?;
                }
                Ok(DrainStep::Continue)
            }
            RetryClass::RateLimited(delay) => {
                info!("[Sync] Rate limited, pausing uploads for {:?}", delay);
                self.pause_for(delay).await?;
                Ok(DrainStep::Stop(err.to_string()))
            }
            class @ (RetryClass::Retryable | RetryClass::ReauthRequired) => {
                debug!("[Sync] Upload of {} deferred ({})", id, class.code());
                self.uploads.schedule_retry(id, err.to_string()).await?;
                Ok(DrainStep::Stop(err.to_string()))
            }
        }
    }

    async fn pause_for(&self, delay: std::time::Duration) -> Result<()> {
        let delay = ChronoDuration::from_std(delay).unwrap_or_else(|_| ChronoDuration::seconds(60));
        self.uploads.pause_until(Utc::now() + delay).await
    }

    /// Best-effort device info and version refresh after a drain.
    async fn housekeeping(&self) {
        if let Err(err) = self
            .remote
            .update_device_info(&self.settings.device_info)
            .await
        {
            debug!("[Sync] Device info update failed: {}", err);
        }
        match self.remote.fetch_version_info().await {
            Ok(info) => {
                if let Ok(mut slot) = self.version_info.write() {
                    *slot = Some(info);
                }
            }
            Err(err) => debug!("[Sync] Version info refresh failed: {}", err),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Pull
    // ─────────────────────────────────────────────────────────────────────

    /// Pulls every tracked resource, merging page by page.
    pub async fn pull(&self) -> Result<PullReport> {
        let Ok(_guard) = self.pull_guard.try_lock() else {
            debug!("[Sync] Pull already running");
            return Ok(PullReport {
                skipped: true,
                ..PullReport::default()
            });
        };

        let mut report = PullReport::default();
        for resource in ResourceKind::ALL {
            if resource == ResourceKind::Orders && !self.settings.download_orders {
                continue;
            }
            match self.pull_resource(resource).await? {
                ResourcePull::Completed(count) => {
                    report.records += count;
                    report.resources.push(resource);
                }
                ResourcePull::Cancelled(count) => {
                    report.records += count;
                    report.cancelled = true;
                    info!("[Sync] Pull cancelled during {}", resource.as_str());
                    return Ok(report);
                }
            }
        }

        self.uploads.mark_pull_completed().await?;
        self.events.emit(CheckinEvent::PullCompleted {
            records: report.records,
        });
        Ok(report)
    }

    async fn pull_resource(&self, resource: ResourceKind) -> Result<ResourcePull> {
        let mut cursor = self
            .catalog
            .get_cursor(resource)?
            .unwrap_or_else(|| SyncCursor::new(resource));

        let resuming = cursor.is_resuming();
        let since = if resuming {
            cursor.in_progress_since.clone()
        } else if resource.since_param().is_some() {
            cursor.last_modified_token.clone()
        } else {
            None
        };
        let mut generation = if resuming {
            cursor.page_generation_timestamp.clone()
        } else {
            None
        };
        let mut page = cursor.next_page.unwrap_or(1);
        let started_at = Utc::now().to_rfc3339();
        let mut merged = 0usize;

        loop {
            if self.is_cancelled() {
                return Ok(ResourcePull::Cancelled(merged));
            }

            let request = PageRequest {
                resource,
                page,
                page_size: self.settings.page_size,
                since: since.clone(),
                ordering: resource.ordering(since.is_some()),
                if_modified_since: if resource.is_conditional() && !resuming && page == 1 {
                    cursor.last_modified_token.clone()
                } else {
                    None
                },
            };
            debug!(
                "[Sync] Fetching {} page {} since={:?}",
                resource.as_str(),
                page,
                since
            );

            let fetched = self.remote.fetch_page(&request).await?;
            let remote_page = match fetched {
                PageFetch::NotModified => {
                    debug!("[Sync] {} not modified", resource.as_str());
                    return Ok(ResourcePull::Completed(merged));
                }
                PageFetch::Page(remote_page) => remote_page,
            };

            // A cancelled merge must not apply partially; drop the page.
            if self.is_cancelled() {
                return Ok(ResourcePull::Cancelled(merged));
            }

            if generation.is_none() {
                generation = if resource.is_conditional() {
                    remote_page.last_modified.clone()
                } else {
                    Some(
                        remote_page
                            .generated_at
                            .clone()
                            .unwrap_or_else(|| started_at.clone()),
                    )
                };
            }

            let next_cursor = if remote_page.has_next {
                cursor.advanced(page + 1, since.clone(), generation.clone())
            } else {
                cursor.completed(generation.clone())
            };

            let records = decode_records(resource, remote_page.results)?;
            let count = self.catalog.merge_page(records, next_cursor.clone()).await?;
            merged += count;
            self.events.emit(CheckinEvent::CatalogPageMerged {
                resource,
                records: count,
            });

            if !remote_page.has_next {
                return Ok(ResourcePull::Completed(merged));
            }
            cursor = next_cursor;
            page += 1;
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Cycle
    // ─────────────────────────────────────────────────────────────────────

    /// One push followed by one pull. Remote failures end up in the
    /// returned status; only local store failures are returned as `Err`.
    pub async fn run_cycle(&self) -> Result<SyncCycleResult> {
        let started_at = Instant::now();
        let mut result = SyncCycleResult {
            status: SyncCycleStatus::Ok,
            pushed_count: 0,
            pulled_count: 0,
            failed_uploaded: 0,
            error: None,
        };

        match self.push().await {
            Ok(push) => {
                result.pushed_count = push.uploaded + push.rejected;
                result.failed_uploaded = push.failed_uploaded;
                if push.skipped {
                    result.status = SyncCycleStatus::Skipped;
                    return Ok(result);
                }
                if let Some(reason) = push.stopped {
                    result.status = SyncCycleStatus::Deferred;
                    result.error = Some(reason);
                }
            }
            Err(Error::Remote(err)) => return self.fail(result, started_at, err.to_string()).await,
            Err(err) => return Err(err),
        }

        match self.pull().await {
            Ok(pull) => {
                result.pulled_count = pull.records;
                if pull.skipped {
                    result.status = SyncCycleStatus::Skipped;
                } else if pull.cancelled {
                    result.status = SyncCycleStatus::Cancelled;
                }
            }
            Err(Error::Remote(err)) => return self.fail(result, started_at, err.to_string()).await,
            Err(Error::Serialization(err)) => {
                return self.fail(result, started_at, err.to_string()).await
            }
            Err(err) => return Err(err),
        }

        if result.status == SyncCycleStatus::Deferred {
            if let Some(reason) = result.error.clone() {
                self.uploads.mark_engine_error(reason).await?;
            }
        }
        self.uploads
            .mark_cycle_outcome(
                result.status.as_str().to_string(),
                started_at.elapsed().as_millis() as i64,
            )
            .await?;
        Ok(result)
    }

    async fn fail(
        &self,
        mut result: SyncCycleResult,
        started_at: Instant,
        message: String,
    ) -> Result<SyncCycleResult> {
        warn!("[Sync] Cycle failed: {}", message);
        self.uploads.mark_engine_error(message.clone()).await?;
        self.uploads
            .mark_cycle_outcome(
                SyncCycleStatus::Failed.as_str().to_string(),
                started_at.elapsed().as_millis() as i64,
            )
            .await?;
        self.events.emit(CheckinEvent::SyncFailed {
            message: message.clone(),
        });
        result.status = SyncCycleStatus::Failed;
        result.error = Some(message);
        Ok(result)
    }
}

/// Decodes raw page results into typed catalog records.
pub fn decode_records(
    resource: ResourceKind,
    results: Vec<serde_json::Value>,
) -> Result<CatalogRecords> {
    fn all<T: serde::de::DeserializeOwned>(results: Vec<serde_json::Value>) -> Result<Vec<T>> {
        results
            .into_iter()
            .map(|value| serde_json::from_value(value).map_err(Error::from))
            .collect()
    }

    Ok(match resource {
        ResourceKind::Event => {
            let value = results.into_iter().next().ok_or_else(|| {
                Error::Remote(RemoteError::InvalidResponse("empty event response".into()))
            })?;
            CatalogRecords::Event(serde_json::from_value(value)?)
        }
        ResourceKind::Items => CatalogRecords::Items(all(results)?),
        ResourceKind::Questions => CatalogRecords::Questions(all(results)?),
        ResourceKind::CheckInLists => CatalogRecords::CheckInLists(all(results)?),
        ResourceKind::Orders => CatalogRecords::Orders(all(results)?),
        ResourceKind::RevokedSecrets => CatalogRecords::RevokedSecrets(all(results)?),
        ResourceKind::BlockedSecrets => CatalogRecords::BlockedSecrets(all(results)?),
    })
}
