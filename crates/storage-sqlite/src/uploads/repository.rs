use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use log::debug;

use checkin_core::sync::{backoff_seconds, SyncEngineStatus};
use checkin_core::uploads::{
    FailedCheckIn, NewFailedCheckIn, NewQueuedRedemption, QueuedRedemptionRequest,
    UploadOutcome, UploadQueueRepositoryTrait,
};
use checkin_core::Result;

use super::model::{
    FailedCheckInDB, NewUploadOutcomeDB, QueuedRedemptionDB, SyncEngineStateDB, UploadOutcomeDB,
};
use super::queries;
use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::StorageError;
use crate::schema::{failed_checkins, queued_redemptions, sync_engine_state, upload_outcomes};

/// Upload queue of one event inside the per-device uploads database.
pub struct UploadsRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
    event_slug: String,
}

impl UploadsRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle, event_slug: impl Into<String>) -> Self {
        Self {
            pool,
            writer,
            event_slug: event_slug.into(),
        }
    }

    fn load_pending(&self, limit: i64) -> Result<Vec<QueuedRedemptionRequest>> {
        let mut conn = get_connection(&self.pool)?;
        queued_redemptions::table
            .filter(queued_redemptions::event_slug.eq(&self.event_slug))
            .order(queued_redemptions::id.asc())
            .limit(limit)
            .select(QueuedRedemptionDB::as_select())
            .load(&mut conn)
            .map_err(StorageError::from)?
            .into_iter()
            .map(QueuedRedemptionDB::into_request)
            .collect()
    }
}

#[async_trait]
impl UploadQueueRepositoryTrait for UploadsRepository {
    async fn enqueue(&self, request: NewQueuedRedemption) -> Result<QueuedRedemptionRequest> {
        self.writer
            .exec(move |conn| queries::insert_queued(conn, &request))
            .await
    }

    fn dequeue_next(&self) -> Result<Option<QueuedRedemptionRequest>> {
        Ok(self.load_pending(1)?.into_iter().next())
    }

    fn peek_by_secret(&self, secret: &str) -> Result<Option<QueuedRedemptionRequest>> {
        let mut conn = get_connection(&self.pool)?;
        queries::first_queued_for_secret(&mut *conn, &self.event_slug, secret)
    }

    fn list_pending(&self, limit: i64) -> Result<Vec<QueuedRedemptionRequest>> {
        self.load_pending(limit)
    }

    fn pending_count(&self) -> Result<i64> {
        let mut conn = get_connection(&self.pool)?;
        Ok(queued_redemptions::table
            .filter(queued_redemptions::event_slug.eq(&self.event_slug))
            .count()
            .get_result::<i64>(&mut conn)
            .map_err(StorageError::from)?)
    }

    async fn acknowledge(&self, id: i64, outcome: UploadOutcome) -> Result<()> {
        self.writer
            .exec(move |conn| {
                diesel::delete(queued_redemptions::table.find(id))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                diesel::insert_into(upload_outcomes::table)
                    .values(NewUploadOutcomeDB::from(&outcome))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn schedule_retry(&self, id: i64, error: String) -> Result<()> {
        self.writer
            .exec(move |conn| {
                let Some(row) = queued_redemptions::table
                    .find(id)
                    .select(QueuedRedemptionDB::as_select())
                    .first(conn)
                    .optional()
                    .map_err(StorageError::from)?
                else {
                    return Ok(());
                };
                let retry_at = Utc::now() + Duration::seconds(backoff_seconds(row.retry_count));
                diesel::update(queued_redemptions::table.find(id))
                    .set((
                        queued_redemptions::retry_count.eq(row.retry_count + 1),
                        queued_redemptions::next_retry_at.eq(Some(retry_at.to_rfc3339())),
                        queued_redemptions::last_error.eq(Some(error)),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                debug!(
                    "[Uploads] Request {} retries at {} (attempt {})",
                    id,
                    retry_at,
                    row.retry_count + 1
                );
                Ok(())
            })
            .await
    }

    fn recent_outcomes(&self, limit: i64) -> Result<Vec<UploadOutcome>> {
        let mut conn = get_connection(&self.pool)?;
        upload_outcomes::table
            .order(upload_outcomes::id.desc())
            .limit(limit)
            .select(UploadOutcomeDB::as_select())
            .load(&mut conn)
            .map_err(StorageError::from)?
            .into_iter()
            .map(UploadOutcomeDB::into_outcome)
            .collect()
    }

    async fn enqueue_failed_checkin(&self, failed: NewFailedCheckIn) -> Result<FailedCheckIn> {
        self.writer
            .exec(move |conn| queries::insert_failed(conn, &failed))
            .await
    }

    fn next_failed_checkin(&self) -> Result<Option<FailedCheckIn>> {
        let mut conn = get_connection(&self.pool)?;
        failed_checkins::table
            .filter(failed_checkins::event_slug.eq(&self.event_slug))
            .order(failed_checkins::id.asc())
            .select(FailedCheckInDB::as_select())
            .first(&mut conn)
            .optional()
            .map_err(StorageError::from)?
            .map(FailedCheckInDB::into_failed)
            .transpose()
    }

    fn failed_checkin_count(&self) -> Result<i64> {
        let mut conn = get_connection(&self.pool)?;
        Ok(failed_checkins::table
            .filter(failed_checkins::event_slug.eq(&self.event_slug))
            .count()
            .get_result::<i64>(&mut conn)
            .map_err(StorageError::from)?)
    }

    async fn acknowledge_failed_checkin(&self, id: i64) -> Result<()> {
        self.writer
            .exec(move |conn| {
                diesel::delete(failed_checkins::table.find(id))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn schedule_failed_checkin_retry(&self, id: i64, error: String) -> Result<()> {
        self.writer
            .exec(move |conn| {
                let Some(retry_count) = failed_checkins::table
                    .find(id)
                    .select(failed_checkins::retry_count)
                    .first::<i32>(conn)
                    .optional()
                    .map_err(StorageError::from)?
                else {
                    return Ok(());
                };
                let retry_at = Utc::now() + Duration::seconds(backoff_seconds(retry_count));
                diesel::update(failed_checkins::table.find(id))
                    .set((
                        failed_checkins::retry_count.eq(retry_count + 1),
                        failed_checkins::next_retry_at.eq(Some(retry_at.to_rfc3339())),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                debug!("[Uploads] Failed check-in {} deferred: {}", id, error);
                Ok(())
            })
            .await
    }

    fn get_engine_status(&self) -> Result<SyncEngineStatus> {
        let mut conn = get_connection(&self.pool)?;
        let row = sync_engine_state::table
            .find(1)
            .select(SyncEngineStateDB::as_select())
            .first(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        Ok(row.map(SyncEngineStatus::from).unwrap_or_default())
    }

    async fn mark_push_completed(&self) -> Result<()> {
        self.writer
            .exec(move |conn| {
                let now = Utc::now().to_rfc3339();
                diesel::insert_into(sync_engine_state::table)
                    .values(SyncEngineStateDB {
                        last_push_at: Some(now.clone()),
                        ..SyncEngineStateDB::singleton()
                    })
                    .on_conflict(sync_engine_state::id)
                    .do_update()
                    .set((
                        sync_engine_state::last_push_at.eq(Some(now)),
                        sync_engine_state::last_error.eq::<Option<String>>(None),
                        sync_engine_state::consecutive_failures.eq(0),
                        sync_engine_state::next_retry_at.eq::<Option<String>>(None),
                        sync_engine_state::paused_until.eq::<Option<String>>(None),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn mark_pull_completed(&self) -> Result<()> {
        self.writer
            .exec(move |conn| {
                let now = Utc::now().to_rfc3339();
                diesel::insert_into(sync_engine_state::table)
                    .values(SyncEngineStateDB {
                        last_pull_at: Some(now.clone()),
                        ..SyncEngineStateDB::singleton()
                    })
                    .on_conflict(sync_engine_state::id)
                    .do_update()
                    .set(sync_engine_state::last_pull_at.eq(Some(now)))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn mark_engine_error(&self, error: String) -> Result<()> {
        self.writer
            .exec(move |conn| {
                let failures = sync_engine_state::table
                    .find(1)
                    .select(sync_engine_state::consecutive_failures)
                    .first::<i32>(conn)
                    .optional()
                    .map_err(StorageError::from)?
                    .unwrap_or(0);
                let retry_at =
                    (Utc::now() + Duration::seconds(backoff_seconds(failures))).to_rfc3339();
                diesel::insert_into(sync_engine_state::table)
                    .values(SyncEngineStateDB {
                        last_error: Some(error.clone()),
                        consecutive_failures: 1,
                        next_retry_at: Some(retry_at.clone()),
                        ..SyncEngineStateDB::singleton()
                    })
                    .on_conflict(sync_engine_state::id)
                    .do_update()
                    .set((
                        sync_engine_state::last_error.eq(Some(error)),
                        sync_engine_state::consecutive_failures.eq(failures + 1),
                        sync_engine_state::next_retry_at.eq(Some(retry_at)),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn pause_until(&self, until: DateTime<Utc>) -> Result<()> {
        let until = until.to_rfc3339();
        self.writer
            .exec(move |conn| {
                diesel::insert_into(sync_engine_state::table)
                    .values(SyncEngineStateDB {
                        paused_until: Some(until.clone()),
                        ..SyncEngineStateDB::singleton()
                    })
                    .on_conflict(sync_engine_state::id)
                    .do_update()
                    .set(sync_engine_state::paused_until.eq(Some(until)))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn mark_cycle_outcome(&self, status: String, duration_ms: i64) -> Result<()> {
        self.writer
            .exec(move |conn| {
                diesel::insert_into(sync_engine_state::table)
                    .values(SyncEngineStateDB {
                        last_cycle_status: Some(status.clone()),
                        last_cycle_duration_ms: Some(duration_ms),
                        ..SyncEngineStateDB::singleton()
                    })
                    .on_conflict(sync_engine_state::id)
                    .do_update()
                    .set((
                        sync_engine_state::last_cycle_status.eq(Some(status)),
                        sync_engine_state::last_cycle_duration_ms.eq(Some(duration_ms)),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }
}
