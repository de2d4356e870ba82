//! Row types for the per-device upload tables.

use diesel::prelude::*;

use checkin_core::catalog::CheckInType;
use checkin_core::redemption::{ErrorReason, RedemptionStatus};
use checkin_core::sync::SyncEngineStatus;
use checkin_core::uploads::{FailedCheckIn, QueuedRedemptionRequest, UploadOutcome};
use checkin_core::Result;

use crate::errors::{parse_optional_timestamp, parse_timestamp};

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = crate::schema::queued_redemptions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct QueuedRedemptionDB {
    pub id: i64,
    pub secret: String,
    pub nonce: String,
    pub event_slug: String,
    pub checkin_list_id: i64,
    pub body: String,
    pub enqueued_at: String,
    pub retry_count: i32,
    pub next_retry_at: Option<String>,
    pub last_error: Option<String>,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::queued_redemptions)]
pub struct NewQueuedRedemptionDB {
    pub secret: String,
    pub nonce: String,
    pub event_slug: String,
    pub checkin_list_id: i64,
    pub body: String,
    pub enqueued_at: String,
    pub retry_count: i32,
    pub checkin_type: String,
}

impl QueuedRedemptionDB {
    pub fn into_request(self) -> Result<QueuedRedemptionRequest> {
        Ok(QueuedRedemptionRequest {
            id: self.id,
            secret: self.secret,
            nonce: self.nonce,
            event_slug: self.event_slug,
            checkin_list_id: self.checkin_list_id,
            body: serde_json::from_str(&self.body)?,
            enqueued_at: parse_timestamp(&self.enqueued_at)?,
            retry_count: self.retry_count,
            next_retry_at: parse_optional_timestamp(self.next_retry_at.as_deref())?,
            last_error: self.last_error,
        })
    }
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::upload_outcomes)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct UploadOutcomeDB {
    pub id: i64,
    pub secret: String,
    pub nonce: String,
    pub status: String,
    pub reason: Option<String>,
    pub recorded_at: String,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::upload_outcomes)]
pub struct NewUploadOutcomeDB {
    pub secret: String,
    pub nonce: String,
    pub status: String,
    pub reason: Option<String>,
    pub recorded_at: String,
}

impl From<&UploadOutcome> for NewUploadOutcomeDB {
    fn from(outcome: &UploadOutcome) -> Self {
        NewUploadOutcomeDB {
            secret: outcome.secret.clone(),
            nonce: outcome.nonce.clone(),
            status: outcome.status.as_str().to_string(),
            reason: outcome.reason.as_ref().map(|r| r.as_str().to_string()),
            recorded_at: outcome.recorded_at.to_rfc3339(),
        }
    }
}

impl UploadOutcomeDB {
    pub fn into_outcome(self) -> Result<UploadOutcome> {
        Ok(UploadOutcome {
            secret: self.secret,
            nonce: self.nonce,
            status: RedemptionStatus::from(self.status),
            reason: self.reason.map(ErrorReason::from),
            recorded_at: parse_timestamp(&self.recorded_at)?,
        })
    }
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = crate::schema::failed_checkins)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct FailedCheckInDB {
    pub id: i64,
    pub event_slug: String,
    pub checkin_list_id: i64,
    pub raw_barcode: String,
    pub error_reason: String,
    pub checkin_type: String,
    pub datetime: String,
    pub position_id: Option<i64>,
    pub item_id: Option<i64>,
    pub variation_id: Option<i64>,
    pub subevent_id: Option<i64>,
    pub enqueued_at: String,
    pub retry_count: i32,
    pub next_retry_at: Option<String>,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::failed_checkins)]
pub struct NewFailedCheckInDB {
    pub event_slug: String,
    pub checkin_list_id: i64,
    pub raw_barcode: String,
    pub error_reason: String,
    pub checkin_type: String,
    pub datetime: String,
    pub position_id: Option<i64>,
    pub item_id: Option<i64>,
    pub variation_id: Option<i64>,
    pub subevent_id: Option<i64>,
    pub enqueued_at: String,
    pub retry_count: i32,
}

impl FailedCheckInDB {
    pub fn into_failed(self) -> Result<FailedCheckIn> {
        Ok(FailedCheckIn {
            id: self.id,
            event_slug: self.event_slug,
            checkin_list_id: self.checkin_list_id,
            raw_barcode: self.raw_barcode,
            error_reason: ErrorReason::from(self.error_reason),
            checkin_type: CheckInType::from(self.checkin_type),
            datetime: parse_timestamp(&self.datetime)?,
            position_id: self.position_id,
            item_id: self.item_id,
            variation_id: self.variation_id,
            subevent_id: self.subevent_id,
            enqueued_at: parse_timestamp(&self.enqueued_at)?,
            retry_count: self.retry_count,
            next_retry_at: parse_optional_timestamp(self.next_retry_at.as_deref())?,
        })
    }
}

#[derive(Queryable, Selectable, Insertable, Debug, Clone, Default)]
#[diesel(table_name = crate::schema::sync_engine_state)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SyncEngineStateDB {
    pub id: i32,
    pub last_push_at: Option<String>,
    pub last_pull_at: Option<String>,
    pub last_error: Option<String>,
    pub consecutive_failures: i32,
    pub next_retry_at: Option<String>,
    pub paused_until: Option<String>,
    pub last_cycle_status: Option<String>,
    pub last_cycle_duration_ms: Option<i64>,
}

impl SyncEngineStateDB {
    /// The singleton row, for upserts that only touch a few columns.
    pub fn singleton() -> Self {
        Self {
            id: 1,
            ..Self::default()
        }
    }
}

impl From<SyncEngineStateDB> for SyncEngineStatus {
    fn from(row: SyncEngineStateDB) -> Self {
        SyncEngineStatus {
            last_push_at: row.last_push_at,
            last_pull_at: row.last_pull_at,
            last_error: row.last_error,
            consecutive_failures: row.consecutive_failures,
            next_retry_at: row.next_retry_at,
            paused_until: row.paused_until,
            last_cycle_status: row.last_cycle_status,
            last_cycle_duration_ms: row.last_cycle_duration_ms,
        }
    }
}
