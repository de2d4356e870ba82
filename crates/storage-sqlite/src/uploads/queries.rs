//! Upload-queue statements that also run inside the redemption ledger.

use chrono::Utc;
use diesel::prelude::*;
use diesel::SqliteConnection;

use checkin_core::catalog::CheckInType;
use checkin_core::errors::DatabaseError;
use checkin_core::uploads::{
    FailedCheckIn, NewFailedCheckIn, NewQueuedRedemption, QueuedRedemptionRequest,
    RedeemRequestBody,
};
use checkin_core::Result;

use super::model::{FailedCheckInDB, NewFailedCheckInDB, NewQueuedRedemptionDB, QueuedRedemptionDB};
use crate::errors::StorageError;
use crate::schema::{failed_checkins, queued_redemptions};

/// The live request for one ticket on one list in one direction.
pub(crate) fn live_queued(
    conn: &mut SqliteConnection,
    event_slug: &str,
    secret: &str,
    checkin_list_id: i64,
    checkin_type: &CheckInType,
) -> Result<Option<QueuedRedemptionRequest>> {
    queued_redemptions::table
        .filter(queued_redemptions::event_slug.eq(event_slug))
        .filter(queued_redemptions::secret.eq(secret))
        .filter(queued_redemptions::checkin_list_id.eq(checkin_list_id))
        .filter(queued_redemptions::checkin_type.eq(checkin_type.as_str()))
        .select(QueuedRedemptionDB::as_select())
        .first(conn)
        .optional()
        .map_err(StorageError::from)?
        .map(QueuedRedemptionDB::into_request)
        .transpose()
}

/// Oldest live request for a ticket in the event, across lists and directions.
pub(crate) fn first_queued_for_secret(
    conn: &mut SqliteConnection,
    event_slug: &str,
    secret: &str,
) -> Result<Option<QueuedRedemptionRequest>> {
    queued_redemptions::table
        .filter(queued_redemptions::event_slug.eq(event_slug))
        .filter(queued_redemptions::secret.eq(secret))
        .order(queued_redemptions::id.asc())
        .select(QueuedRedemptionDB::as_select())
        .first(conn)
        .optional()
        .map_err(StorageError::from)?
        .map(QueuedRedemptionDB::into_request)
        .transpose()
}

/// Appends a request. The unique index rejects a second live request for the
/// same ticket, list and direction.
pub(crate) fn insert_queued(
    conn: &mut SqliteConnection,
    request: &NewQueuedRedemption,
) -> Result<QueuedRedemptionRequest> {
    let row = NewQueuedRedemptionDB {
        secret: request.secret.clone(),
        nonce: request.body.nonce.clone(),
        event_slug: request.event_slug.clone(),
        checkin_list_id: request.checkin_list_id,
        body: serde_json::to_string(&request.body)?,
        enqueued_at: Utc::now().to_rfc3339(),
        retry_count: 0,
        checkin_type: request.body.checkin_type.as_str().to_string(),
    };
    diesel::insert_into(queued_redemptions::table)
        .values(&row)
        .returning(QueuedRedemptionDB::as_returning())
        .get_result::<QueuedRedemptionDB>(conn)
        .map_err(StorageError::from)?
        .into_request()
}

/// Replaces the body of a live request, keeping its nonce and queue position.
pub(crate) fn supersede_queued(
    conn: &mut SqliteConnection,
    id: i64,
    body: &RedeemRequestBody,
) -> Result<()> {
    let nonce = queued_redemptions::table
        .find(id)
        .select(queued_redemptions::nonce)
        .first::<String>(conn)
        .optional()
        .map_err(StorageError::from)?
        .ok_or_else(|| DatabaseError::NotFound(format!("queued redemption {id}")))?;

    let mut body = body.clone();
    body.nonce = nonce;
    diesel::update(queued_redemptions::table.find(id))
        .set((
            queued_redemptions::body.eq(serde_json::to_string(&body)?),
            queued_redemptions::retry_count.eq(0),
            queued_redemptions::next_retry_at.eq::<Option<String>>(None),
            queued_redemptions::last_error.eq::<Option<String>>(None),
        ))
        .execute(conn)
        .map_err(StorageError::from)?;
    Ok(())
}

pub(crate) fn insert_failed(
    conn: &mut SqliteConnection,
    failed: &NewFailedCheckIn,
) -> Result<FailedCheckIn> {
    let row = NewFailedCheckInDB {
        event_slug: failed.event_slug.clone(),
        checkin_list_id: failed.checkin_list_id,
        raw_barcode: failed.raw_barcode.clone(),
        error_reason: failed.error_reason.as_str().to_string(),
        checkin_type: failed.checkin_type.as_str().to_string(),
        datetime: failed.datetime.to_rfc3339(),
        position_id: failed.position_id,
        item_id: failed.item_id,
        variation_id: failed.variation_id,
        subevent_id: failed.subevent_id,
        enqueued_at: Utc::now().to_rfc3339(),
        retry_count: 0,
    };
    diesel::insert_into(failed_checkins::table)
        .values(&row)
        .returning(FailedCheckInDB::as_returning())
        .get_result::<FailedCheckInDB>(conn)
        .map_err(StorageError::from)?
        .into_failed()
}
