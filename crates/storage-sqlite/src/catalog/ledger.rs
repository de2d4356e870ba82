//! Redemption ledger backed by the writer connection.
//!
//! Each decision runs inside one immediate transaction that spans the catalog
//! file and the attached uploads file, so the appended check-in and the queued
//! request commit or roll back together.

use async_trait::async_trait;
use diesel::SqliteConnection;

use checkin_core::catalog::{CheckIn, CheckInType, Item, Order, OrderPosition, Question};
use checkin_core::redemption::{
    LedgerJob, RedemptionLedger, RedemptionResult, RedemptionStoreTrait,
};
use checkin_core::tickets::SignedKeySet;
use checkin_core::uploads::{
    NewFailedCheckIn, NewQueuedRedemption, QueuedRedemptionRequest, RedeemRequestBody,
};
use checkin_core::Result;

use super::queries;
use crate::db::WriteHandle;
use crate::uploads::queries as upload_queries;

pub struct SqliteRedemptionStore {
    writer: WriteHandle,
}

impl SqliteRedemptionStore {
    pub fn new(writer: WriteHandle) -> Self {
        Self { writer }
    }
}

#[async_trait]
impl RedemptionStoreTrait for SqliteRedemptionStore {
    async fn transact(&self, job: LedgerJob) -> Result<RedemptionResult> {
        self.writer
            .exec(move |conn| {
                let mut ledger = SqliteLedger { conn };
                job(&mut ledger)
            })
            .await
    }
}

struct SqliteLedger<'a> {
    conn: &'a mut SqliteConnection,
}

impl RedemptionLedger for SqliteLedger<'_> {
    fn position_by_secret(&mut self, secret: &str) -> Result<Option<OrderPosition>> {
        queries::position_by_secret(self.conn, secret)
    }

    fn order(&mut self, code: &str) -> Result<Option<Order>> {
        queries::order(self.conn, code)
    }

    fn item(&mut self, item_id: i64) -> Result<Option<Item>> {
        queries::item(self.conn, item_id)
    }

    fn questions_for_item(&mut self, item_id: i64) -> Result<Vec<Question>> {
        queries::questions_for_item(self.conn, item_id)
    }

    fn checkins_for_secret(&mut self, secret: &str) -> Result<Vec<CheckIn>> {
        queries::checkins_for_secret(self.conn, secret)
    }

    fn live_redemption(
        &mut self,
        event_slug: &str,
        secret: &str,
        list_id: i64,
        checkin_type: &CheckInType,
    ) -> Result<Option<QueuedRedemptionRequest>> {
        upload_queries::live_queued(self.conn, event_slug, secret, list_id, checkin_type)
    }

    fn signing_keys(&mut self) -> Result<SignedKeySet> {
        queries::signing_keys(self.conn)
    }

    fn is_secret_revoked(&mut self, secret: &str) -> Result<bool> {
        queries::is_secret_revoked(self.conn, secret)
    }

    fn is_secret_blocked(&mut self, secret: &str) -> Result<bool> {
        queries::is_secret_blocked(self.conn, secret)
    }

    fn append_checkin(&mut self, checkin: &CheckIn) -> Result<()> {
        queries::append_checkin(self.conn, checkin)
    }

    fn enqueue_redemption(
        &mut self,
        request: &NewQueuedRedemption,
    ) -> Result<QueuedRedemptionRequest> {
        upload_queries::insert_queued(self.conn, request)
    }

    fn supersede_redemption(&mut self, id: i64, body: &RedeemRequestBody) -> Result<()> {
        upload_queries::supersede_queued(self.conn, id, body)
    }

    fn record_failed_checkin(&mut self, failed: &NewFailedCheckIn) -> Result<()> {
        upload_queries::insert_failed(self.conn, failed).map(|_| ())
    }
}
