use async_trait::async_trait;

use super::redemption_model::RedemptionResult;
use crate::catalog::{CheckIn, CheckInType, Item, Order, OrderPosition, Question};
use crate::errors::Result;
use crate::tickets::SignedKeySet;
use crate::uploads::{
    NewFailedCheckIn, NewQueuedRedemption, QueuedRedemptionRequest, RedeemRequestBody,
};

/// Everything a redemption decision reads and writes, scoped to one
/// write transaction spanning the catalog and the upload queue.
pub trait RedemptionLedger {
    fn position_by_secret(&mut self, secret: &str) -> Result<Option<OrderPosition>>;

    fn order(&mut self, code: &str) -> Result<Option<Order>>;

    fn item(&mut self, item_id: i64) -> Result<Option<Item>>;

    fn questions_for_item(&mut self, item_id: i64) -> Result<Vec<Question>>;

    fn checkins_for_secret(&mut self, secret: &str) -> Result<Vec<CheckIn>>;

    /// The queued request for this ticket on this list in this direction.
    fn live_redemption(
        &mut self,
        event_slug: &str,
        secret: &str,
        list_id: i64,
        checkin_type: &CheckInType,
    ) -> Result<Option<QueuedRedemptionRequest>>;

    fn signing_keys(&mut self) -> Result<SignedKeySet>;

    fn is_secret_revoked(&mut self, secret: &str) -> Result<bool>;

    fn is_secret_blocked(&mut self, secret: &str) -> Result<bool>;

    fn append_checkin(&mut self, checkin: &CheckIn) -> Result<()>;

    fn enqueue_redemption(
        &mut self,
        request: &NewQueuedRedemption,
    ) -> Result<QueuedRedemptionRequest>;

    /// Replaces the body of a live entry in place. Its nonce and queue
    /// position do not change.
    fn supersede_redemption(&mut self, id: i64, body: &RedeemRequestBody) -> Result<()>;

    fn record_failed_checkin(&mut self, failed: &NewFailedCheckIn) -> Result<()>;
}

/// A decision to run inside [`RedemptionStoreTrait::transact`].
pub type LedgerJob =
    Box<dyn FnOnce(&mut dyn RedemptionLedger) -> Result<RedemptionResult> + Send + 'static>;

/// The serialization point for redemption decisions.
///
/// Jobs run one at a time. An `Err` from the job rolls back every write it
/// made.
#[async_trait]
pub trait RedemptionStoreTrait: Send + Sync {
    async fn transact(&self, job: LedgerJob) -> Result<RedemptionResult>;
}
