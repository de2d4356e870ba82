use async_trait::async_trait;

use super::catalog_model::{
    BlockedSecret, CheckIn, CheckInList, CheckInListStatus, EventInfo, Item, Order,
    OrderPosition, Question, RevokedSecret, SearchResult,
};
use crate::errors::Result;
use crate::sync::{ResourceKind, SyncCursor};
use crate::tickets::SignedKeySet;

/// One decoded page of a catalog resource, ready to be merged.
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogRecords {
    Event(EventInfo),
    Items(Vec<Item>),
    Questions(Vec<Question>),
    CheckInLists(Vec<CheckInList>),
    Orders(Vec<Order>),
    RevokedSecrets(Vec<RevokedSecret>),
    BlockedSecrets(Vec<BlockedSecret>),
}

impl CatalogRecords {
    pub fn resource(&self) -> ResourceKind {
        match self {
            Self::Event(_) => ResourceKind::Event,
            Self::Items(_) => ResourceKind::Items,
            Self::Questions(_) => ResourceKind::Questions,
            Self::CheckInLists(_) => ResourceKind::CheckInLists,
            Self::Orders(_) => ResourceKind::Orders,
            Self::RevokedSecrets(_) => ResourceKind::RevokedSecrets,
            Self::BlockedSecrets(_) => ResourceKind::BlockedSecrets,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Event(_) => 1,
            Self::Items(rows) => rows.len(),
            Self::Questions(rows) => rows.len(),
            Self::CheckInLists(rows) => rows.len(),
            Self::Orders(rows) => rows.len(),
            Self::RevokedSecrets(rows) => rows.len(),
            Self::BlockedSecrets(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Read/merge access to the per-event catalog database.
///
/// Reads are synchronous against pooled connections. Merges go through the
/// single writer so a page and its cursor land in one transaction.
#[async_trait]
pub trait CatalogRepositoryTrait: Send + Sync {
    fn get_position_by_secret(&self, secret: &str) -> Result<Option<OrderPosition>>;

    /// Order header without positions.
    fn get_order(&self, code: &str) -> Result<Option<Order>>;

    fn get_item(&self, item_id: i64) -> Result<Option<Item>>;

    fn list_items(&self) -> Result<Vec<Item>>;

    fn get_checkin_list(&self, list_id: i64) -> Result<Option<CheckInList>>;

    fn list_checkin_lists(&self) -> Result<Vec<CheckInList>>;

    /// Synced and queued history for a secret, oldest first.
    fn checkins_for_secret(&self, secret: &str) -> Result<Vec<CheckIn>>;

    fn signed_keys(&self) -> Result<SignedKeySet>;

    fn search_positions(
        &self,
        query: &str,
        list: &CheckInList,
        limit: i64,
    ) -> Result<Vec<SearchResult>>;

    fn checkin_list_status(&self, list: &CheckInList) -> Result<CheckInListStatus>;

    fn get_cursor(&self, resource: ResourceKind) -> Result<Option<SyncCursor>>;

    /// Applies a page and stores `cursor` atomically. Returns rows written.
    async fn merge_page(&self, records: CatalogRecords, cursor: SyncCursor) -> Result<usize>;

    async fn save_cursor(&self, cursor: SyncCursor) -> Result<()>;
}
