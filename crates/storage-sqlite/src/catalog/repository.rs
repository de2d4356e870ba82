use std::sync::Arc;

use async_trait::async_trait;
use diesel::SqliteConnection;
use log::debug;

use checkin_core::catalog::{
    CatalogRecords, CatalogRepositoryTrait, CheckIn, CheckInList, CheckInListStatus, Item, Order,
    OrderPosition, SearchResult,
};
use checkin_core::sync::{ResourceKind, SyncCursor};
use checkin_core::tickets::SignedKeySet;
use checkin_core::Result;

use super::queries;
use crate::db::{get_connection, DbPool, WriteHandle};

/// Catalog of one event: reads on pooled connections, writes on the writer.
pub struct CatalogRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl CatalogRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }

    fn read<T>(&self, f: impl FnOnce(&mut SqliteConnection) -> Result<T>) -> Result<T> {
        let mut conn = get_connection(&self.pool)?;
        f(&mut *conn)
    }
}

#[async_trait]
impl CatalogRepositoryTrait for CatalogRepository {
    fn get_position_by_secret(&self, secret: &str) -> Result<Option<OrderPosition>> {
        self.read(|conn| queries::position_by_secret(conn, secret))
    }

    fn get_order(&self, code: &str) -> Result<Option<Order>> {
        self.read(|conn| queries::order(conn, code))
    }

    fn get_item(&self, item_id: i64) -> Result<Option<Item>> {
        self.read(|conn| queries::item(conn, item_id))
    }

    fn list_items(&self) -> Result<Vec<Item>> {
        self.read(queries::list_items)
    }

    fn get_checkin_list(&self, list_id: i64) -> Result<Option<CheckInList>> {
        self.read(|conn| queries::checkin_list(conn, list_id))
    }

    fn list_checkin_lists(&self) -> Result<Vec<CheckInList>> {
        self.read(queries::list_checkin_lists)
    }

    fn checkins_for_secret(&self, secret: &str) -> Result<Vec<CheckIn>> {
        self.read(|conn| queries::checkins_for_secret(conn, secret))
    }

    fn signed_keys(&self) -> Result<SignedKeySet> {
        self.read(queries::signing_keys)
    }

    fn search_positions(
        &self,
        query: &str,
        list: &CheckInList,
        limit: i64,
    ) -> Result<Vec<SearchResult>> {
        self.read(|conn| queries::search_positions(conn, query, list, limit))
    }

    fn checkin_list_status(&self, list: &CheckInList) -> Result<CheckInListStatus> {
        self.read(|conn| queries::checkin_list_status(conn, list))
    }

    fn get_cursor(&self, resource: ResourceKind) -> Result<Option<SyncCursor>> {
        self.read(|conn| queries::cursor(conn, resource))
    }

    async fn merge_page(&self, records: CatalogRecords, cursor: SyncCursor) -> Result<usize> {
        let resource = records.resource();
        let merged = self
            .writer
            .exec(move |conn| {
                let merged = queries::apply_records(conn, records)?;
                queries::save_cursor(conn, &cursor)?;
                Ok(merged)
            })
            .await?;
        debug!("[Catalog] Merged {} {} record(s)", merged, resource.as_str());
        Ok(merged)
    }

    async fn save_cursor(&self, cursor: SyncCursor) -> Result<()> {
        self.writer
            .exec(move |conn| queries::save_cursor(conn, &cursor))
            .await
    }
}
