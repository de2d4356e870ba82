use std::sync::Arc;

use async_trait::async_trait;
use log::debug;

use super::{TicketValidator, ValidationMode, SEARCH_RESULT_LIMIT};
use crate::catalog::{CatalogRepositoryTrait, CheckInListStatus, SearchResult};
use crate::errors::Result;
use crate::redemption::{RedemptionEngine, RedemptionRequest, RedemptionResult};
use crate::session::SessionContext;

/// Decides scans against the synced catalog.
pub struct OfflineValidator {
    engine: RedemptionEngine,
    catalog: Arc<dyn CatalogRepositoryTrait>,
}

impl OfflineValidator {
    pub fn new(engine: RedemptionEngine, catalog: Arc<dyn CatalogRepositoryTrait>) -> Self {
        Self { engine, catalog }
    }
}

#[async_trait]
impl TicketValidator for OfflineValidator {
    fn mode(&self) -> ValidationMode {
        ValidationMode::Offline
    }

    async fn redeem(
        &self,
        session: &SessionContext,
        request: RedemptionRequest,
    ) -> Result<RedemptionResult> {
        self.engine.redeem(session, request).await
    }

    async fn search(&self, session: &SessionContext, query: &str) -> Result<Vec<SearchResult>> {
        self.catalog
            .search_positions(query, &session.checkin_list, SEARCH_RESULT_LIMIT)
    }

    async fn check_in_list_status(&self, session: &SessionContext) -> Result<CheckInListStatus> {
        self.catalog.checkin_list_status(&session.checkin_list)
    }
}

/// Decides scans from ticket signatures only. No order data is available,
/// so search has nothing to look through.
pub struct DatalessValidator {
    engine: RedemptionEngine,
    catalog: Arc<dyn CatalogRepositoryTrait>,
}

impl DatalessValidator {
    pub fn new(engine: RedemptionEngine, catalog: Arc<dyn CatalogRepositoryTrait>) -> Self {
        Self { engine, catalog }
    }
}

#[async_trait]
impl TicketValidator for DatalessValidator {
    fn mode(&self) -> ValidationMode {
        ValidationMode::Dataless
    }

    async fn redeem(
        &self,
        session: &SessionContext,
        request: RedemptionRequest,
    ) -> Result<RedemptionResult> {
        self.engine.redeem(session, request).await
    }

    async fn search(&self, _session: &SessionContext, query: &str) -> Result<Vec<SearchResult>> {
        debug!("[Validator] Search for {:?} skipped without order data", query);
        Ok(Vec::new())
    }

    async fn check_in_list_status(&self, session: &SessionContext) -> Result<CheckInListStatus> {
        self.catalog.checkin_list_status(&session.checkin_list)
    }
}
