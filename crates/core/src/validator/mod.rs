//! Strategy facade choosing between remote and local validation.

mod debounce;
mod offline;
mod online;

pub use debounce::*;
pub use offline::*;
pub use online::*;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::catalog::{CatalogRepositoryTrait, CheckInListStatus, SearchResult};
use crate::config::CheckinConfig;
use crate::errors::Result;
use crate::events::CheckinEventSink;
use crate::redemption::{
    RedemptionEngine, RedemptionRequest, RedemptionResult, RedemptionSettings,
    RedemptionStoreTrait,
};
use crate::session::SessionContext;
use crate::sync::{RemoteAuthority, SyncTrigger};

/// Maximum rows returned by a local attendee search.
pub const SEARCH_RESULT_LIMIT: i64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    /// Every scan goes to the remote authority.
    Online,
    /// Scans are decided against the synced catalog.
    Offline,
    /// Scans are decided from ticket signatures alone.
    Dataless,
}

impl ValidationMode {
    pub fn from_config(config: &CheckinConfig) -> Self {
        match (config.offline_mode, config.download_orders) {
            (false, _) => Self::Online,
            (true, true) => Self::Offline,
            (true, false) => Self::Dataless,
        }
    }
}

/// Capability shared by all validation strategies.
#[async_trait]
pub trait TicketValidator: Send + Sync {
    fn mode(&self) -> ValidationMode;

    async fn redeem(
        &self,
        session: &SessionContext,
        request: RedemptionRequest,
    ) -> Result<RedemptionResult>;

    async fn search(&self, session: &SessionContext, query: &str) -> Result<Vec<SearchResult>>;

    async fn check_in_list_status(&self, session: &SessionContext) -> Result<CheckInListStatus>;
}

/// Collaborators needed to build any of the strategies.
#[derive(Clone)]
pub struct ValidatorDeps {
    pub remote: Arc<dyn RemoteAuthority>,
    pub catalog: Arc<dyn CatalogRepositoryTrait>,
    pub store: Arc<dyn RedemptionStoreTrait>,
    pub events: Arc<dyn CheckinEventSink>,
    pub trigger: SyncTrigger,
}

/// Picks the strategy for a session. Call once per session, not per scan.
pub fn select_validator(config: &CheckinConfig, deps: ValidatorDeps) -> Arc<dyn TicketValidator> {
    let mode = ValidationMode::from_config(config);
    log::info!("[Validator] Using {:?} validation", mode);

    let engine = |dataless_only: bool| {
        RedemptionEngine::new(
            Arc::clone(&deps.store),
            Arc::clone(&deps.events),
            RedemptionSettings {
                report_failed_checkins: config.report_failed_checkins,
                auto_sync: config.auto_sync,
                dataless_only,
            },
        )
        .with_sync_trigger(deps.trigger.clone())
    };

    match mode {
        ValidationMode::Online => Arc::new(OnlineValidator::new(Arc::clone(&deps.remote))),
        ValidationMode::Offline => {
            Arc::new(OfflineValidator::new(engine(false), Arc::clone(&deps.catalog)))
        }
        ValidationMode::Dataless => {
            Arc::new(DatalessValidator::new(engine(true), Arc::clone(&deps.catalog)))
        }
    }
}

#[cfg(test)]
mod tests;
