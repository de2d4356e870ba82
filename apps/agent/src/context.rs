use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use log::info;

use checkin_core::catalog::CatalogRepositoryTrait;
use checkin_core::events::BroadcastEventSink;
use checkin_core::sync::{RemoteAuthority, SyncEngine, SyncSettings, SyncTrigger};
use checkin_core::validator::{select_validator, SearchDebouncer, TicketValidator, ValidatorDeps};
use checkin_core::SessionContext;
use checkin_remote_api::RemoteApiClient;
use checkin_storage_sqlite::{
    CatalogRepository, Database, SqliteRedemptionStore, UploadsRepository,
};

use crate::config::AgentConfig;

/// Everything the command loop and the background sync share.
pub struct AgentContext {
    pub config: AgentConfig,
    pub uploads: Arc<UploadsRepository>,
    pub events: Arc<BroadcastEventSink>,
    pub trigger: SyncTrigger,
    pub sync: Arc<SyncEngine>,
    pub validator: Arc<dyn TicketValidator>,
    pub debouncer: SearchDebouncer,
    pub session: SessionContext,
}

impl AgentContext {
    pub async fn build(config: AgentConfig) -> anyhow::Result<Self> {
        let remote = RemoteApiClient::new(config.endpoint.clone())
            .context("failed to build remote client")?;
        Self::build_with_remote(config, Arc::new(remote)).await
    }

    pub async fn build_with_remote(
        config: AgentConfig,
        remote: Arc<dyn RemoteAuthority>,
    ) -> anyhow::Result<Self> {
        let event = config.endpoint.event.clone();
        let database = Database::open(&config.data_dir, &event)
            .with_context(|| format!("failed to open databases in {}", config.data_dir.display()))?;
        info!(
            "[Agent] Catalog {} / uploads {}",
            database.paths.catalog.display(),
            database.paths.uploads.display()
        );

        let catalog = Arc::new(CatalogRepository::new(
            Arc::clone(&database.pool),
            database.writer.clone(),
        ));
        let uploads = Arc::new(UploadsRepository::new(
            Arc::clone(&database.pool),
            database.writer.clone(),
            event.clone(),
        ));
        let store = Arc::new(SqliteRedemptionStore::new(database.writer.clone()));
        let events = Arc::new(BroadcastEventSink::new());
        let trigger = SyncTrigger::new();

        let sync = Arc::new(SyncEngine::new(
            Arc::clone(&remote),
            catalog.clone(),
            uploads.clone(),
            events.clone(),
            SyncSettings::from(&config.checkin),
        ));

        let list = match catalog.get_checkin_list(config.list_id)? {
            Some(list) => list,
            None => {
                info!("[Agent] Check-in list {} not synced yet, pulling catalog", config.list_id);
                sync.pull().await?;
                catalog.get_checkin_list(config.list_id)?.ok_or_else(|| {
                    anyhow!("check-in list {} does not exist in event {}", config.list_id, event)
                })?
            }
        };
        let session = SessionContext::new(config.endpoint.organizer.clone(), event, list);

        let validator = select_validator(
            &config.checkin,
            ValidatorDeps {
                remote,
                catalog: catalog.clone(),
                store,
                events: events.clone(),
                trigger: trigger.clone(),
            },
        );
        let debouncer = SearchDebouncer::new(Duration::from_millis(config.checkin.search_debounce_ms));

        Ok(Self {
            config,
            uploads,
            events,
            trigger,
            sync,
            validator,
            debouncer,
            session,
        })
    }
}
