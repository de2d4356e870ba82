use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use super::*;
use crate::catalog::{CheckInType, OrderStatus};
use crate::events::NoOpEventSink;
use crate::redemption::{ErrorReason, RedemptionStatus};
use crate::sync::{RemoteError, RemoteRedeemResponse};
use crate::test_support::*;

fn deps(store: &Arc<MemoryStore>, remote: &Arc<ScriptedRemote>) -> ValidatorDeps {
    ValidatorDeps {
        remote: remote.clone(),
        catalog: store.clone(),
        store: store.clone(),
        events: Arc::new(NoOpEventSink),
        trigger: SyncTrigger::new(),
    }
}

fn offline_config() -> CheckinConfig {
    CheckinConfig {
        offline_mode: true,
        ..CheckinConfig::default()
    }
}

fn seeded_store() -> Arc<MemoryStore> {
    let mut state = MemoryState::default();
    state.items.insert(10, item(10));
    state.lists.insert(1, list(1));
    state.add_order(order(
        "ABC12",
        OrderStatus::Paid,
        vec![
            position(1, "SECRET1", "ABC12", 10),
            position(2, "SECRET2", "ABC12", 10),
        ],
    ));
    Arc::new(MemoryStore::with(state))
}

#[test]
fn mode_follows_configuration() {
    assert_eq!(
        ValidationMode::from_config(&CheckinConfig::default()),
        ValidationMode::Online
    );
    assert_eq!(
        ValidationMode::from_config(&offline_config()),
        ValidationMode::Offline
    );
    assert_eq!(
        ValidationMode::from_config(&CheckinConfig {
            download_orders: false,
            ..offline_config()
        }),
        ValidationMode::Dataless
    );
}

#[tokio::test]
async fn selected_validator_matches_mode() {
    let store = seeded_store();
    let remote = Arc::new(ScriptedRemote::default());

    let online = select_validator(&CheckinConfig::default(), deps(&store, &remote));
    assert_eq!(online.mode(), ValidationMode::Online);

    let offline = select_validator(&offline_config(), deps(&store, &remote));
    assert_eq!(offline.mode(), ValidationMode::Offline);
}

#[tokio::test]
async fn online_redeem_forwards_request_and_keeps_nonce() {
    let store = seeded_store();
    let remote = Arc::new(ScriptedRemote::default());
    remote.push_redeem(Ok(RemoteRedeemResponse {
        position: Some(json!({"id": 1, "order": "ABC12", "secret": "SECRET1", "item": 10})),
        ..redeemed_response()
    }));
    let validator = select_validator(&CheckinConfig::default(), deps(&store, &remote));

    let request = RedemptionRequest {
        nonce: Some("fixed-nonce".to_string()),
        ..RedemptionRequest::exit("SECRET1")
    };
    let result = validator
        .redeem(&session(list(1)), request)
        .await
        .expect("redeem");

    assert_eq!(result.status, RedemptionStatus::Redeemed);
    assert!(!result.offline);
    assert_eq!(result.nonce.as_deref(), Some("fixed-nonce"));
    assert_eq!(result.position.map(|p| p.id), Some(1));

    let sent = remote.redeemed.lock().expect("lock").clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, 1);
    assert_eq!(sent[0].2.nonce, "fixed-nonce");
    assert_eq!(sent[0].2.checkin_type, CheckInType::Exit);
    // Nothing is queued locally in online mode.
    assert!(store.snapshot().queue.is_empty());
}

#[tokio::test]
async fn online_transport_failure_is_returned() {
    let store = seeded_store();
    let remote = Arc::new(ScriptedRemote::default());
    remote.push_redeem(Err(RemoteError::Transport("offline".into())));
    let validator = select_validator(&CheckinConfig::default(), deps(&store, &remote));

    let err = validator
        .redeem(&session(list(1)), RedemptionRequest::entry("SECRET1"))
        .await
        .expect_err("transport failure");
    assert!(matches!(err, crate::Error::Remote(RemoteError::Transport(_))));
}

#[tokio::test]
async fn offline_validator_redeems_locally_and_searches_catalog() {
    let store = seeded_store();
    let remote = Arc::new(ScriptedRemote::default());
    let validator = select_validator(&offline_config(), deps(&store, &remote));
    let session = session(list(1));

    let result = validator
        .redeem(&session, RedemptionRequest::entry("SECRET1"))
        .await
        .expect("redeem");
    assert_eq!(result.status, RedemptionStatus::Redeemed);
    assert!(result.offline);
    assert!(remote.redeemed_secrets().is_empty());

    let hits = validator.search(&session, "abc").await.expect("search");
    assert_eq!(hits.len(), 2);
    let checked: Vec<bool> = hits.iter().map(|h| h.checked_in).collect();
    assert_eq!(checked, vec![true, false]);

    let status = validator
        .check_in_list_status(&session)
        .await
        .expect("status");
    assert_eq!(status.position_count, 2);
    assert_eq!(status.checkin_count, 1);
    assert_eq!(status.inside_count, 1);
}

#[tokio::test]
async fn dataless_validator_has_no_search_results() {
    let store = seeded_store();
    let remote = Arc::new(ScriptedRemote::default());
    let config = CheckinConfig {
        download_orders: false,
        ..offline_config()
    };
    let validator = select_validator(&config, deps(&store, &remote));
    let session = session(list(1));

    assert!(validator
        .search(&session, "SECRET")
        .await
        .expect("search")
        .is_empty());

    // Unsigned secrets are not looked up in order data.
    let result = validator
        .redeem(&session, RedemptionRequest::entry("SECRET1"))
        .await
        .expect("redeem");
    assert_eq!(result.reason, Some(ErrorReason::NoKeys));
}

/// Counts searches that actually ran.
#[derive(Default)]
struct CountingValidator {
    searches: AtomicUsize,
}

#[async_trait]
impl TicketValidator for CountingValidator {
    fn mode(&self) -> ValidationMode {
        ValidationMode::Offline
    }

    async fn redeem(
        &self,
        _session: &SessionContext,
        _request: RedemptionRequest,
    ) -> Result<RedemptionResult> {
        Ok(RedemptionResult::with_status(RedemptionStatus::Redeemed))
    }

    async fn search(&self, _session: &SessionContext, query: &str) -> Result<Vec<SearchResult>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        Ok(vec![SearchResult {
            secret: query.to_string(),
            order_code: "ABC12".to_string(),
            attendee_name: None,
            item_id: 10,
            item_name: None,
            order_status: None,
            checked_in: false,
        }])
    }

    async fn check_in_list_status(&self, session: &SessionContext) -> Result<CheckInListStatus> {
        Ok(CheckInListStatus {
            list_id: session.list_id(),
            position_count: 0,
            checkin_count: 0,
            inside_count: 0,
        })
    }
}

#[tokio::test]
async fn debouncer_drops_superseded_query() {
    let counting = Arc::new(CountingValidator::default());
    let validator: Arc<dyn TicketValidator> = counting.clone();
    let debouncer = SearchDebouncer::new(Duration::from_millis(50));

    let (first, second) = tokio::join!(
        debouncer.search(validator.clone(), session(list(1)), "AB".to_string()),
        debouncer.search(validator.clone(), session(list(1)), "ABC".to_string()),
    );

    assert!(first.is_none());
    let hits = second.expect("latest query runs").expect("search");
    assert_eq!(hits[0].secret, "ABC");
    assert_eq!(counting.searches.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn debouncer_runs_only_the_newest_of_concurrent_queries() {
    let counting = Arc::new(CountingValidator::default());
    let validator: Arc<dyn TicketValidator> = counting.clone();
    let debouncer = Arc::new(SearchDebouncer::new(Duration::from_millis(200)));

    let tasks: Vec<_> = ["A", "AB", "ABC", "ABCD", "ABCDE", "ABCDEF"]
        .into_iter()
        .map(|query| {
            let debouncer = Arc::clone(&debouncer);
            let validator = validator.clone();
            tokio::spawn(async move {
                debouncer
                    .search(validator, session(list(1)), query.to_string())
                    .await
            })
        })
        .collect();

    let mut completed = Vec::new();
    for task in tasks {
        if let Some(result) = task.await.expect("task joins") {
            completed.push(result.expect("search"));
        }
    }

    assert_eq!(completed.len(), 1);
    assert_eq!(counting.searches.load(Ordering::SeqCst), 1);
}
