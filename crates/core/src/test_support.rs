//! In-memory fakes shared by the unit tests of this crate.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::catalog::*;
use crate::errors::{DatabaseError, Result};
use crate::redemption::{LedgerJob, RedemptionLedger, RedemptionResult, RedemptionStoreTrait};
use crate::session::SessionContext;
use crate::sync::*;
use crate::tickets::SignedKeySet;
use crate::uploads::*;

// ─────────────────────────────────────────────────────────────────────────────
// Fixtures
// ─────────────────────────────────────────────────────────────────────────────

pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 2, hour, minute, 0)
        .single()
        .expect("valid fixture time")
}

pub fn list(id: i64) -> CheckInList {
    CheckInList {
        id,
        name: format!("List {id}"),
        all_products: true,
        limit_products: Vec::new(),
        subevent: None,
        include_pending: false,
        allow_multiple_entries: false,
        allow_entry_after_exit: true,
    }
}

pub fn session(checkin_list: CheckInList) -> SessionContext {
    SessionContext::new("demo", "democon", checkin_list)
}

pub fn item(id: i64) -> Item {
    Item {
        id,
        name: format!("Item {id}"),
        active: true,
        admission: true,
    }
}

pub fn position(id: i64, secret: &str, order_code: &str, item_id: i64) -> OrderPosition {
    OrderPosition {
        id,
        order_code: order_code.to_string(),
        secret: secret.to_string(),
        item_id,
        variation_id: None,
        subevent_id: None,
        attendee_name: Some(format!("Attendee {id}")),
        seat: None,
        addon_to: None,
        valid_from: None,
        valid_until: None,
        blocked: false,
        answers: Vec::new(),
        checkins: Vec::new(),
    }
}

pub fn order(code: &str, status: OrderStatus, positions: Vec<OrderPosition>) -> Order {
    Order {
        code: code.to_string(),
        status,
        valid_if_pending: false,
        positions,
        last_modified: None,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Memory store
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone)]
pub struct MemoryState {
    pub positions: BTreeMap<String, OrderPosition>,
    pub orders: BTreeMap<String, Order>,
    pub items: BTreeMap<i64, Item>,
    pub questions: Vec<Question>,
    pub lists: BTreeMap<i64, CheckInList>,
    pub checkins: Vec<CheckIn>,
    pub queue: Vec<QueuedRedemptionRequest>,
    pub outcomes: Vec<UploadOutcome>,
    pub failed: Vec<FailedCheckIn>,
    pub keys: SignedKeySet,
    pub revoked: BTreeSet<String>,
    pub blocked: BTreeSet<String>,
    pub cursors: HashMap<ResourceKind, SyncCursor>,
    pub status: SyncEngineStatus,
    pub next_id: i64,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn add_order(&mut self, order: Order) {
        for position in order.normalized_positions() {
            self.positions.insert(position.secret.clone(), position);
        }
        self.orders.insert(
            order.code.clone(),
            Order {
                positions: Vec::new(),
                ..order
            },
        );
    }

    fn apply(&mut self, records: CatalogRecords) -> usize {
        let count = records.len();
        match records {
            CatalogRecords::Event(event) => {
                if event.valid_keys != self.keys.valid_keys {
                    self.keys = SignedKeySet {
                        version: self.keys.version + 1,
                        valid_keys: event.valid_keys,
                    };
                }
            }
            CatalogRecords::Items(items) => {
                for item in items {
                    self.items.insert(item.id, item);
                }
            }
            CatalogRecords::Questions(questions) => {
                for question in questions {
                    self.questions.retain(|q| q.id != question.id);
                    self.questions.push(question);
                }
            }
            CatalogRecords::CheckInLists(lists) => {
                for list in lists {
                    self.lists.insert(list.id, list);
                }
            }
            CatalogRecords::Orders(orders) => {
                for order in orders {
                    for position in order.normalized_positions() {
                        let live: BTreeSet<String> =
                            self.queue.iter().map(|q| q.nonce.clone()).collect();
                        self.checkins.retain(|c| {
                            c.position_secret != position.secret
                                || (c.source == CheckInSource::Queued
                                    && c.nonce.as_ref().is_some_and(|n| live.contains(n)))
                        });
                        for checkin in &position.checkins {
                            self.checkins.push(CheckIn::synced(&position.secret, checkin));
                        }
                    }
                    self.add_order(order);
                }
            }
            CatalogRecords::RevokedSecrets(rows) => {
                self.revoked.extend(rows.into_iter().map(|r| r.secret));
            }
            CatalogRecords::BlockedSecrets(rows) => {
                for row in rows {
                    if row.blocked {
                        self.blocked.insert(row.secret);
                    } else {
                        self.blocked.remove(&row.secret);
                    }
                }
            }
        }
        count
    }
}

impl RedemptionLedger for MemoryState {
    fn position_by_secret(&mut self, secret: &str) -> Result<Option<OrderPosition>> {
        Ok(self.positions.get(secret).cloned())
    }

    fn order(&mut self, code: &str) -> Result<Option<Order>> {
        Ok(self.orders.get(code).cloned())
    }

    fn item(&mut self, item_id: i64) -> Result<Option<Item>> {
        Ok(self.items.get(&item_id).cloned())
    }

    fn questions_for_item(&mut self, item_id: i64) -> Result<Vec<Question>> {
        Ok(self
            .questions
            .iter()
            .filter(|q| q.applies_to(item_id))
            .cloned()
            .collect())
    }

    fn checkins_for_secret(&mut self, secret: &str) -> Result<Vec<CheckIn>> {
        let mut rows: Vec<CheckIn> = self
            .checkins
            .iter()
            .filter(|c| c.position_secret == secret)
            .cloned()
            .collect();
        rows.sort_by_key(|c| c.timestamp);
        Ok(rows)
    }

    fn live_redemption(
        &mut self,
        event_slug: &str,
        secret: &str,
        list_id: i64,
        checkin_type: &CheckInType,
    ) -> Result<Option<QueuedRedemptionRequest>> {
        Ok(self
            .queue
            .iter()
            .find(|q| {
                q.event_slug == event_slug
                    && q.secret == secret
                    && q.checkin_list_id == list_id
                    && q.body.checkin_type == *checkin_type
            })
            .cloned())
    }

    fn signing_keys(&mut self) -> Result<SignedKeySet> {
        Ok(self.keys.clone())
    }

    fn is_secret_revoked(&mut self, secret: &str) -> Result<bool> {
        Ok(self.revoked.contains(secret))
    }

    fn is_secret_blocked(&mut self, secret: &str) -> Result<bool> {
        Ok(self.blocked.contains(secret))
    }

    fn append_checkin(&mut self, checkin: &CheckIn) -> Result<()> {
        let duplicate = self.checkins.iter().any(|c| {
            c.position_secret == checkin.position_secret
                && c.list_id == checkin.list_id
                && c.checkin_type == checkin.checkin_type
                && c.timestamp == checkin.timestamp
        });
        if !duplicate {
            self.checkins.push(checkin.clone());
        }
        Ok(())
    }

    fn enqueue_redemption(
        &mut self,
        request: &NewQueuedRedemption,
    ) -> Result<QueuedRedemptionRequest> {
        let clash = self.queue.iter().any(|q| {
            q.event_slug == request.event_slug
                && q.secret == request.secret
                && q.checkin_list_id == request.checkin_list_id
                && q.body.checkin_type == request.body.checkin_type
        });
        if clash {
            return Err(DatabaseError::QueryFailed("UNIQUE constraint failed".into()).into());
        }
        let entry = QueuedRedemptionRequest {
            id: self.next_id(),
            secret: request.secret.clone(),
            nonce: request.body.nonce.clone(),
            event_slug: request.event_slug.clone(),
            checkin_list_id: request.checkin_list_id,
            body: request.body.clone(),
            enqueued_at: Utc::now(),
            retry_count: 0,
            next_retry_at: None,
            last_error: None,
        };
        self.queue.push(entry.clone());
        Ok(entry)
    }

    fn supersede_redemption(&mut self, id: i64, body: &RedeemRequestBody) -> Result<()> {
        let entry = self
            .queue
            .iter_mut()
            .find(|q| q.id == id)
            .ok_or_else(|| DatabaseError::NotFound(format!("queued redemption {id}")))?;
        entry.body = body.clone();
        entry.body.nonce = entry.nonce.clone();
        Ok(())
    }

    fn record_failed_checkin(&mut self, failed: &NewFailedCheckIn) -> Result<()> {
        let id = self.next_id();
        self.failed.push(FailedCheckIn {
            id,
            event_slug: failed.event_slug.clone(),
            checkin_list_id: failed.checkin_list_id,
            raw_barcode: failed.raw_barcode.clone(),
            error_reason: failed.error_reason.clone(),
            checkin_type: failed.checkin_type.clone(),
            datetime: failed.datetime,
            position_id: failed.position_id,
            item_id: failed.item_id,
            variation_id: failed.variation_id,
            subevent_id: failed.subevent_id,
            enqueued_at: Utc::now(),
            retry_count: 0,
            next_retry_at: None,
        });
        Ok(())
    }
}

/// Fake of every store trait over one [`MemoryState`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    pub state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn with(state: MemoryState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn snapshot(&self) -> MemoryState {
        self.state.lock().expect("state lock").clone()
    }

    fn update<T>(&self, f: impl FnOnce(&mut MemoryState) -> T) -> T {
        let mut guard = self.state.lock().expect("state lock");
        f(&mut guard)
    }
}

#[async_trait]
impl RedemptionStoreTrait for MemoryStore {
    async fn transact(&self, job: LedgerJob) -> Result<RedemptionResult> {
        let mut guard = self.state.lock().expect("state lock");
        let mut working = guard.clone();
        let result = job(&mut working)?;
        *guard = working;
        Ok(result)
    }
}

#[async_trait]
impl CatalogRepositoryTrait for MemoryStore {
    fn get_position_by_secret(&self, secret: &str) -> Result<Option<OrderPosition>> {
        Ok(self.snapshot().positions.get(secret).cloned())
    }

    fn get_order(&self, code: &str) -> Result<Option<Order>> {
        Ok(self.snapshot().orders.get(code).cloned())
    }

    fn get_item(&self, item_id: i64) -> Result<Option<Item>> {
        Ok(self.snapshot().items.get(&item_id).cloned())
    }

    fn list_items(&self) -> Result<Vec<Item>> {
        Ok(self.snapshot().items.into_values().collect())
    }

    fn get_checkin_list(&self, list_id: i64) -> Result<Option<CheckInList>> {
        Ok(self.snapshot().lists.get(&list_id).cloned())
    }

    fn list_checkin_lists(&self) -> Result<Vec<CheckInList>> {
        Ok(self.snapshot().lists.into_values().collect())
    }

    fn checkins_for_secret(&self, secret: &str) -> Result<Vec<CheckIn>> {
        self.snapshot().checkins_for_secret(secret)
    }

    fn signed_keys(&self) -> Result<SignedKeySet> {
        Ok(self.snapshot().keys)
    }

    fn search_positions(
        &self,
        query: &str,
        list: &CheckInList,
        limit: i64,
    ) -> Result<Vec<SearchResult>> {
        let state = self.snapshot();
        let needle = query.to_lowercase();
        Ok(state
            .positions
            .values()
            .filter(|p| list.admits_product(p.item_id))
            .filter(|p| {
                p.secret.to_lowercase().starts_with(&needle)
                    || p.order_code.to_lowercase().contains(&needle)
                    || p.attendee_name
                        .as_deref()
                        .is_some_and(|n| n.to_lowercase().contains(&needle))
            })
            .take(limit.max(0) as usize)
            .map(|p| SearchResult {
                secret: p.secret.clone(),
                order_code: p.order_code.clone(),
                attendee_name: p.attendee_name.clone(),
                item_id: p.item_id,
                item_name: state.items.get(&p.item_id).map(|i| i.name.clone()),
                order_status: state.orders.get(&p.order_code).map(|o| o.status.clone()),
                checked_in: state
                    .checkins
                    .iter()
                    .any(|c| c.position_secret == p.secret && c.list_id == list.id),
            })
            .collect())
    }

    fn checkin_list_status(&self, list: &CheckInList) -> Result<CheckInListStatus> {
        let state = self.snapshot();
        let eligible: Vec<&OrderPosition> = state
            .positions
            .values()
            .filter(|p| list.admits_product(p.item_id) && list.admits_subevent(p.subevent_id))
            .collect();
        let checked = |wanted: &str| {
            eligible
                .iter()
                .filter(|p| {
                    let mut history: Vec<&CheckIn> = state
                        .checkins
                        .iter()
                        .filter(|c| c.position_secret == p.secret && c.list_id == list.id)
                        .collect();
                    history.sort_by_key(|c| c.timestamp);
                    match wanted {
                        "any" => history.iter().any(|c| c.checkin_type == CheckInType::Entry),
                        _ => history
                            .last()
                            .is_some_and(|c| c.checkin_type == CheckInType::Entry),
                    }
                })
                .count() as i64
        };
        Ok(CheckInListStatus {
            list_id: list.id,
            position_count: eligible.len() as i64,
            checkin_count: checked("any"),
            inside_count: checked("inside"),
        })
    }

    fn get_cursor(&self, resource: ResourceKind) -> Result<Option<SyncCursor>> {
        Ok(self.snapshot().cursors.get(&resource).cloned())
    }

    async fn merge_page(&self, records: CatalogRecords, cursor: SyncCursor) -> Result<usize> {
        Ok(self.update(|state| {
            let count = state.apply(records);
            state.cursors.insert(cursor.resource, cursor);
            count
        }))
    }

    async fn save_cursor(&self, cursor: SyncCursor) -> Result<()> {
        self.update(|state| {
            state.cursors.insert(cursor.resource, cursor);
        });
        Ok(())
    }
}

#[async_trait]
impl UploadQueueRepositoryTrait for MemoryStore {
    async fn enqueue(&self, request: NewQueuedRedemption) -> Result<QueuedRedemptionRequest> {
        self.update(|state| state.enqueue_redemption(&request))
    }

    fn dequeue_next(&self) -> Result<Option<QueuedRedemptionRequest>> {
        Ok(self.snapshot().queue.first().cloned())
    }

    fn peek_by_secret(&self, secret: &str) -> Result<Option<QueuedRedemptionRequest>> {
        Ok(self
            .snapshot()
            .queue
            .into_iter()
            .find(|q| q.secret == secret))
    }

    fn list_pending(&self, limit: i64) -> Result<Vec<QueuedRedemptionRequest>> {
        Ok(self
            .snapshot()
            .queue
            .into_iter()
            .take(limit.max(0) as usize)
            .collect())
    }

    fn pending_count(&self) -> Result<i64> {
        Ok(self.snapshot().queue.len() as i64)
    }

    async fn acknowledge(&self, id: i64, outcome: UploadOutcome) -> Result<()> {
        self.update(|state| {
            state.queue.retain(|q| q.id != id);
            state.outcomes.push(outcome);
        });
        Ok(())
    }

    async fn schedule_retry(&self, id: i64, error: String) -> Result<()> {
        self.update(|state| {
            if let Some(entry) = state.queue.iter_mut().find(|q| q.id == id) {
                entry.next_retry_at =
                    Some(Utc::now() + Duration::seconds(backoff_seconds(entry.retry_count)));
                entry.retry_count += 1;
                entry.last_error = Some(error);
            }
        });
        Ok(())
    }

    fn recent_outcomes(&self, limit: i64) -> Result<Vec<UploadOutcome>> {
        Ok(self
            .snapshot()
            .outcomes
            .into_iter()
            .rev()
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn enqueue_failed_checkin(&self, failed: NewFailedCheckIn) -> Result<FailedCheckIn> {
        self.update(|state| -> Result<FailedCheckIn> {
            state.record_failed_checkin(&failed)?;
            state
                .failed
                .last()
                .cloned()
                .ok_or_else(|| DatabaseError::Internal("missing row".into()).into())
        })
    }

    fn next_failed_checkin(&self) -> Result<Option<FailedCheckIn>> {
        Ok(self.snapshot().failed.first().cloned())
    }

    fn failed_checkin_count(&self) -> Result<i64> {
        Ok(self.snapshot().failed.len() as i64)
    }

    async fn acknowledge_failed_checkin(&self, id: i64) -> Result<()> {
        self.update(|state| state.failed.retain(|f| f.id != id));
        Ok(())
    }

    async fn schedule_failed_checkin_retry(&self, id: i64, _error: String) -> Result<()> {
        self.update(|state| {
            if let Some(failed) = state.failed.iter_mut().find(|f| f.id == id) {
                failed.next_retry_at = Some(Utc::now() + Duration::seconds(60));
                failed.retry_count += 1;
            }
        });
        Ok(())
    }

    fn get_engine_status(&self) -> Result<SyncEngineStatus> {
        Ok(self.snapshot().status)
    }

    async fn mark_push_completed(&self) -> Result<()> {
        self.update(|state| {
            state.status.last_push_at = Some(Utc::now().to_rfc3339());
            state.status.consecutive_failures = 0;
            state.status.paused_until = None;
        });
        Ok(())
    }

    async fn mark_pull_completed(&self) -> Result<()> {
        self.update(|state| state.status.last_pull_at = Some(Utc::now().to_rfc3339()));
        Ok(())
    }

    async fn mark_engine_error(&self, error: String) -> Result<()> {
        self.update(|state| {
            state.status.last_error = Some(error);
            state.status.consecutive_failures += 1;
        });
        Ok(())
    }

    async fn pause_until(&self, until: DateTime<Utc>) -> Result<()> {
        self.update(|state| state.status.paused_until = Some(until.to_rfc3339()));
        Ok(())
    }

    async fn mark_cycle_outcome(&self, status: String, duration_ms: i64) -> Result<()> {
        self.update(|state| {
            state.status.last_cycle_status = Some(status);
            state.status.last_cycle_duration_ms = Some(duration_ms);
        });
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scripted remote
// ─────────────────────────────────────────────────────────────────────────────

/// Remote authority answering from scripted queues and recording calls.
#[derive(Debug, Default)]
pub struct ScriptedRemote {
    pub pages: Mutex<VecDeque<std::result::Result<PageFetch, RemoteError>>>,
    pub redeems: Mutex<VecDeque<std::result::Result<RemoteRedeemResponse, RemoteError>>>,
    pub failed_uploads: Mutex<VecDeque<std::result::Result<(), RemoteError>>>,
    pub page_requests: Mutex<Vec<PageRequest>>,
    pub redeemed: Mutex<Vec<(i64, String, RedeemRequestBody)>>,
    pub device_updates: Mutex<usize>,
}

impl ScriptedRemote {
    pub fn push_page(&self, page: std::result::Result<PageFetch, RemoteError>) {
        self.pages.lock().expect("lock").push_back(page);
    }

    pub fn push_redeem(&self, response: std::result::Result<RemoteRedeemResponse, RemoteError>) {
        self.redeems.lock().expect("lock").push_back(response);
    }

    pub fn requests(&self) -> Vec<PageRequest> {
        self.page_requests.lock().expect("lock").clone()
    }

    pub fn redeemed_secrets(&self) -> Vec<String> {
        self.redeemed
            .lock()
            .expect("lock")
            .iter()
            .map(|(_, secret, _)| secret.clone())
            .collect()
    }
}

pub fn redeemed_response() -> RemoteRedeemResponse {
    RemoteRedeemResponse {
        status: crate::redemption::RedemptionStatus::Redeemed,
        reason: None,
        reason_explanation: None,
        position: None,
        questions: Vec::new(),
        require_attention: false,
    }
}

pub fn page(results: Vec<serde_json::Value>, has_next: bool, generated: &str) -> PageFetch {
    PageFetch::Page(RemotePage {
        results,
        has_next,
        generated_at: Some(generated.to_string()),
        last_modified: None,
    })
}

#[async_trait]
impl RemoteAuthority for ScriptedRemote {
    async fn fetch_page(
        &self,
        request: &PageRequest,
    ) -> std::result::Result<PageFetch, RemoteError> {
        self.page_requests.lock().expect("lock").push(request.clone());
        self.pages
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or(Ok(PageFetch::NotModified))
    }

    async fn redeem(
        &self,
        list_id: i64,
        secret: &str,
        body: &RedeemRequestBody,
    ) -> std::result::Result<RemoteRedeemResponse, RemoteError> {
        self.redeemed
            .lock()
            .expect("lock")
            .push((list_id, secret.to_string(), body.clone()));
        self.redeems
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or_else(|| Ok(redeemed_response()))
    }

    async fn upload_failed_checkin(
        &self,
        _list_id: i64,
        _upload: &FailedCheckInUpload,
    ) -> std::result::Result<(), RemoteError> {
        self.failed_uploads
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn search(
        &self,
        _list_id: i64,
        _query: &str,
    ) -> std::result::Result<Vec<SearchResult>, RemoteError> {
        Ok(Vec::new())
    }

    async fn checkin_list_status(
        &self,
        list_id: i64,
    ) -> std::result::Result<CheckInListStatus, RemoteError> {
        Ok(CheckInListStatus {
            list_id,
            position_count: 0,
            checkin_count: 0,
            inside_count: 0,
        })
    }

    async fn update_device_info(&self, _info: &DeviceInfo) -> std::result::Result<(), RemoteError> {
        *self.device_updates.lock().expect("lock") += 1;
        Ok(())
    }

    async fn fetch_version_info(&self) -> std::result::Result<VersionInfo, RemoteError> {
        Ok(VersionInfo {
            version: Some("2026.4.0".to_string()),
            numeric: Some(20260400),
        })
    }
}
