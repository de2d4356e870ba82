use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info};
use uuid::Uuid;

use super::redemption_model::{
    ErrorReason, RedemptionRequest, RedemptionResult, RedemptionStatus,
};
use super::redemption_traits::{LedgerJob, RedemptionLedger, RedemptionStoreTrait};
use crate::catalog::{
    Answer, CheckIn, CheckInList, CheckInSource, CheckInType, Item, OrderPosition, OrderStatus,
    Question,
};
use crate::errors::Result;
use crate::events::{CheckinEvent, CheckinEventSink};
use crate::session::SessionContext;
use crate::sync::SyncTrigger;
use crate::tickets::{decode_ticket, SignedTicketPayload};
use crate::uploads::{
    NewFailedCheckIn, NewQueuedRedemption, QueuedRedemptionRequest, RedeemRequestBody,
};

/// Behaviour switches for the redemption engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedemptionSettings {
    /// Queue rejected scans for audit upload.
    pub report_failed_checkins: bool,
    /// Signal the sync engine after every accepted scan.
    pub auto_sync: bool,
    /// Skip the synced catalog and validate signatures only.
    pub dataless_only: bool,
}

impl Default for RedemptionSettings {
    fn default() -> Self {
        Self {
            report_failed_checkins: true,
            auto_sync: true,
            dataless_only: false,
        }
    }
}

/// Decides redemption attempts against the local catalog and records
/// accepted ones for upload.
pub struct RedemptionEngine {
    store: Arc<dyn RedemptionStoreTrait>,
    events: Arc<dyn CheckinEventSink>,
    trigger: Option<SyncTrigger>,
    settings: RedemptionSettings,
}

impl RedemptionEngine {
    pub fn new(
        store: Arc<dyn RedemptionStoreTrait>,
        events: Arc<dyn CheckinEventSink>,
        settings: RedemptionSettings,
    ) -> Self {
        Self {
            store,
            events,
            trigger: None,
            settings,
        }
    }

    pub fn with_sync_trigger(mut self, trigger: SyncTrigger) -> Self {
        self.trigger = Some(trigger);
        self
    }

    pub fn settings(&self) -> RedemptionSettings {
        self.settings
    }

    pub async fn redeem(
        &self,
        session: &SessionContext,
        request: RedemptionRequest,
    ) -> Result<RedemptionResult> {
        let scan = Scan {
            event_slug: session.event_slug.clone(),
            list: session.checkin_list.clone(),
            now: request.datetime.unwrap_or_else(Utc::now),
            nonce: request
                .nonce
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            request,
            settings: self.settings,
        };
        let secret = scan.request.secret.clone();
        let list_id = scan.list.id;

        let job: LedgerJob = Box::new(move |ledger| decide(ledger, &scan));
        let result = self.store.transact(job).await?;

        match (&result.status, &result.reason) {
            (status, _) if status.is_accepted() => {
                info!("[Redeem] Accepted scan on list {} ({})", list_id, status.as_str());
                self.events.emit(CheckinEvent::RedemptionRecorded {
                    secret,
                    list_id,
                    status: status.clone(),
                    nonce: result.nonce.clone().unwrap_or_default(),
                });
                if self.settings.auto_sync {
                    if let Some(trigger) = &self.trigger {
                        trigger.request();
                    }
                }
            }
            (_, Some(reason)) => {
                info!("[Redeem] Rejected scan on list {}: {}", list_id, reason.as_str());
                self.events.emit(CheckinEvent::RedemptionRejected {
                    secret,
                    list_id,
                    reason: reason.clone(),
                });
            }
            _ => debug!("[Redeem] Scan on list {} needs answers", list_id),
        }

        Ok(result)
    }
}

/// Inputs of one decision, moved into the ledger transaction.
pub(crate) struct Scan {
    pub event_slug: String,
    pub list: CheckInList,
    pub request: RedemptionRequest,
    pub now: DateTime<Utc>,
    pub nonce: String,
    pub settings: RedemptionSettings,
}

/// What is known about the scanned ticket so far.
#[derive(Default)]
struct Facts {
    position: Option<OrderPosition>,
    item: Option<Item>,
    order_status: Option<OrderStatus>,
    item_id: Option<i64>,
    variation_id: Option<i64>,
    subevent_id: Option<i64>,
}

impl Facts {
    fn from_position(position: &OrderPosition) -> Self {
        Self {
            position: Some(position.clone()),
            item_id: Some(position.item_id),
            variation_id: position.variation_id,
            subevent_id: position.subevent_id,
            ..Self::default()
        }
    }

    fn from_payload(payload: &SignedTicketPayload) -> Self {
        Self {
            item_id: Some(payload.item_id),
            variation_id: payload.variation_id,
            subevent_id: payload.subevent_id,
            ..Self::default()
        }
    }
}

/// Runs the full decision inside the caller's transaction.
pub(crate) fn decide(ledger: &mut dyn RedemptionLedger, scan: &Scan) -> Result<RedemptionResult> {
    if matches!(scan.request.checkin_type, CheckInType::Unknown(_)) {
        return reject(ledger, scan, ErrorReason::Invalid, Facts::default());
    }

    let position = if scan.settings.dataless_only {
        None
    } else {
        ledger.position_by_secret(&scan.request.secret)?
    };

    match position {
        Some(position) => decide_synced(ledger, scan, position),
        None => decide_dataless(ledger, scan),
    }
}

fn decide_synced(
    ledger: &mut dyn RedemptionLedger,
    scan: &Scan,
    position: OrderPosition,
) -> Result<RedemptionResult> {
    let secret = scan.request.secret.as_str();
    let mut facts = Facts::from_position(&position);
    facts.item = ledger.item(position.item_id)?;
    let order = ledger.order(&position.order_code)?;
    facts.order_status = order.as_ref().map(|o| o.status.clone());

    // Blocking is never overridden by force.
    if position.blocked || ledger.is_secret_blocked(secret)? {
        return reject(ledger, scan, ErrorReason::Blocked, facts);
    }
    if ledger.is_secret_revoked(secret)? {
        return reject(ledger, scan, ErrorReason::Revoked, facts);
    }
    if !scan.list.admits_subevent(position.subevent_id) {
        return reject(ledger, scan, ErrorReason::InvalidProductSubEvent, facts);
    }
    if !scan.list.admits_product(position.item_id) {
        return reject(ledger, scan, ErrorReason::Product, facts);
    }

    let Some(order) = order else {
        return reject(ledger, scan, ErrorReason::Invalid, facts);
    };
    match order.status {
        OrderStatus::Paid => {}
        OrderStatus::Pending => {
            let paid_equivalent = scan.list.include_pending && order.valid_if_pending;
            if !paid_equivalent && !scan.request.ignore_unpaid {
                return reject(ledger, scan, ErrorReason::Unpaid, facts);
            }
        }
        OrderStatus::Canceled | OrderStatus::Expired => {
            return reject(ledger, scan, ErrorReason::Canceled, facts);
        }
        OrderStatus::Unknown(_) => {
            return reject(ledger, scan, ErrorReason::Invalid, facts);
        }
    }

    if !scan.request.force && !within_window(position.valid_from, position.valid_until, scan.now)
    {
        return reject(ledger, scan, ErrorReason::Invalid, facts);
    }

    let live = ledger.live_redemption(
        &scan.event_slug,
        secret,
        scan.list.id,
        &scan.request.checkin_type,
    )?;
    if !scan.request.force {
        let history = ledger.checkins_for_secret(secret)?;
        if live.is_some() || !direction_allowed(&scan.list, &history, &scan.request.checkin_type)
        {
            return reject(ledger, scan, ErrorReason::AlreadyRedeemed, facts);
        }
    }

    let questions = ledger.questions_for_item(position.item_id)?;
    let unanswered = unanswered_questions(&questions, &position.answers, &scan.request.answers);
    if !unanswered.is_empty() {
        return Ok(incomplete(scan, facts, unanswered));
    }

    accept(ledger, scan, facts, live, RedemptionStatus::Redeemed)
}

fn decide_dataless(ledger: &mut dyn RedemptionLedger, scan: &Scan) -> Result<RedemptionResult> {
    let secret = scan.request.secret.as_str();

    let keys = ledger.signing_keys()?;
    if keys.is_empty() {
        return reject(ledger, scan, ErrorReason::NoKeys, Facts::default());
    }
    if ledger.is_secret_revoked(secret)? {
        return reject(ledger, scan, ErrorReason::Revoked, Facts::default());
    }
    if ledger.is_secret_blocked(secret)? {
        return reject(ledger, scan, ErrorReason::Blocked, Facts::default());
    }

    let payload = match decode_ticket(secret, &keys.valid_keys) {
        Ok(payload) => payload,
        Err(err) => {
            debug!("[Redeem] Signed ticket rejected: {}", err);
            return reject(ledger, scan, ErrorReason::Invalid, Facts::default());
        }
    };
    let mut facts = Facts::from_payload(&payload);

    if !scan.list.admits_subevent(payload.subevent_id) {
        return reject(ledger, scan, ErrorReason::InvalidProductSubEvent, facts);
    }
    if !scan.list.admits_product(payload.item_id) {
        return reject(ledger, scan, ErrorReason::Product, facts);
    }
    facts.item = ledger.item(payload.item_id)?;
    if facts.item.is_none() {
        return reject(ledger, scan, ErrorReason::UnknownItem, facts);
    }

    if !scan.request.force && !payload.is_valid_at(scan.now) {
        return reject(ledger, scan, ErrorReason::Invalid, facts);
    }

    let live = ledger.live_redemption(
        &scan.event_slug,
        secret,
        scan.list.id,
        &scan.request.checkin_type,
    )?;
    if !scan.request.force {
        let history = ledger.checkins_for_secret(secret)?;
        if live.is_some() || !direction_allowed(&scan.list, &history, &scan.request.checkin_type)
        {
            return reject(ledger, scan, ErrorReason::AlreadyRedeemed, facts);
        }
    }

    let questions = ledger.questions_for_item(payload.item_id)?;
    let unanswered = unanswered_questions(&questions, &[], &scan.request.answers);
    if !unanswered.is_empty() {
        return Ok(incomplete(scan, facts, unanswered));
    }

    accept(ledger, scan, facts, live, RedemptionStatus::PendingConfirmation)
}

fn within_window(
    valid_from: Option<DateTime<Utc>>,
    valid_until: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    valid_from.map_or(true, |from| now >= from) && valid_until.map_or(true, |until| now <= until)
}

/// Whether the requested direction is allowed given the list's history.
///
/// Exits are always allowed. An entry is refused while the latest event on
/// the list is an entry, unless the list allows multiple entries.
pub(crate) fn direction_allowed(
    list: &CheckInList,
    history: &[CheckIn],
    requested: &CheckInType,
) -> bool {
    if *requested != CheckInType::Entry || list.allow_multiple_entries {
        return true;
    }

    let on_list: Vec<&CheckIn> = history.iter().filter(|c| c.list_id == list.id).collect();
    if !on_list.iter().any(|c| c.checkin_type == CheckInType::Entry) {
        return true;
    }

    match on_list.iter().max_by_key(|c| c.timestamp) {
        Some(last) if last.checkin_type == CheckInType::Entry => false,
        Some(_) => list.allow_entry_after_exit,
        None => true,
    }
}

fn unanswered_questions(
    questions: &[Question],
    stored: &[Answer],
    supplied: &Option<Vec<Answer>>,
) -> Vec<Question> {
    let answered: HashSet<i64> = questions
        .iter()
        .filter(|question| {
            stored
                .iter()
                .chain(supplied.iter().flatten())
                .any(|a| a.question_id == question.id && a.satisfies(question))
        })
        .map(|question| question.id)
        .collect();

    questions
        .iter()
        .filter(|q| q.must_be_answered_at_checkin() && !answered.contains(&q.id))
        .cloned()
        .collect()
}

fn reject(
    ledger: &mut dyn RedemptionLedger,
    scan: &Scan,
    reason: ErrorReason,
    facts: Facts,
) -> Result<RedemptionResult> {
    if scan.settings.report_failed_checkins {
        ledger.record_failed_checkin(&NewFailedCheckIn {
            event_slug: scan.event_slug.clone(),
            checkin_list_id: scan.list.id,
            raw_barcode: scan.request.secret.clone(),
            error_reason: reason.clone(),
            checkin_type: scan.request.checkin_type.clone(),
            datetime: scan.now,
            position_id: facts.position.as_ref().map(|p| p.id),
            item_id: facts.item_id,
            variation_id: facts.variation_id,
            subevent_id: facts.subevent_id,
        })?;
    }

    Ok(RedemptionResult {
        position: facts.position,
        item: facts.item,
        order_status: facts.order_status,
        ..RedemptionResult::rejected(reason)
    })
}

fn incomplete(scan: &Scan, facts: Facts, questions: Vec<Question>) -> RedemptionResult {
    RedemptionResult {
        nonce: Some(scan.nonce.clone()),
        position: facts.position,
        item: facts.item,
        order_status: facts.order_status,
        required_questions: questions,
        ..RedemptionResult::with_status(RedemptionStatus::Incomplete)
    }
}

fn accept(
    ledger: &mut dyn RedemptionLedger,
    scan: &Scan,
    facts: Facts,
    live: Option<QueuedRedemptionRequest>,
    status: RedemptionStatus,
) -> Result<RedemptionResult> {
    let request = &scan.request;
    // A forced scan takes over the live entry for the same list and direction
    // and keeps its nonce. Any other scan gets an entry of its own.
    let nonce = live
        .as_ref()
        .map_or_else(|| scan.nonce.clone(), |entry| entry.nonce.clone());

    let body = RedeemRequestBody {
        questions_supported: true,
        datetime: Some(scan.now),
        force: request.force,
        ignore_unpaid: request.ignore_unpaid,
        nonce: nonce.clone(),
        answers: RedeemRequestBody::answers_from(request.answers.as_deref().unwrap_or_default()),
        checkin_type: request.checkin_type.clone(),
    };

    match &live {
        Some(entry) => ledger.supersede_redemption(entry.id, &body)?,
        None => {
            ledger.enqueue_redemption(&NewQueuedRedemption {
                secret: request.secret.clone(),
                event_slug: scan.event_slug.clone(),
                checkin_list_id: scan.list.id,
                body,
            })?;
        }
    }

    ledger.append_checkin(&CheckIn {
        position_secret: request.secret.clone(),
        list_id: scan.list.id,
        checkin_type: request.checkin_type.clone(),
        timestamp: scan.now,
        source: CheckInSource::Queued,
        nonce: Some(nonce.clone()),
    })?;
    let checkins = ledger.checkins_for_secret(&request.secret)?;

    Ok(RedemptionResult {
        status,
        reason: None,
        nonce: Some(nonce),
        position: facts.position,
        item: facts.item,
        order_status: facts.order_status,
        required_questions: Vec::new(),
        checkins,
        offline: true,
    })
}
