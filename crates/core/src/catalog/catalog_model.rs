//! Synced catalog entities: items, questions, check-in lists, orders and
//! positions, plus the locally recorded check-in history.
//!
//! These types double as the wire representation of the remote catalog
//! pages. Server-sent enums decode through `From<String>` so an unrecognised
//! code becomes an `Unknown` variant instead of failing the whole page.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Server enums with unknown fallback
// ─────────────────────────────────────────────────────────────────────────────

/// Payment state of an order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OrderStatus {
    Pending,
    Paid,
    Expired,
    Canceled,
    Unknown(String),
}

impl OrderStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "n",
            Self::Paid => "p",
            Self::Expired => "e",
            Self::Canceled => "c",
            Self::Unknown(raw) => raw,
        }
    }
}

impl From<String> for OrderStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "n" => Self::Pending,
            "p" => Self::Paid,
            "e" => Self::Expired,
            "c" => Self::Canceled,
            _ => Self::Unknown(value),
        }
    }
}

impl From<OrderStatus> for String {
    fn from(value: OrderStatus) -> Self {
        value.as_str().to_string()
    }
}

/// Direction of a check-in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CheckInType {
    Entry,
    Exit,
    Unknown(String),
}

impl CheckInType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Entry => "entry",
            Self::Exit => "exit",
            Self::Unknown(raw) => raw,
        }
    }
}

impl Default for CheckInType {
    fn default() -> Self {
        Self::Entry
    }
}

impl From<String> for CheckInType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "entry" => Self::Entry,
            "exit" => Self::Exit,
            _ => Self::Unknown(value),
        }
    }
}

impl From<CheckInType> for String {
    fn from(value: CheckInType) -> Self {
        value.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum QuestionType {
    Number,
    String,
    Text,
    Boolean,
    Choice,
    MultipleChoice,
    File,
    Date,
    Time,
    DateTime,
    Country,
    Phone,
    Unknown(String),
}

impl QuestionType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Number => "N",
            Self::String => "S",
            Self::Text => "T",
            Self::Boolean => "B",
            Self::Choice => "C",
            Self::MultipleChoice => "M",
            Self::File => "F",
            Self::Date => "D",
            Self::Time => "H",
            Self::DateTime => "W",
            Self::Country => "CC",
            Self::Phone => "TEL",
            Self::Unknown(raw) => raw,
        }
    }
}

impl From<String> for QuestionType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "N" => Self::Number,
            "S" => Self::String,
            "T" => Self::Text,
            "B" => Self::Boolean,
            "C" => Self::Choice,
            "M" => Self::MultipleChoice,
            "F" => Self::File,
            "D" => Self::Date,
            "H" => Self::Time,
            "W" => Self::DateTime,
            "CC" => Self::Country,
            "TEL" => Self::Phone,
            _ => Self::Unknown(value),
        }
    }
}

impl From<QuestionType> for String {
    fn from(value: QuestionType) -> Self {
        value.as_str().to_string()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Accepts a plain string or a localized `{"en": "..."}` map.
fn deserialize_localized<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(localized_text(&value))
}

fn localized_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(text) => text.clone(),
        serde_json::Value::Object(map) => map
            .get("en")
            .or_else(|| map.values().next())
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        _ => String::new(),
    }
}

/// The remote sends `null` or a list of block reasons; local rows store a bool.
fn deserialize_blocked<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => false,
        Some(serde_json::Value::Bool(flag)) => flag,
        Some(serde_json::Value::Array(reasons)) => !reasons.is_empty(),
        Some(_) => true,
    })
}

/// Seats arrive as an object with a `name`; local rows store just the name.
fn deserialize_seat<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(name)) => Some(name),
        Some(serde_json::Value::Object(map)) => {
            map.get("name").and_then(|v| v.as_str()).map(str::to_string)
        }
        _ => None,
    })
}

/// Flattens `{"pretix_sig1": ["key", ...]}` into a key list.
fn deserialize_valid_keys<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    let mut keys = Vec::new();
    match value {
        Some(serde_json::Value::Object(schemes)) => {
            for (_, list) in schemes {
                if let serde_json::Value::Array(entries) = list {
                    keys.extend(entries.into_iter().filter_map(|e| e.as_str().map(String::from)));
                }
            }
        }
        Some(serde_json::Value::Array(entries)) => {
            keys.extend(entries.into_iter().filter_map(|e| e.as_str().map(String::from)));
        }
        _ => {}
    }
    Ok(keys)
}

fn default_true() -> bool {
    true
}

// ─────────────────────────────────────────────────────────────────────────────
// Entities
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    #[serde(deserialize_with = "deserialize_localized")]
    pub name: String,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default = "default_true")]
    pub admission: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub id: i64,
    #[serde(default)]
    pub identifier: String,
    #[serde(deserialize_with = "deserialize_localized")]
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    #[serde(deserialize_with = "deserialize_localized")]
    pub question: String,
    #[serde(default)]
    pub identifier: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub ask_during_checkin: bool,
    #[serde(default)]
    pub items: Vec<i64>,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    #[serde(default)]
    pub options: Vec<QuestionOption>,
}

impl Question {
    pub fn applies_to(&self, item_id: i64) -> bool {
        self.items.contains(&item_id)
    }

    /// Whether this question blocks a check-in until it has been answered.
    pub fn must_be_answered_at_checkin(&self) -> bool {
        self.ask_during_checkin && self.required
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckInList {
    pub id: i64,
    pub name: String,
    #[serde(default = "default_true")]
    pub all_products: bool,
    #[serde(default)]
    pub limit_products: Vec<i64>,
    #[serde(default)]
    pub subevent: Option<i64>,
    #[serde(default)]
    pub include_pending: bool,
    #[serde(default)]
    pub allow_multiple_entries: bool,
    #[serde(default = "default_true")]
    pub allow_entry_after_exit: bool,
}

impl CheckInList {
    pub fn admits_product(&self, item_id: i64) -> bool {
        self.all_products || self.limit_products.contains(&item_id)
    }

    pub fn admits_subevent(&self, subevent_id: Option<i64>) -> bool {
        match self.subevent {
            Some(required) => subevent_id == Some(required),
            None => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    #[serde(rename = "question")]
    pub question_id: i64,
    #[serde(default)]
    pub answer: String,
    #[serde(default, rename = "options")]
    pub option_ids: Vec<i64>,
}

impl Answer {
    pub fn new(question_id: i64, answer: impl Into<String>) -> Self {
        Self {
            question_id,
            answer: answer.into(),
            option_ids: Vec::new(),
        }
    }

    /// Whether this answer fulfils a required question.
    pub fn satisfies(&self, question: &Question) -> bool {
        match question.question_type {
            QuestionType::Boolean => self.answer.eq_ignore_ascii_case("true"),
            QuestionType::Choice | QuestionType::MultipleChoice => {
                !self.option_ids.is_empty() || !self.answer.trim().is_empty()
            }
            _ => !self.answer.trim().is_empty(),
        }
    }
}

/// A check-in as embedded in a synced position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionCheckIn {
    #[serde(rename = "list")]
    pub list_id: i64,
    #[serde(rename = "type", default)]
    pub checkin_type: CheckInType,
    pub datetime: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPosition {
    pub id: i64,
    #[serde(rename = "order", default)]
    pub order_code: String,
    pub secret: String,
    #[serde(rename = "item")]
    pub item_id: i64,
    #[serde(rename = "variation", default)]
    pub variation_id: Option<i64>,
    #[serde(rename = "subevent", default)]
    pub subevent_id: Option<i64>,
    #[serde(default)]
    pub attendee_name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_seat")]
    pub seat: Option<String>,
    #[serde(default)]
    pub addon_to: Option<i64>,
    #[serde(default)]
    pub valid_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub valid_until: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_blocked")]
    pub blocked: bool,
    #[serde(default)]
    pub answers: Vec<Answer>,
    #[serde(default)]
    pub checkins: Vec<PositionCheckIn>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub code: String,
    pub status: OrderStatus,
    #[serde(default)]
    pub valid_if_pending: bool,
    #[serde(default)]
    pub positions: Vec<OrderPosition>,
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
}

impl Order {
    /// Positions with their `order_code` filled in from the parent order.
    pub fn normalized_positions(&self) -> Vec<OrderPosition> {
        self.positions
            .iter()
            .cloned()
            .map(|mut position| {
                position.order_code = self.code.clone();
                position
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevokedSecret {
    pub id: i64,
    pub secret: String,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedSecret {
    pub id: i64,
    pub secret: String,
    #[serde(default = "default_true")]
    pub blocked: bool,
    #[serde(default)]
    pub updated: Option<DateTime<Utc>>,
}

/// Event detail relevant to check-in: the public keys valid for signed tickets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventInfo {
    pub slug: String,
    #[serde(deserialize_with = "deserialize_localized")]
    pub name: String,
    #[serde(default, deserialize_with = "deserialize_valid_keys")]
    pub valid_keys: Vec<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Local check-in history
// ─────────────────────────────────────────────────────────────────────────────

/// Where a history row came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckInSource {
    /// Downloaded from the remote authority.
    Synced,
    /// Accepted locally, not yet reflected by a pull.
    Queued,
}

/// One entry in a secret's check-in history.
///
/// Uniqueness is (secret, list, type, timestamp); repeated scans and
/// entry/exit pairs are legitimate history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckIn {
    pub position_secret: String,
    pub list_id: i64,
    pub checkin_type: CheckInType,
    pub timestamp: DateTime<Utc>,
    pub source: CheckInSource,
    pub nonce: Option<String>,
}

impl CheckIn {
    pub fn synced(secret: &str, checkin: &PositionCheckIn) -> Self {
        Self {
            position_secret: secret.to_string(),
            list_id: checkin.list_id,
            checkin_type: checkin.checkin_type.clone(),
            timestamp: checkin.datetime,
            source: CheckInSource::Synced,
            nonce: None,
        }
    }
}

/// A row returned by attendee search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub secret: String,
    pub order_code: String,
    pub attendee_name: Option<String>,
    pub item_id: i64,
    pub item_name: Option<String>,
    pub order_status: Option<OrderStatus>,
    pub checked_in: bool,
}

/// Per-list admission counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInListStatus {
    pub list_id: i64,
    pub position_count: i64,
    pub checkin_count: i64,
    pub inside_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_order_status_decodes_to_fallback() {
        let status: OrderStatus = serde_json::from_str("\"x\"").expect("decode status");
        assert_eq!(status, OrderStatus::Unknown("x".to_string()));
        assert_eq!(serde_json::to_string(&OrderStatus::Paid).expect("encode"), "\"p\"");
    }

    #[test]
    fn order_page_decodes_wire_shapes() {
        let json = serde_json::json!({
            "code": "ABC12",
            "status": "n",
            "valid_if_pending": true,
            "positions": [{
                "id": 7,
                "order": "ABC12",
                "secret": "s3cr3t",
                "item": 12,
                "variation": null,
                "subevent": 3,
                "attendee_name": "Ada",
                "seat": {"name": "Row 1, Seat 4", "seat_guid": "g"},
                "blocked": ["admin"],
                "answers": [{"question": 4, "answer": "Yes", "options": [9]}],
                "checkins": [{"list": 2, "type": "exit", "datetime": "2026-03-01T10:00:00+01:00"}],
                "future_field": {"ignored": true}
            }]
        });

        let order: Order = serde_json::from_value(json).expect("decode order");
        let position = &order.positions[0];
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(position.blocked);
        assert_eq!(position.seat.as_deref(), Some("Row 1, Seat 4"));
        assert_eq!(position.answers[0].option_ids, vec![9]);
        assert_eq!(position.checkins[0].checkin_type, CheckInType::Exit);
        assert_eq!(
            position.checkins[0].datetime.to_rfc3339(),
            "2026-03-01T09:00:00+00:00"
        );
    }

    #[test]
    fn event_valid_keys_are_flattened() {
        let event: EventInfo = serde_json::from_value(serde_json::json!({
            "slug": "democon",
            "name": {"de": "DemoKon", "en": "DemoCon"},
            "valid_keys": {"pretix_sig1": ["a2V5MQ==", "a2V5Mg=="]}
        }))
        .expect("decode event");
        assert_eq!(event.name, "DemoCon");
        assert_eq!(event.valid_keys.len(), 2);
    }

    #[test]
    fn list_restrictions() {
        let list = CheckInList {
            id: 1,
            name: "Main".to_string(),
            all_products: false,
            limit_products: vec![5],
            subevent: Some(9),
            include_pending: false,
            allow_multiple_entries: false,
            allow_entry_after_exit: true,
        };
        assert!(list.admits_product(5));
        assert!(!list.admits_product(6));
        assert!(list.admits_subevent(Some(9)));
        assert!(!list.admits_subevent(None));
    }
}
