use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Protobuf body carried inside a signed ticket frame.
#[derive(Clone, PartialEq, prost::Message)]
pub struct TicketMessage {
    #[prost(string, tag = "1")]
    pub seed: String,
    #[prost(int64, tag = "2")]
    pub item: i64,
    #[prost(int64, tag = "3")]
    pub variation: i64,
    #[prost(int64, tag = "4")]
    pub subevent: i64,
    #[prost(int64, optional, tag = "5")]
    pub valid_from_unix_time: Option<i64>,
    #[prost(int64, optional, tag = "6")]
    pub valid_until_unix_time: Option<i64>,
}

/// Fields recovered from a verified ticket. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedTicketPayload {
    pub seed: String,
    pub item_id: i64,
    pub variation_id: Option<i64>,
    pub subevent_id: Option<i64>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
}

impl SignedTicketPayload {
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        self.valid_from.map_or(true, |from| at >= from)
            && self.valid_until.map_or(true, |until| at <= until)
    }
}
