use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::{Answer, CheckInType};
use crate::redemption::{ErrorReason, RedemptionStatus};

/// Body of a redeem call, stored verbatim so a retry re-sends the same request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeemRequestBody {
    pub questions_supported: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datetime: Option<DateTime<Utc>>,
    pub force: bool,
    pub ignore_unpaid: bool,
    pub nonce: String,
    /// Question id to answer text.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub answers: BTreeMap<String, String>,
    #[serde(rename = "type")]
    pub checkin_type: CheckInType,
}

impl RedeemRequestBody {
    pub fn answers_from(answers: &[Answer]) -> BTreeMap<String, String> {
        answers
            .iter()
            .map(|answer| {
                let text = if answer.option_ids.is_empty() {
                    answer.answer.clone()
                } else {
                    answer
                        .option_ids
                        .iter()
                        .map(i64::to_string)
                        .collect::<Vec<_>>()
                        .join(",")
                };
                (answer.question_id.to_string(), text)
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewQueuedRedemption {
    pub secret: String,
    pub event_slug: String,
    pub checkin_list_id: i64,
    pub body: RedeemRequestBody,
}

/// A locally decided redemption waiting for the remote authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedRedemptionRequest {
    pub id: i64,
    pub secret: String,
    pub nonce: String,
    pub event_slug: String,
    pub checkin_list_id: i64,
    pub body: RedeemRequestBody,
    pub enqueued_at: DateTime<Utc>,
    pub retry_count: i32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl QueuedRedemptionRequest {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_retry_at.map_or(true, |at| at <= now)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFailedCheckIn {
    pub event_slug: String,
    pub checkin_list_id: i64,
    pub raw_barcode: String,
    pub error_reason: ErrorReason,
    pub checkin_type: CheckInType,
    pub datetime: DateTime<Utc>,
    pub position_id: Option<i64>,
    pub item_id: Option<i64>,
    pub variation_id: Option<i64>,
    pub subevent_id: Option<i64>,
}

/// A locally rejected scan kept for audit upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedCheckIn {
    pub id: i64,
    pub event_slug: String,
    pub checkin_list_id: i64,
    pub raw_barcode: String,
    pub error_reason: ErrorReason,
    pub checkin_type: CheckInType,
    pub datetime: DateTime<Utc>,
    pub position_id: Option<i64>,
    pub item_id: Option<i64>,
    pub variation_id: Option<i64>,
    pub subevent_id: Option<i64>,
    pub enqueued_at: DateTime<Utc>,
    pub retry_count: i32,
    pub next_retry_at: Option<DateTime<Utc>>,
}

impl FailedCheckIn {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_retry_at.map_or(true, |at| at <= now)
    }
}

/// Wire body for a failed check-in report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedCheckInUpload {
    pub raw_barcode: String,
    pub error_reason: String,
    #[serde(rename = "type")]
    pub checkin_type: CheckInType,
    pub datetime: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_item: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_variation: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_subevent: Option<i64>,
}

impl From<&FailedCheckIn> for FailedCheckInUpload {
    fn from(failed: &FailedCheckIn) -> Self {
        Self {
            raw_barcode: failed.raw_barcode.clone(),
            error_reason: failed.error_reason.upload_code().to_string(),
            checkin_type: failed.checkin_type.clone(),
            datetime: failed.datetime,
            position: failed.position_id,
            raw_item: failed.item_id,
            raw_variation: failed.variation_id,
            raw_subevent: failed.subevent_id,
        }
    }
}

/// What the remote authority finally said about an uploaded request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOutcome {
    pub secret: String,
    pub nonce: String,
    pub status: RedemptionStatus,
    pub reason: Option<ErrorReason>,
    pub recorded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redeem_body_uses_wire_names() {
        let body = RedeemRequestBody {
            questions_supported: true,
            datetime: None,
            force: false,
            ignore_unpaid: true,
            nonce: "n-1".to_string(),
            answers: RedeemRequestBody::answers_from(&[
                Answer::new(4, "Yes"),
                Answer {
                    question_id: 5,
                    answer: String::new(),
                    option_ids: vec![1, 2],
                },
            ]),
            checkin_type: CheckInType::Exit,
        };

        let json = serde_json::to_value(&body).expect("encode body");
        assert_eq!(json["questions_supported"], true);
        assert_eq!(json["ignore_unpaid"], true);
        assert_eq!(json["type"], "exit");
        assert_eq!(json["answers"]["4"], "Yes");
        assert_eq!(json["answers"]["5"], "1,2");
        assert!(json.get("datetime").is_none());
    }
}
