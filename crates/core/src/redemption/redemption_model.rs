use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::{Answer, CheckIn, CheckInType, Item, OrderPosition, OrderStatus, Question};

/// Outcome class of a redemption attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RedemptionStatus {
    /// Accepted with full order knowledge.
    Redeemed,
    /// Signature valid, order unknown locally. The remote makes the final call.
    PendingConfirmation,
    /// Required questions are unanswered.
    Incomplete,
    Error,
    Unknown(String),
}

impl RedemptionStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Redeemed => "redeemed",
            Self::PendingConfirmation => "pending_confirmation",
            Self::Incomplete => "incomplete",
            Self::Error => "error",
            Self::Unknown(raw) => raw,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Redeemed | Self::PendingConfirmation)
    }
}

impl From<String> for RedemptionStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "redeemed" | "ok" => Self::Redeemed,
            "pending_confirmation" => Self::PendingConfirmation,
            "incomplete" => Self::Incomplete,
            "error" => Self::Error,
            _ => Self::Unknown(value),
        }
    }
}

impl From<RedemptionStatus> for String {
    fn from(value: RedemptionStatus) -> Self {
        value.as_str().to_string()
    }
}

/// Typed reason for a rejected redemption.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ErrorReason {
    Invalid,
    Unpaid,
    Canceled,
    AlreadyRedeemed,
    Product,
    InvalidProductSubEvent,
    UnknownItem,
    Blocked,
    Revoked,
    NoKeys,
    Rules,
    InvalidTime,
    Incomplete,
    Error,
    Unknown(String),
}

impl ErrorReason {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Invalid => "invalid",
            Self::Unpaid => "unpaid",
            Self::Canceled => "canceled",
            Self::AlreadyRedeemed => "already_redeemed",
            Self::Product => "product",
            Self::InvalidProductSubEvent => "invalid_product_subevent",
            Self::UnknownItem => "unknown_item",
            Self::Blocked => "blocked",
            Self::Revoked => "revoked",
            Self::NoKeys => "no_keys",
            Self::Rules => "rules",
            Self::InvalidTime => "invalid_time",
            Self::Incomplete => "incomplete",
            Self::Error => "error",
            Self::Unknown(raw) => raw,
        }
    }

    /// Code accepted by the remote failed check-in endpoint.
    pub fn upload_code(&self) -> &str {
        match self {
            Self::InvalidProductSubEvent | Self::UnknownItem => "product",
            Self::NoKeys | Self::Unknown(_) => "invalid",
            other => other.as_str(),
        }
    }
}

impl From<String> for ErrorReason {
    fn from(value: String) -> Self {
        match value.as_str() {
            "invalid" => Self::Invalid,
            "unpaid" => Self::Unpaid,
            "canceled" => Self::Canceled,
            "already_redeemed" => Self::AlreadyRedeemed,
            "product" => Self::Product,
            "invalid_product_subevent" => Self::InvalidProductSubEvent,
            "unknown_item" => Self::UnknownItem,
            "blocked" => Self::Blocked,
            "revoked" => Self::Revoked,
            "no_keys" => Self::NoKeys,
            "rules" => Self::Rules,
            "invalid_time" => Self::InvalidTime,
            "incomplete" => Self::Incomplete,
            "error" => Self::Error,
            _ => Self::Unknown(value),
        }
    }
}

impl From<ErrorReason> for String {
    fn from(value: ErrorReason) -> Self {
        value.as_str().to_string()
    }
}

/// One scan as submitted by the operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedemptionRequest {
    pub secret: String,
    #[serde(default)]
    pub checkin_type: CheckInType,
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub ignore_unpaid: bool,
    #[serde(default)]
    pub answers: Option<Vec<Answer>>,
    /// Scan time; defaults to now.
    #[serde(default)]
    pub datetime: Option<DateTime<Utc>>,
    /// Nonce of the attempt being continued, e.g. after answering questions.
    #[serde(default)]
    pub nonce: Option<String>,
}

impl RedemptionRequest {
    pub fn entry(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            checkin_type: CheckInType::Entry,
            force: false,
            ignore_unpaid: false,
            answers: None,
            datetime: None,
            nonce: None,
        }
    }

    pub fn exit(secret: impl Into<String>) -> Self {
        Self {
            checkin_type: CheckInType::Exit,
            ..Self::entry(secret)
        }
    }

    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }

    pub fn ignoring_unpaid(mut self) -> Self {
        self.ignore_unpaid = true;
        self
    }

    pub fn with_answers(mut self, answers: Vec<Answer>) -> Self {
        self.answers = Some(answers);
        self
    }

    pub fn continuing(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = Some(nonce.into());
        self
    }
}

/// Result of a redemption attempt. Rejections are values, not errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedemptionResult {
    pub status: RedemptionStatus,
    pub reason: Option<ErrorReason>,
    pub nonce: Option<String>,
    pub position: Option<OrderPosition>,
    pub item: Option<Item>,
    pub order_status: Option<OrderStatus>,
    /// Unanswered questions for an `incomplete` result.
    #[serde(default)]
    pub required_questions: Vec<Question>,
    /// Known history for the secret after the decision.
    #[serde(default)]
    pub checkins: Vec<CheckIn>,
    /// True when decided without contacting the remote.
    pub offline: bool,
}

impl RedemptionResult {
    pub fn rejected(reason: ErrorReason) -> Self {
        Self {
            status: RedemptionStatus::Error,
            reason: Some(reason),
            nonce: None,
            position: None,
            item: None,
            order_status: None,
            required_questions: Vec::new(),
            checkins: Vec::new(),
            offline: true,
        }
    }

    pub fn with_status(status: RedemptionStatus) -> Self {
        Self {
            status,
            reason: None,
            ..Self::rejected(ErrorReason::Error)
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.status.is_accepted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_ok_maps_to_redeemed() {
        assert_eq!(RedemptionStatus::from("ok".to_string()), RedemptionStatus::Redeemed);
    }

    #[test]
    fn unknown_reason_survives_round_trip() {
        let reason: ErrorReason = serde_json::from_str("\"amount\"").expect("decode reason");
        assert_eq!(reason, ErrorReason::Unknown("amount".to_string()));
        assert_eq!(serde_json::to_string(&reason).expect("encode"), "\"amount\"");
        assert_eq!(reason.upload_code(), "invalid");
    }

    #[test]
    fn local_only_reasons_upload_as_remote_codes() {
        assert_eq!(ErrorReason::InvalidProductSubEvent.upload_code(), "product");
        assert_eq!(ErrorReason::UnknownItem.upload_code(), "product");
        assert_eq!(ErrorReason::Blocked.upload_code(), "blocked");
    }
}
