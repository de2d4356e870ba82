//! Retry classification and backoff for remote failures.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::sync_scheduler::DEFAULT_RATE_LIMIT_SECS;

/// How a failed remote call should be handled by the push/pull loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryClass {
    /// Keep the request and try again later.
    Retryable,
    /// The remote will never accept this exact request.
    Permanent,
    /// Credentials were refused; keep the request.
    ReauthRequired,
    /// Stop calling the remote for the given duration.
    RateLimited(Duration),
}

impl RetryClass {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Retryable => "retryable",
            Self::Permanent => "permanent",
            Self::ReauthRequired => "reauth_required",
            Self::RateLimited(_) => "rate_limited",
        }
    }
}

/// Classify an HTTP status into retry behaviour.
///
/// 403 and 404 are semantic rejections of the request itself.
pub fn classify_http_status(status: u16) -> RetryClass {
    match status {
        401 => RetryClass::ReauthRequired,
        429 => RetryClass::RateLimited(Duration::from_secs(DEFAULT_RATE_LIMIT_SECS)),
        408 | 409 | 423 | 425 => RetryClass::Retryable,
        500..=599 => RetryClass::Retryable,
        _ => RetryClass::Permanent,
    }
}

/// Exponential backoff in seconds with cap.
pub fn backoff_seconds(consecutive_failures: i32) -> i64 {
    const MAX_EXPONENT: i32 = 8;
    const BASE_DELAY_SECONDS: i64 = 5;

    let capped = i64::from(consecutive_failures.clamp(0, MAX_EXPONENT));
    2_i64.pow(capped as u32) * BASE_DELAY_SECONDS
}
