//! Error types for the remote API crate.

use std::time::Duration;

use thiserror::Error;

use checkin_core::sync::{RemoteError, DEFAULT_RATE_LIMIT_SECS};

/// Result type alias for remote API operations.
pub type Result<T> = std::result::Result<T, RemoteApiError>;

/// Errors that can occur while talking to the remote authority.
#[derive(Debug, Error)]
pub enum RemoteApiError {
    /// Transport failure: connect, timeout, TLS, body read
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Non-success status with the (truncated) response body
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// HTTP 429; `retry_after` comes from the `Retry-After` header
    #[error("Rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// The request could not be built (bad URL, header value)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Missing or refused device token
    #[error("Authentication error: {0}")]
    Auth(String),
}

impl RemoteApiError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    /// HTTP status if this is an API error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::RateLimited { .. } => Some(429),
            _ => None,
        }
    }
}

impl From<RemoteApiError> for RemoteError {
    fn from(err: RemoteApiError) -> Self {
        match err {
            RemoteApiError::Http(err) => RemoteError::Transport(err.to_string()),
            RemoteApiError::Json(err) => RemoteError::InvalidResponse(err.to_string()),
            RemoteApiError::Api { status: 401, message } => RemoteError::Unauthorized(message),
            RemoteApiError::Api { status, message } => RemoteError::Http { status, message },
            RemoteApiError::RateLimited { retry_after } => RemoteError::RateLimited(
                retry_after.unwrap_or(Duration::from_secs(DEFAULT_RATE_LIMIT_SECS)),
            ),
            RemoteApiError::InvalidRequest(message) => RemoteError::Http {
                status: 400,
                message,
            },
            RemoteApiError::Auth(message) => RemoteError::Unauthorized(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use checkin_core::sync::RetryClass;

    #[test]
    fn auth_failures_require_reauth() {
        let err: RemoteError = RemoteApiError::api(401, "unauthorized").into();
        assert_eq!(err.retry_class(), RetryClass::ReauthRequired);
    }

    #[test]
    fn missing_retry_after_falls_back_to_default_pause() {
        let err: RemoteError = RemoteApiError::RateLimited { retry_after: None }.into();
        assert_eq!(
            err,
            RemoteError::RateLimited(Duration::from_secs(DEFAULT_RATE_LIMIT_SECS))
        );
    }

    #[test]
    fn not_found_is_permanent() {
        let err: RemoteError = RemoteApiError::api(404, "gone").into();
        assert_eq!(err.retry_class(), RetryClass::Permanent);
    }
}
