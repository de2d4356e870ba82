//! Error types shared across the check-in crates.

use thiserror::Error;

use crate::sync::RemoteError;

/// Result type alias for check-in operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error for the check-in core.
///
/// Policy rejections (unpaid, blocked, ...) are not errors; they travel as
/// [`crate::redemption::RedemptionResult`] values. Anything that ends up here
/// is either an infrastructure failure or a remote failure.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

/// Local store failures. These are fatal for the operation that hit them.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Pool creation failed: {0}")]
    PoolCreationFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal database error: {0}")]
    Internal(String),
}

impl Error {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// True when the local store failed and continuing risks corrupting state.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}
