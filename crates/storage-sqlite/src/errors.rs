use checkin_core::errors::{DatabaseError, Error};
use thiserror::Error as ThisError;

/// Failures raised by the SQLite layer before they are folded into the core
/// error taxonomy.
#[derive(Debug, ThisError)]
pub enum StorageError {
    #[error("Query failed: {0}")]
    Query(#[from] diesel::result::Error),

    #[error("Connection failed: {0}")]
    Connection(#[from] diesel::ConnectionError),

    #[error("Pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Stored value is corrupt: {0}")]
    Corrupt(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        let db = match err {
            StorageError::Query(diesel::result::Error::NotFound) => {
                DatabaseError::NotFound("record not found".to_string())
            }
            StorageError::Query(err) => DatabaseError::QueryFailed(err.to_string()),
            StorageError::Connection(err) => DatabaseError::ConnectionFailed(err.to_string()),
            StorageError::Pool(err) => DatabaseError::PoolCreationFailed(err.to_string()),
            StorageError::Migration(message) => DatabaseError::MigrationFailed(message),
            StorageError::Corrupt(message) => DatabaseError::Internal(message),
            StorageError::Io(err) => DatabaseError::ConnectionFailed(err.to_string()),
        };
        Error::Database(db)
    }
}

/// Parses an RFC 3339 column value.
pub(crate) fn parse_timestamp(
    value: &str,
) -> std::result::Result<chrono::DateTime<chrono::Utc>, StorageError> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&chrono::Utc))
        .map_err(|err| StorageError::Corrupt(format!("bad timestamp {value:?}: {err}")))
}

pub(crate) fn parse_optional_timestamp(
    value: Option<&str>,
) -> std::result::Result<Option<chrono::DateTime<chrono::Utc>>, StorageError> {
    value.map(parse_timestamp).transpose()
}
