//! Error types for the store layer.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A unique constraint was violated (duplicate license key or
    /// reference id raced past the existence check).
    #[error("unique constraint violated: {0}")]
    Duplicate(String),

    /// Stored data failed to parse back into domain types.
    #[error("corrupt stored data: {0}")]
    Corrupt(String),

    /// The connection mutex was poisoned by a panicking thread.
    #[error("store lock poisoned")]
    LockPoisoned,

    /// IO error (file system).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Returns true if the underlying SQLite error is a unique
    /// constraint violation.
    #[must_use]
    pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
        matches!(
            err,
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }
}
