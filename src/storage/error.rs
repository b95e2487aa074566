//! Storage-specific error types.
//!
//! All storage operations return [`StorageError`] on failure. Caller-input
//! validation failures ([`StorageError::InvalidLimit`],
//! [`StorageError::NoPredicateSpecified`]) are the only variants expected to
//! surface to API clients as rejected requests.

use thiserror::Error;

/// Errors that can occur in the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database operation failed (sqlx error).
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Requested row limit is outside the accepted range.
    #[error("limit must be between {min} and {max}, got {limit}")]
    InvalidLimit { limit: i64, min: i64, max: i64 },

    /// Cleanup was requested without any predicate.
    #[error(
        "at least one cleanup option must be specified: keepLatest, olderThanDays, or beforeBlockNumber"
    )]
    NoPredicateSpecified,

    /// Internal error (e.g., directory creation failure).
    #[error("internal error: {0}")]
    Internal(String),
}

impl StorageError {
    /// Whether this error was caused by invalid caller input.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidLimit { .. } | Self::NoPredicateSpecified
        )
    }
}
