//! Source-specific error types.

use thiserror::Error;

/// Errors returned by the block source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Every attempt failed at the transport or HTTP-status level.
    #[error("source unreachable after {attempts} attempts: {last_error}")]
    Unreachable { attempts: u32, last_error: String },

    /// Payload shape was not recognized or carried no block number.
    #[error("failed to parse source payload: {0}")]
    Parse(String),

    /// The HTTP client could not be constructed.
    #[error("source client error: {0}")]
    Client(String),
}
