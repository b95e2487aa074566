//! Core collector traits and types.

use std::time::Duration;

use thiserror::Error;

use crate::source::SourceError;
use crate::storage::{Block, StorageError};

/// Minimum allowed collection interval (5 seconds).
pub const MIN_INTERVAL: Duration = Duration::from_secs(5);

/// Default collection interval (30 seconds).
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

/// Errors that can occur during collection and scheduling.
#[derive(Debug, Error)]
pub enum CollectorError {
    /// Fetching from the source failed.
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    /// Reading or writing the store failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Scheduler error.
    #[error("scheduler error: {0}")]
    Scheduler(String),
}

/// Clamp a requested interval to [`MIN_INTERVAL`].
pub fn clamp_interval(interval: Duration) -> Duration {
    if interval < MIN_INTERVAL {
        tracing::warn!(
            requested = ?interval,
            min_interval = ?MIN_INTERVAL,
            "Interval duration is less than minimum allowed. Using minimum duration."
        );
        MIN_INTERVAL
    } else {
        interval
    }
}

/// Producer of the latest block.
///
/// Implementations must be idempotent from the caller's point of view:
/// repeated calls return whatever the source currently reports as latest.
///
/// # Error Handling
///
/// - `Err(SourceError::Unreachable)`: every attempt failed at the transport level
/// - `Err(SourceError::Parse)`: the payload carried no recognizable block
///
/// The collector absorbs both into its error counter.
#[async_trait::async_trait]
pub trait BlockSource: Send + Sync + 'static {
    /// Fetch and normalize the latest block.
    async fn fetch_latest(&self) -> Result<Block, SourceError>;

    /// Best-effort reachability probe. Never errors.
    async fn check_health(&self) -> bool;
}
