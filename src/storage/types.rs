//! Core data types for the storage layer.
//!
//! - [`Block`]: One sequence-numbered data unit fetched from the source
//! - [`InsertOutcome`]: Result of an insert-if-absent
//! - [`BlockPage`] / [`BlockStats`] / [`DatabaseStats`]: Read models
//! - [`CleanupOptions`] / [`CleanupPredicate`]: Bulk deletion selectors

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};

use crate::storage::StorageError;

/// Seconds in one day, used for age-based retention.
pub const SECONDS_PER_DAY: i64 = 86_400;

/// A block row stored in the `blocks` table.
///
/// `block_number` is the natural key and is never mutated once stored.
/// `id` and `stored_at` are assigned by the store on insert; candidates
/// produced by the source leave them empty.
///
/// # Example
///
/// ```
/// use blockwatch::Block;
///
/// let block = Block::new(100, 1_700_000_000, 5, 21_000);
/// assert_eq!(block.block_number, 100);
/// assert!(block.id.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Storage-assigned row identifier (no semantic meaning).
    pub id: Option<i64>,
    /// Source-assigned sequence number; the logical primary key.
    pub block_number: i64,
    /// Source-defined timestamp in seconds.
    pub timestamp: i64,
    /// Number of transactions included in the block.
    pub transaction_count: i64,
    /// Resource usage reported by the source.
    pub gas_used: i64,
    /// When the row was written (UTC).
    pub stored_at: Option<DateTime<Utc>>,
}

impl Block {
    /// Create a transient candidate block.
    pub fn new(block_number: i64, timestamp: i64, transaction_count: i64, gas_used: i64) -> Self {
        Self {
            id: None,
            block_number,
            timestamp,
            transaction_count,
            gas_used,
            stored_at: None,
        }
    }
}

/// Outcome of [`BlockStore::insert_if_absent`](crate::storage::BlockStore::insert_if_absent).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new row was written with this storage id.
    Inserted(i64),
    /// A row with the same block number already exists.
    AlreadyExists,
}

/// One page of blocks, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct BlockPage {
    pub blocks: Vec<Block>,
    /// Total number of stored blocks (not just this page).
    pub total: i64,
}

/// Aggregate statistics over the most recent window of blocks.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockStats {
    /// Mean of positive timestamp deltas between consecutive blocks (seconds).
    pub average_block_time: i64,
    /// Sum of transaction counts within the window.
    pub total_transactions: i64,
    /// Mean gas used within the window.
    pub average_gas_used: i64,
    pub latest_block_timestamp: i64,
    pub latest_block_number: i64,
    /// Number of blocks the window actually covered.
    pub window_size: usize,
}

/// Whole-store statistics used by retention and administration.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseStats {
    pub total_blocks: i64,
    pub oldest_block: Option<i64>,
    pub newest_block: Option<i64>,
    pub oldest_timestamp: Option<i64>,
    pub newest_timestamp: Option<i64>,
    #[serde(rename = "databaseSizeKB")]
    pub database_size_kb: i64,
    pub avg_blocks_per_day: f64,
}

/// Caller-facing cleanup options.
///
/// Several fields may be supplied; exactly one is honored, in field order.
/// Zero values count as unset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupOptions {
    /// Keep only the newest N blocks.
    pub keep_latest: Option<u32>,
    /// Delete blocks whose timestamp is older than this many seconds.
    pub older_than_secs: Option<i64>,
    /// Delete blocks numbered strictly below this value.
    pub before_block_number: Option<i64>,
}

impl CleanupOptions {
    /// Options honoring `keep_latest` only.
    pub fn keep_latest(n: u32) -> Self {
        Self {
            keep_latest: Some(n),
            ..Default::default()
        }
    }

    /// Options honoring an age limit expressed in days.
    pub fn older_than_days(days: u32) -> Self {
        Self {
            older_than_secs: Some(i64::from(days) * SECONDS_PER_DAY),
            ..Default::default()
        }
    }

    /// Options honoring a block-number cutoff.
    pub fn before_block_number(block_number: i64) -> Self {
        Self {
            before_block_number: Some(block_number),
            ..Default::default()
        }
    }

    /// Resolve the single predicate to apply.
    ///
    /// # Errors
    /// Returns [`StorageError::NoPredicateSpecified`] when every field is unset.
    pub fn predicate(&self) -> Result<CleanupPredicate, StorageError> {
        if let Some(n) = self.keep_latest.filter(|n| *n > 0) {
            return Ok(CleanupPredicate::KeepLatest(n));
        }
        if let Some(secs) = self.older_than_secs.filter(|s| *s > 0) {
            return Ok(CleanupPredicate::OlderThanSecs(secs));
        }
        if let Some(number) = self.before_block_number.filter(|b| *b > 0) {
            return Ok(CleanupPredicate::BeforeBlockNumber(number));
        }
        Err(StorageError::NoPredicateSpecified)
    }
}

/// A single resolved deletion predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum CleanupPredicate {
    KeepLatest(u32),
    OlderThanSecs(i64),
    BeforeBlockNumber(i64),
}
