//! Block collector: one fetch → dedup → store cycle plus running counters.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::collector::BlockSource;
use crate::storage::{BlockStore, InsertOutcome};

/// Stored blocks between periodic stats summaries in the log.
const STATS_LOG_EVERY: u64 = 10;

/// Cumulative collector counters.
///
/// Snapshots are plain copies. Each cycle's changes are applied under a
/// single write lock at the end of the cycle, so readers see the counter
/// group either before or after a cycle, never in between.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectorStats {
    pub total_fetched: u64,
    pub total_stored: u64,
    pub total_duplicates: u64,
    pub total_errors: u64,
    pub last_fetch_time: Option<DateTime<Utc>>,
    pub last_success_time: Option<DateTime<Utc>>,
    pub last_block_number: Option<i64>,
}

impl CollectorStats {
    /// Percentage of fetched blocks that were stored.
    pub fn success_rate(&self) -> f64 {
        if self.total_fetched == 0 {
            0.0
        } else {
            self.total_stored as f64 / self.total_fetched as f64 * 100.0
        }
    }
}

/// How a single cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A new block was written.
    Stored { block_number: i64, id: i64 },
    /// The fetched block was already stored, or older than the latest one.
    Duplicate { block_number: i64 },
    /// The source could not produce a block.
    FetchFailed,
    /// A block was fetched but the store could not be read or written.
    StoreFailed { block_number: i64 },
}

impl CycleOutcome {
    /// Whether the cycle counts as successful (fetched and handled).
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Stored { .. } | Self::Duplicate { .. })
    }
}

/// Orchestrates fetch, dedup and persistence of the latest block.
pub struct BlockCollector {
    source: Arc<dyn BlockSource>,
    store: BlockStore,
    stats: RwLock<CollectorStats>,
}

impl std::fmt::Debug for BlockCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockCollector")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl BlockCollector {
    pub fn new(source: Arc<dyn BlockSource>, store: BlockStore) -> Self {
        Self {
            source,
            store,
            stats: RwLock::new(CollectorStats::default()),
        }
    }

    /// The source this collector fetches from.
    pub fn source(&self) -> &Arc<dyn BlockSource> {
        &self.source
    }

    /// Run one collection cycle.
    ///
    /// Returns `true` when the block was fetched and handled, whether or
    /// not it was new. Failures are counted and logged, never propagated.
    pub async fn run_cycle(&self) -> bool {
        self.collect().await.is_success()
    }

    /// Run one cycle out of band, independent of any schedule.
    pub async fn trigger_collection(&self) -> bool {
        tracing::info!("Manual collection triggered");
        self.run_cycle().await
    }

    /// Run one cycle and report how it ended.
    pub async fn collect(&self) -> CycleOutcome {
        let fetch_time = Utc::now();
        tracing::debug!("Starting block collection");

        let outcome = self.fetch_and_store().await;
        self.record(fetch_time, outcome);
        outcome
    }

    /// Snapshot of the current counters.
    pub fn stats(&self) -> CollectorStats {
        self.read_stats().clone()
    }

    /// Zero every counter. Stored blocks are untouched.
    pub fn reset_stats(&self) {
        *self.write_stats() = CollectorStats::default();
        tracing::info!("Collection stats reset");
    }

    async fn fetch_and_store(&self) -> CycleOutcome {
        let block = match self.source.fetch_latest().await {
            Ok(block) => block,
            Err(e) => {
                tracing::error!(error = %e, "Failed to fetch block from source");
                return CycleOutcome::FetchFailed;
            }
        };
        let block_number = block.block_number;

        tracing::debug!(
            block_number,
            timestamp = block.timestamp,
            transactions = block.transaction_count,
            "Processing block"
        );

        let latest = match self.store.latest_block_number().await {
            Ok(latest) => latest,
            Err(e) => {
                tracing::error!(block_number, error = %e, "Failed to read latest stored block");
                return CycleOutcome::StoreFailed { block_number };
            }
        };

        if block_number < latest {
            tracing::warn!(
                block_number,
                latest,
                "Source returned a block older than the latest stored block"
            );
            return CycleOutcome::Duplicate { block_number };
        }
        if block_number == latest {
            tracing::debug!(block_number, "Block already stored");
            return CycleOutcome::Duplicate { block_number };
        }

        match self.store.insert_if_absent(&block).await {
            Ok(InsertOutcome::Inserted(id)) => {
                tracing::info!(block_number, id, "Stored block");
                CycleOutcome::Stored { block_number, id }
            }
            Ok(InsertOutcome::AlreadyExists) => {
                tracing::debug!(block_number, "Block stored concurrently");
                CycleOutcome::Duplicate { block_number }
            }
            Err(e) => {
                tracing::error!(block_number, error = %e, "Failed to store block");
                CycleOutcome::StoreFailed { block_number }
            }
        }
    }

    fn record(&self, fetch_time: DateTime<Utc>, outcome: CycleOutcome) {
        let summary = {
            let mut stats = self.write_stats();
            stats.last_fetch_time = Some(fetch_time);
            match outcome {
                CycleOutcome::Stored { block_number, .. } => {
                    stats.total_fetched += 1;
                    stats.total_stored += 1;
                    stats.last_success_time = Some(Utc::now());
                    stats.last_block_number = Some(block_number);
                    (stats.total_stored % STATS_LOG_EVERY == 0).then(|| stats.clone())
                }
                CycleOutcome::Duplicate { .. } => {
                    stats.total_fetched += 1;
                    stats.total_duplicates += 1;
                    None
                }
                CycleOutcome::FetchFailed => {
                    stats.total_errors += 1;
                    None
                }
                CycleOutcome::StoreFailed { .. } => {
                    stats.total_fetched += 1;
                    stats.total_errors += 1;
                    None
                }
            }
        };

        if let Some(stats) = summary {
            tracing::info!(
                total_fetched = stats.total_fetched,
                total_stored = stats.total_stored,
                total_duplicates = stats.total_duplicates,
                total_errors = stats.total_errors,
                success_rate = %format!("{:.1}%", stats.success_rate()),
                last_block_number = ?stats.last_block_number,
                "Collection stats"
            );
        }
    }

    fn read_stats(&self) -> RwLockReadGuard<'_, CollectorStats> {
        self.stats.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_stats(&self) -> RwLockWriteGuard<'_, CollectorStats> {
        self.stats.write().unwrap_or_else(|e| e.into_inner())
    }
}
