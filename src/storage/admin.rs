//! Storage administration: bulk deletion, compaction, whole-store stats
//! and export.

use chrono::Utc;

use crate::storage::StorageError;
use crate::storage::block_store::{BlockStore, check_limit};
use crate::storage::db::SqlitePool;
use crate::storage::types::{
    Block, CleanupOptions, CleanupPredicate, DatabaseStats, SECONDS_PER_DAY,
};

/// Largest accepted bound for [`StorageAdmin::export`].
pub const MAX_EXPORT_LIMIT: u32 = 10_000;

/// Administration facade for cleanup and maintenance.
#[derive(Clone)]
pub struct StorageAdmin {
    pool: SqlitePool,
    blocks: BlockStore,
}

impl std::fmt::Debug for StorageAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageAdmin").finish_non_exhaustive()
    }
}

impl StorageAdmin {
    pub fn new(pool: SqlitePool) -> Self {
        let blocks = BlockStore::new(pool.clone());
        Self { pool, blocks }
    }

    /// Delete blocks matching the single predicate resolved from `options`.
    ///
    /// Compacts afterwards (best-effort) when anything was removed.
    ///
    /// # Errors
    /// Returns [`StorageError::NoPredicateSpecified`] when no option is set.
    pub async fn delete_where(&self, options: &CleanupOptions) -> Result<u64, StorageError> {
        let predicate = options.predicate()?;

        let result = match predicate {
            CleanupPredicate::KeepLatest(n) => {
                sqlx::query(
                    "DELETE FROM blocks WHERE block_number NOT IN (
                         SELECT block_number FROM blocks ORDER BY block_number DESC LIMIT ?
                     )",
                )
                .bind(i64::from(n))
                .execute(self.pool.inner())
                .await?
            }
            CleanupPredicate::OlderThanSecs(secs) => {
                let cutoff = Utc::now().timestamp() - secs;
                sqlx::query("DELETE FROM blocks WHERE timestamp < ?")
                    .bind(cutoff)
                    .execute(self.pool.inner())
                    .await?
            }
            CleanupPredicate::BeforeBlockNumber(number) => {
                sqlx::query("DELETE FROM blocks WHERE block_number < ?")
                    .bind(number)
                    .execute(self.pool.inner())
                    .await?
            }
        };

        let deleted = result.rows_affected();
        if deleted == 0 {
            tracing::debug!(predicate = %predicate, "No blocks matched cleanup criteria");
            return Ok(0);
        }

        tracing::info!(predicate = %predicate, deleted, "Cleaned up blocks");
        self.vacuum_best_effort().await;
        Ok(deleted)
    }

    /// Delete every block and restart the internal id sequence at 1.
    pub async fn delete_all(&self) -> Result<u64, StorageError> {
        let mut tx = self.pool.inner().begin().await?;

        let deleted = sqlx::query("DELETE FROM blocks")
            .execute(&mut *tx)
            .await?
            .rows_affected();
        sqlx::query("DELETE FROM sqlite_sequence WHERE name = 'blocks'")
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(deleted, "Cleared all blocks");
        self.vacuum_best_effort().await;
        Ok(deleted)
    }

    /// Reclaim space and rebuild indexes. Never required for correctness.
    pub async fn compact(&self) -> Result<(), StorageError> {
        tracing::info!("Optimizing database");
        sqlx::query("ANALYZE").execute(self.pool.inner()).await?;
        sqlx::query("VACUUM").execute(self.pool.inner()).await?;
        sqlx::query("REINDEX").execute(self.pool.inner()).await?;
        tracing::info!("Database optimization complete");
        Ok(())
    }

    /// Approximate database size in KiB; 0 when it cannot be determined.
    pub async fn size_estimate_kb(&self) -> i64 {
        match self.page_bytes().await {
            Ok(bytes) => (bytes as f64 / 1024.0).round() as i64,
            Err(e) => {
                tracing::warn!(error = %e, "Could not calculate database size");
                0
            }
        }
    }

    /// Count, extent and size of the whole store.
    pub async fn database_stats(&self) -> Result<DatabaseStats, StorageError> {
        let (total_blocks, oldest_block, newest_block, oldest_timestamp, newest_timestamp): (
            i64,
            Option<i64>,
            Option<i64>,
            Option<i64>,
            Option<i64>,
        ) = sqlx::query_as(
            "SELECT COUNT(*), MIN(block_number), MAX(block_number), MIN(timestamp), MAX(timestamp)
             FROM blocks",
        )
        .fetch_one(self.pool.inner())
        .await?;

        let avg_blocks_per_day = match (oldest_timestamp, newest_timestamp) {
            (Some(oldest), Some(newest)) if total_blocks > 0 && newest > oldest => {
                let days = (newest - oldest) as f64 / SECONDS_PER_DAY as f64;
                ((total_blocks as f64 / days) * 100.0).round() / 100.0
            }
            _ => 0.0,
        };

        Ok(DatabaseStats {
            total_blocks,
            oldest_block,
            newest_block,
            oldest_timestamp,
            newest_timestamp,
            database_size_kb: self.size_estimate_kb().await,
            avg_blocks_per_day,
        })
    }

    /// Export blocks newest first; unbounded when `limit` is `None`.
    ///
    /// # Errors
    /// Returns [`StorageError::InvalidLimit`] unless a given limit is within 1..=10000.
    pub async fn export(&self, limit: Option<u32>) -> Result<Vec<Block>, StorageError> {
        if let Some(limit) = limit {
            check_limit(limit, 1, MAX_EXPORT_LIMIT)?;
        }
        let blocks = self.blocks.newest(limit).await?;
        tracing::info!(count = blocks.len(), "Exported blocks");
        Ok(blocks)
    }

    async fn page_bytes(&self) -> Result<i64, StorageError> {
        let page_size: i64 = sqlx::query_scalar("PRAGMA page_size")
            .fetch_one(self.pool.inner())
            .await?;
        let page_count: i64 = sqlx::query_scalar("PRAGMA page_count")
            .fetch_one(self.pool.inner())
            .await?;
        Ok(page_size * page_count)
    }

    async fn vacuum_best_effort(&self) {
        if let Err(e) = sqlx::query("VACUUM").execute(self.pool.inner()).await {
            tracing::warn!(error = %e, "VACUUM after deletion failed");
        }
    }
}
