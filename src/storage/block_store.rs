//! Block persistence and read queries.
//!
//! The UNIQUE constraint on `block_number` is the only concurrency
//! safeguard: racing inserts of the same number resolve to exactly one
//! [`InsertOutcome::Inserted`], the rest observe
//! [`InsertOutcome::AlreadyExists`].

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::storage::StorageError;
use crate::storage::db::SqlitePool;
use crate::storage::types::{Block, BlockPage, BlockStats, InsertOutcome};

/// Smallest accepted page size for [`BlockStore::range`].
pub const MIN_RANGE_LIMIT: u32 = 1;

/// Largest accepted page size for [`BlockStore::range`].
pub const MAX_RANGE_LIMIT: u32 = 1_000;

/// Default window for [`BlockStore::aggregate_stats`].
pub const DEFAULT_STATS_WINDOW: u32 = 100;

pub(crate) const BLOCK_COLUMNS: &str =
    "id, block_number, timestamp, transaction_count, gas_used, created_at";

/// Block storage facade.
#[derive(Clone)]
pub struct BlockStore {
    pool: SqlitePool,
}

impl std::fmt::Debug for BlockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockStore").finish_non_exhaustive()
    }
}

impl BlockStore {
    /// Create a new block store over an initialized pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a block unless one with the same number is already stored.
    ///
    /// Repeated or concurrent inserts of one block number never create
    /// duplicates and never error on the conflict itself.
    pub async fn insert_if_absent(&self, block: &Block) -> Result<InsertOutcome, StorageError> {
        let now = Utc::now().timestamp_millis();

        let result = sqlx::query(
            "INSERT OR IGNORE INTO blocks (block_number, timestamp, transaction_count, gas_used, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(block.block_number)
        .bind(block.timestamp)
        .bind(block.transaction_count)
        .bind(block.gas_used)
        .bind(now)
        .execute(self.pool.inner())
        .await?;

        if result.rows_affected() == 0 {
            Ok(InsertOutcome::AlreadyExists)
        } else {
            Ok(InsertOutcome::Inserted(result.last_insert_rowid()))
        }
    }

    /// Newest blocks first, plus the total stored count.
    ///
    /// # Errors
    /// Returns [`StorageError::InvalidLimit`] unless `limit` is within 1..=1000.
    pub async fn range(&self, limit: u32) -> Result<BlockPage, StorageError> {
        check_limit(limit, MIN_RANGE_LIMIT, MAX_RANGE_LIMIT)?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM blocks")
            .fetch_one(self.pool.inner())
            .await?;

        let blocks = self.newest(Some(limit)).await?;
        Ok(BlockPage { blocks, total })
    }

    /// Highest stored block number, or 0 when the store is empty.
    pub async fn latest_block_number(&self) -> Result<i64, StorageError> {
        let latest: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(block_number), 0) FROM blocks")
            .fetch_one(self.pool.inner())
            .await?;
        Ok(latest)
    }

    /// Look up a single block by number.
    #[cfg(test)]
    pub(crate) async fn get(&self, block_number: i64) -> Result<Option<Block>, StorageError> {
        let sql = format!("SELECT {BLOCK_COLUMNS} FROM blocks WHERE block_number = ?");
        let row = sqlx::query(&sql)
            .bind(block_number)
            .fetch_optional(self.pool.inner())
            .await?;
        row.as_ref().map(block_from_row).transpose()
    }

    /// Statistics over the most recent `window` blocks by block number.
    ///
    /// Block time is the mean of the positive timestamp deltas between
    /// consecutive blocks; zero or negative deltas are left out of the
    /// average entirely.
    pub async fn aggregate_stats(&self, window: u32) -> Result<BlockStats, StorageError> {
        check_limit(window, 1, u32::MAX)?;

        let rows: Vec<(i64, i64, i64, i64)> = sqlx::query_as(
            "SELECT block_number, timestamp, transaction_count, gas_used
             FROM blocks ORDER BY block_number DESC LIMIT ?",
        )
        .bind(i64::from(window))
        .fetch_all(self.pool.inner())
        .await?;

        Ok(compute_stats(&rows))
    }

    /// Newest-first listing, optionally bounded.
    pub(crate) async fn newest(&self, limit: Option<u32>) -> Result<Vec<Block>, StorageError> {
        let rows = match limit {
            Some(limit) => {
                let sql = format!(
                    "SELECT {BLOCK_COLUMNS} FROM blocks ORDER BY block_number DESC LIMIT ?"
                );
                sqlx::query(&sql)
                    .bind(i64::from(limit))
                    .fetch_all(self.pool.inner())
                    .await?
            }
            None => {
                let sql = format!("SELECT {BLOCK_COLUMNS} FROM blocks ORDER BY block_number DESC");
                sqlx::query(&sql).fetch_all(self.pool.inner()).await?
            }
        };

        rows.iter().map(block_from_row).collect()
    }
}

pub(crate) fn check_limit(limit: u32, min: u32, max: u32) -> Result<(), StorageError> {
    if limit < min || limit > max {
        return Err(StorageError::InvalidLimit {
            limit: i64::from(limit),
            min: i64::from(min),
            max: i64::from(max),
        });
    }
    Ok(())
}

pub(crate) fn block_from_row(row: &SqliteRow) -> Result<Block, StorageError> {
    let created_at: i64 = row.try_get("created_at")?;
    Ok(Block {
        id: Some(row.try_get("id")?),
        block_number: row.try_get("block_number")?,
        timestamp: row.try_get("timestamp")?,
        transaction_count: row.try_get("transaction_count")?,
        gas_used: row.try_get("gas_used")?,
        stored_at: DateTime::<Utc>::from_timestamp_millis(created_at),
    })
}

/// Rows are `(block_number, timestamp, transaction_count, gas_used)`,
/// newest first.
fn compute_stats(rows: &[(i64, i64, i64, i64)]) -> BlockStats {
    let Some(&(latest_number, latest_ts, _, _)) = rows.first() else {
        return BlockStats::default();
    };

    // Sums run in i128: stored values reach i64::MAX.
    let deltas: Vec<i128> = rows
        .windows(2)
        .map(|pair| i128::from(pair[0].1) - i128::from(pair[1].1))
        .filter(|delta| *delta > 0)
        .collect();

    let average_block_time = if deltas.is_empty() {
        0
    } else {
        mean(deltas.iter().sum(), deltas.len())
    };

    let tx_sum: i128 = rows.iter().map(|r| i128::from(r.2)).sum();
    let total_transactions = i64::try_from(tx_sum).unwrap_or(i64::MAX);
    let average_gas_used = mean(rows.iter().map(|r| i128::from(r.3)).sum(), rows.len());

    BlockStats {
        average_block_time,
        total_transactions,
        average_gas_used,
        latest_block_timestamp: latest_ts,
        latest_block_number: latest_number,
        window_size: rows.len(),
    }
}

/// Rounded mean of non-negative values, saturating at `i64::MAX`.
fn mean(sum: i128, count: usize) -> i64 {
    (sum as f64 / count as f64).round().min(i64::MAX as f64) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::init_schema;
    use std::sync::Arc;

    async fn create_test_store() -> BlockStore {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        init_schema(&pool).await.unwrap();
        BlockStore::new(pool)
    }

    #[tokio::test]
    async fn test_insert_if_absent_is_idempotent() {
        let store = create_test_store().await;
        let block = Block::new(100, 1_700_000_000, 5, 21_000);

        let first = store.insert_if_absent(&block).await.unwrap();
        assert!(matches!(first, InsertOutcome::Inserted(id) if id > 0));

        let second = store.insert_if_absent(&block).await.unwrap();
        assert_eq!(second, InsertOutcome::AlreadyExists);

        let page = store.range(10).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.blocks[0].block_number, 100);
    }

    #[tokio::test]
    async fn test_concurrent_inserts_store_one_row() {
        let store = Arc::new(create_test_store().await);
        let block = Block::new(42, 1_700_000_000, 1, 1);

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            let block = block.clone();
            tasks.push(tokio::spawn(
                async move { store.insert_if_absent(&block).await },
            ));
        }

        let mut inserted = 0;
        for task in tasks {
            if let InsertOutcome::Inserted(_) = task.await.unwrap().unwrap() {
                inserted += 1;
            }
        }
        assert_eq!(inserted, 1);
        assert_eq!(store.range(10).await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn test_out_of_order_insert_accepted() {
        let store = create_test_store().await;
        store
            .insert_if_absent(&Block::new(10, 100, 0, 0))
            .await
            .unwrap();
        let outcome = store
            .insert_if_absent(&Block::new(5, 50, 0, 0))
            .await
            .unwrap();
        assert!(matches!(outcome, InsertOutcome::Inserted(_)));
        assert_eq!(store.latest_block_number().await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_latest_block_number_empty() {
        let store = create_test_store().await;
        assert_eq!(store.latest_block_number().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_range_orders_descending() {
        let store = create_test_store().await;
        for n in [3, 1, 2] {
            store
                .insert_if_absent(&Block::new(n, n * 10, 0, 0))
                .await
                .unwrap();
        }

        let page = store.range(2).await.unwrap();
        assert_eq!(page.total, 3);
        let numbers: Vec<i64> = page.blocks.iter().map(|b| b.block_number).collect();
        assert_eq!(numbers, vec![3, 2]);
        assert!(page.blocks[0].stored_at.is_some());
    }

    #[tokio::test]
    async fn test_range_rejects_invalid_limit() {
        let store = create_test_store().await;
        assert!(matches!(
            store.range(0).await,
            Err(StorageError::InvalidLimit { limit: 0, .. })
        ));
        assert!(matches!(
            store.range(1001).await,
            Err(StorageError::InvalidLimit { limit: 1001, .. })
        ));
        assert!(store.range(1000).await.is_ok());
    }

    #[tokio::test]
    async fn test_get_block() {
        let store = create_test_store().await;
        store
            .insert_if_absent(&Block::new(9, 90, 3, 300))
            .await
            .unwrap();

        let block = store.get(9).await.unwrap().unwrap();
        assert_eq!(block.transaction_count, 3);
        assert_eq!(block.gas_used, 300);
        assert!(store.get(10).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_aggregate_stats() {
        let store = create_test_store().await;
        // Deltas (newest first): 2, 0 (excluded), 4 -> mean 3.
        for (n, ts, txs, gas) in [(1, 100, 1, 10), (2, 104, 2, 20), (3, 104, 3, 30), (4, 106, 4, 40)] {
            store
                .insert_if_absent(&Block::new(n, ts, txs, gas))
                .await
                .unwrap();
        }

        let stats = store.aggregate_stats(DEFAULT_STATS_WINDOW).await.unwrap();
        assert_eq!(stats.average_block_time, 3);
        assert_eq!(stats.total_transactions, 10);
        assert_eq!(stats.average_gas_used, 25);
        assert_eq!(stats.latest_block_number, 4);
        assert_eq!(stats.latest_block_timestamp, 106);
        assert_eq!(stats.window_size, 4);
    }

    #[tokio::test]
    async fn test_aggregate_stats_window() {
        let store = create_test_store().await;
        for n in 1..=5 {
            store
                .insert_if_absent(&Block::new(n, n * 10, 1, 0))
                .await
                .unwrap();
        }

        let stats = store.aggregate_stats(2).await.unwrap();
        assert_eq!(stats.window_size, 2);
        assert_eq!(stats.total_transactions, 2);
        assert_eq!(stats.average_block_time, 10);
    }

    #[tokio::test]
    async fn test_aggregate_stats_empty() {
        let store = create_test_store().await;
        let stats = store.aggregate_stats(100).await.unwrap();
        assert_eq!(stats, BlockStats::default());
        assert!(store.aggregate_stats(0).await.is_err());
    }

    #[test]
    fn test_compute_stats_negative_deltas_excluded() {
        // Newest first; timestamps regress once.
        let rows = [(3, 50, 0, 0), (2, 60, 0, 0), (1, 40, 0, 0)];
        let stats = compute_stats(&rows);
        assert_eq!(stats.average_block_time, 20);
    }

    #[tokio::test]
    async fn test_aggregate_stats_extreme_values() {
        let store = create_test_store().await;
        let payload = serde_json::json!({
            "number": 1,
            "timestamp": 100,
            "transactionCount": "0x7fffffffffffffff",
            "gasUsed": "0x7fffffffffffffff"
        });
        let block = crate::source::parser::parse_block(&payload, 0).unwrap();
        store.insert_if_absent(&block).await.unwrap();
        store
            .insert_if_absent(&Block { block_number: 2, timestamp: 102, ..block })
            .await
            .unwrap();

        let stats = store.aggregate_stats(100).await.unwrap();
        assert_eq!(stats.average_gas_used, i64::MAX);
        assert_eq!(stats.total_transactions, i64::MAX);
        assert_eq!(stats.average_block_time, 2);
    }
}
