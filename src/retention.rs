//! Retention: bounds store growth by block count and age.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::storage::{CleanupOptions, SECONDS_PER_DAY, StorageAdmin, StorageError};

/// Default maximum number of stored blocks.
pub const DEFAULT_MAX_BLOCKS: u32 = 10_000;

/// Default maximum block age in days.
pub const DEFAULT_MAX_AGE_DAYS: u32 = 30;

/// Count and age thresholds. `None` or `0` disables a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionPolicy {
    #[serde(default = "default_max_blocks")]
    pub max_blocks: Option<u32>,
    #[serde(default = "default_max_age_days")]
    pub max_age_days: Option<u32>,
}

fn default_max_blocks() -> Option<u32> {
    Some(DEFAULT_MAX_BLOCKS)
}

fn default_max_age_days() -> Option<u32> {
    Some(DEFAULT_MAX_AGE_DAYS)
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_blocks: default_max_blocks(),
            max_age_days: default_max_age_days(),
        }
    }
}

/// Applies a [`RetentionPolicy`] to the store.
#[derive(Clone)]
pub struct RetentionManager {
    admin: StorageAdmin,
    policy: RetentionPolicy,
}

impl std::fmt::Debug for RetentionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetentionManager")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl RetentionManager {
    pub fn new(admin: StorageAdmin, policy: RetentionPolicy) -> Self {
        Self { admin, policy }
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    /// Delete blocks exceeding the policy.
    ///
    /// The count limit is checked first; the age limit only applies when the
    /// count is within bounds. Returns `None` when nothing needed cleaning or
    /// the store could not be evaluated.
    pub async fn auto_cleanup(&self) -> Option<u64> {
        match self.evaluate().await {
            Ok(deleted) => deleted,
            Err(e) => {
                tracing::error!(error = %e, "Auto cleanup failed");
                None
            }
        }
    }

    async fn evaluate(&self) -> Result<Option<u64>, StorageError> {
        let stats = self.admin.database_stats().await?;

        if let Some(max_blocks) = self.policy.max_blocks.filter(|m| *m > 0)
            && stats.total_blocks > i64::from(max_blocks)
        {
            tracing::info!(
                total_blocks = stats.total_blocks,
                max_blocks,
                "Block count exceeds limit, cleaning up"
            );
            let deleted = self
                .admin
                .delete_where(&CleanupOptions::keep_latest(max_blocks))
                .await?;
            return Ok(Some(deleted));
        }

        if let Some(max_age_days) = self.policy.max_age_days.filter(|d| *d > 0)
            && let Some(oldest) = stats.oldest_timestamp
        {
            let cutoff = Utc::now().timestamp() - i64::from(max_age_days) * SECONDS_PER_DAY;
            if oldest < cutoff {
                tracing::info!(
                    oldest_timestamp = oldest,
                    max_age_days,
                    "Blocks exceed age limit, cleaning up"
                );
                let deleted = self
                    .admin
                    .delete_where(&CleanupOptions::older_than_days(max_age_days))
                    .await?;
                return Ok(Some(deleted));
            }
        }

        tracing::debug!(total_blocks = stats.total_blocks, "No cleanup needed");
        Ok(None)
    }

    /// Run [`auto_cleanup`](Self::auto_cleanup) every `every`, starting one
    /// period from now. Abort the returned handle to stop.
    pub fn spawn_periodic(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tracing::info!(interval = ?every, "Starting periodic auto cleanup");
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Some(deleted) = self.auto_cleanup().await {
                    tracing::info!(deleted, "Periodic auto cleanup completed");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Block, StorageBuilder, StorageHandles};

    async fn create_store() -> StorageHandles {
        StorageBuilder::new("sqlite::memory:").build().await.unwrap()
    }

    /// Insert `count` blocks numbered from 1 with timestamps starting at `first_ts`.
    async fn seed(handles: &StorageHandles, count: i64, first_ts: i64) {
        sqlx::query(
            "WITH RECURSIVE seq(n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM seq WHERE n < ?)
             INSERT INTO blocks (block_number, timestamp, transaction_count, gas_used, created_at)
             SELECT n, ? + n, 0, 0, 0 FROM seq",
        )
        .bind(count)
        .bind(first_ts - 1)
        .execute(handles.pool.inner())
        .await
        .unwrap();
    }

    fn days_ago(days: i64) -> i64 {
        Utc::now().timestamp() - days * SECONDS_PER_DAY
    }

    #[test]
    fn test_policy_defaults() {
        let policy = RetentionPolicy::default();
        assert_eq!(policy.max_blocks, Some(10_000));
        assert_eq!(policy.max_age_days, Some(30));

        let parsed: RetentionPolicy = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed, policy);
    }

    #[tokio::test]
    async fn test_count_limit_takes_precedence() {
        let handles = create_store().await;
        seed(&handles, 15_000, days_ago(60)).await;

        let manager = RetentionManager::new(handles.admin.clone(), RetentionPolicy::default());
        assert_eq!(manager.auto_cleanup().await, Some(5_000));

        let stats = handles.admin.database_stats().await.unwrap();
        assert_eq!(stats.total_blocks, 10_000);
        assert_eq!(stats.oldest_block, Some(5_001));
        assert_eq!(stats.newest_block, Some(15_000));
    }

    #[tokio::test]
    async fn test_age_limit_applies_within_count() {
        let handles = create_store().await;
        handles
            .blocks
            .insert_if_absent(&Block::new(1, days_ago(40), 0, 0))
            .await
            .unwrap();
        handles
            .blocks
            .insert_if_absent(&Block::new(2, days_ago(1), 0, 0))
            .await
            .unwrap();

        let manager = RetentionManager::new(handles.admin.clone(), RetentionPolicy::default());
        assert_eq!(manager.auto_cleanup().await, Some(1));
        assert!(handles.blocks.get(1).await.unwrap().is_none());
        assert!(handles.blocks.get(2).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_zero_age_disables_age_limit() {
        let handles = create_store().await;
        handles
            .blocks
            .insert_if_absent(&Block::new(1, days_ago(400), 0, 0))
            .await
            .unwrap();

        let policy = RetentionPolicy {
            max_blocks: Some(100),
            max_age_days: Some(0),
        };
        let manager = RetentionManager::new(handles.admin.clone(), policy);
        assert_eq!(manager.auto_cleanup().await, None);
        assert_eq!(handles.blocks.latest_block_number().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_within_limits_is_none() {
        let handles = create_store().await;
        let manager = RetentionManager::new(handles.admin.clone(), RetentionPolicy::default());
        assert_eq!(manager.auto_cleanup().await, None);

        seed(&handles, 10, days_ago(1)).await;
        assert_eq!(manager.auto_cleanup().await, None);
    }

    #[tokio::test]
    async fn test_storage_error_is_none() {
        let handles = create_store().await;
        let manager = RetentionManager::new(handles.admin.clone(), RetentionPolicy::default());
        handles.pool.close().await;

        assert_eq!(manager.auto_cleanup().await, None);
    }

    #[tokio::test]
    async fn test_spawn_periodic_can_be_aborted() {
        let handles = create_store().await;
        seed(&handles, 20, days_ago(1)).await;
        let policy = RetentionPolicy {
            max_blocks: Some(5),
            max_age_days: None,
        };
        let manager = Arc::new(RetentionManager::new(handles.admin.clone(), policy));

        let task = Arc::clone(&manager).spawn_periodic(Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(200)).await;
        task.abort();

        assert_eq!(handles.admin.database_stats().await.unwrap().total_blocks, 5);
    }
}
