//! Collection scheduler: runs the collector on a fixed cadence.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::collector::{BlockCollector, CollectorError, CollectorStats, MIN_INTERVAL, clamp_interval};

/// Read-only view of the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatus {
    pub running: bool,
    pub interval_seconds: u64,
    pub stats: CollectorStats,
}

/// Lifecycle phase. `Starting` covers the probe and the initial cycle;
/// a `stop()` in that window moves back to `Stopped` and `start()` then
/// declines to spawn the ticker.
enum Phase {
    Stopped,
    Starting,
    Running(JoinHandle<()>),
}

struct SchedulerState {
    interval: Duration,
    phase: Phase,
}

impl SchedulerState {
    fn is_running(&self) -> bool {
        matches!(&self.phase, Phase::Running(ticker) if !ticker.is_finished())
    }
}

/// Owns the periodic collection task.
///
/// Each tick spawns an independent cycle, so a slow cycle never delays the
/// next firing. Stopping aborts the ticker only; cycles already in flight
/// run to completion.
pub struct CollectionScheduler {
    collector: Arc<BlockCollector>,
    state: Mutex<SchedulerState>,
    lifecycle: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for CollectionScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("CollectionScheduler")
            .field("running", &state.is_running())
            .field("interval", &state.interval)
            .finish_non_exhaustive()
    }
}

impl CollectionScheduler {
    /// Create a stopped scheduler. Intervals below [`MIN_INTERVAL`] are clamped.
    pub fn new(collector: Arc<BlockCollector>, interval: Duration) -> Self {
        Self {
            collector,
            state: Mutex::new(SchedulerState {
                interval: clamp_interval(interval),
                phase: Phase::Stopped,
            }),
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    pub fn collector(&self) -> &Arc<BlockCollector> {
        &self.collector
    }

    /// Probe the source, run one cycle, then start the periodic ticker.
    ///
    /// A failed probe or initial cycle is logged and does not prevent the
    /// scheduler from running. A `stop()` issued before the ticker is
    /// spawned wins: the call returns `Ok` and the scheduler stays stopped.
    ///
    /// # Errors
    /// Returns [`CollectorError::Scheduler`] when called outside a Tokio runtime.
    pub async fn start(&self) -> Result<(), CollectorError> {
        let _guard = self.lifecycle.lock().await;
        self.start_locked().await
    }

    /// Body of [`start`](Self::start); the caller holds the lifecycle lock.
    async fn start_locked(&self) -> Result<(), CollectorError> {
        let runtime = Handle::try_current().map_err(|e| CollectorError::Scheduler(e.to_string()))?;

        {
            let mut state = self.state();
            if state.is_running() {
                tracing::warn!("Collection scheduler is already running");
                return Ok(());
            }
            state.phase = Phase::Starting;
            tracing::info!(interval = ?state.interval, "Starting collection scheduler");
        }

        if self.collector.source().check_health().await {
            tracing::info!("Block source is reachable");
        } else {
            tracing::warn!("Block source health check failed, continuing anyway");
        }

        if !self.collector.run_cycle().await {
            tracing::warn!("Initial collection failed, continuing with scheduled collection");
        }

        let mut state = self.state();
        if !matches!(state.phase, Phase::Starting) {
            tracing::info!("Collection scheduler was stopped during startup, ticker not started");
            return Ok(());
        }

        let interval = state.interval;
        let collector = Arc::clone(&self.collector);
        let ticker = runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let collector = Arc::clone(&collector);
                tokio::spawn(async move {
                    collector.run_cycle().await;
                });
            }
        });

        state.phase = Phase::Running(ticker);
        tracing::info!(interval = ?interval, "Collection scheduler started");
        Ok(())
    }

    /// Cancel the periodic ticker, or a startup still in progress.
    /// Safe to call repeatedly.
    pub fn stop(&self) {
        match std::mem::replace(&mut self.state().phase, Phase::Stopped) {
            Phase::Running(ticker) if !ticker.is_finished() => {
                ticker.abort();
                tracing::info!("Collection scheduler stopped");
            }
            Phase::Starting => tracing::info!("Collection scheduler startup cancelled"),
            _ => tracing::warn!("Collection scheduler is not running"),
        }
    }

    /// Change the collection interval.
    ///
    /// Waits for any in-progress start. A running scheduler is restarted,
    /// which runs one extra immediate cycle.
    ///
    /// # Errors
    /// Returns [`CollectorError::Config`] for intervals under [`MIN_INTERVAL`];
    /// the current interval is kept.
    pub async fn update_interval(&self, seconds: u64) -> Result<(), CollectorError> {
        let interval = Duration::from_secs(seconds);
        if interval < MIN_INTERVAL {
            tracing::warn!(
                seconds,
                min_seconds = MIN_INTERVAL.as_secs(),
                "Rejected collection interval below minimum"
            );
            return Err(CollectorError::Config(format!(
                "interval must be at least {} seconds, got {}",
                MIN_INTERVAL.as_secs(),
                seconds
            )));
        }

        let _guard = self.lifecycle.lock().await;

        let was_running = self.is_running();
        if was_running {
            self.stop();
        }
        self.state().interval = interval;
        tracing::info!(seconds, "Collection interval updated");

        if was_running {
            self.start_locked().await?;
        }
        Ok(())
    }

    /// Run one cycle now, regardless of whether the scheduler is running.
    pub async fn trigger_manual_collection(&self) -> bool {
        self.collector.trigger_collection().await
    }

    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    #[cfg(test)]
    fn interval(&self) -> Duration {
        self.state().interval
    }

    pub fn status(&self) -> SchedulerStatus {
        let (running, interval) = {
            let state = self.state();
            (state.is_running(), state.interval)
        };
        SchedulerStatus {
            running,
            interval_seconds: interval.as_secs(),
            stats: self.collector.stats(),
        }
    }

    fn state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for CollectionScheduler {
    fn drop(&mut self) {
        if let Phase::Running(ticker) = &self.state().phase {
            ticker.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::BlockSource;
    use crate::collector::block_collector::tests::MockSource;
    use crate::source::SourceError;
    use crate::storage::{Block, StorageBuilder, StorageHandles};
    use std::sync::atomic::{AtomicI64, Ordering};

    /// Returns a strictly increasing block number on every fetch.
    struct CountingSource {
        next: AtomicI64,
    }

    #[async_trait::async_trait]
    impl BlockSource for CountingSource {
        async fn fetch_latest(&self) -> Result<Block, SourceError> {
            let n = self.next.fetch_add(1, Ordering::SeqCst);
            Ok(Block::new(n, 1_700_000_000 + n, 1, 100))
        }

        async fn check_health(&self) -> bool {
            true
        }
    }

    /// Counts fetches and takes `delay` to answer each one.
    struct SlowSource {
        next: AtomicI64,
        delay: Duration,
    }

    impl SlowSource {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                next: AtomicI64::new(1),
                delay,
            })
        }

        fn fetches(&self) -> i64 {
            self.next.load(Ordering::SeqCst) - 1
        }
    }

    #[async_trait::async_trait]
    impl BlockSource for SlowSource {
        async fn fetch_latest(&self) -> Result<Block, SourceError> {
            let n = self.next.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(Block::new(n, 1_700_000_000 + n, 1, 100))
        }

        async fn check_health(&self) -> bool {
            true
        }
    }

    async fn create_scheduler(source: Arc<dyn BlockSource>) -> (CollectionScheduler, StorageHandles) {
        let handles = StorageBuilder::new("sqlite::memory:").build().await.unwrap();
        let collector = Arc::new(BlockCollector::new(source, handles.blocks.clone()));
        (
            CollectionScheduler::new(collector, Duration::from_secs(30)),
            handles,
        )
    }

    #[tokio::test]
    async fn test_new_clamps_interval() {
        let (scheduler, _handles) = create_scheduler(MockSource::new(vec![])).await;
        assert_eq!(scheduler.interval(), Duration::from_secs(30));

        let collector = Arc::clone(scheduler.collector());
        let fast = CollectionScheduler::new(collector, Duration::from_secs(1));
        assert_eq!(fast.interval(), MIN_INTERVAL);
    }

    #[tokio::test]
    async fn test_start_runs_immediate_cycle() {
        let (scheduler, handles) =
            create_scheduler(MockSource::new(vec![Ok(Block::new(7, 70, 1, 1))])).await;

        scheduler.start().await.unwrap();

        assert!(scheduler.is_running());
        assert_eq!(handles.blocks.latest_block_number().await.unwrap(), 7);
        let status = scheduler.status();
        assert!(status.running);
        assert_eq!(status.interval_seconds, 30);
        assert_eq!(status.stats.total_stored, 1);

        scheduler.stop();
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn test_start_survives_unhealthy_source() {
        let (scheduler, _handles) = create_scheduler(MockSource::unhealthy(vec![])).await;

        scheduler.start().await.unwrap();

        assert!(scheduler.is_running());
        assert_eq!(scheduler.status().stats.total_errors, 1);
    }

    #[tokio::test]
    async fn test_start_twice_is_noop() {
        let source = MockSource::new(vec![Ok(Block::new(1, 1, 0, 0)), Ok(Block::new(2, 2, 0, 0))]);
        let (scheduler, _handles) = create_scheduler(source.clone()).await;

        scheduler.start().await.unwrap();
        scheduler.start().await.unwrap();

        assert_eq!(source.remaining(), 1);
        assert_eq!(scheduler.status().stats.total_fetched, 1);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let (scheduler, _handles) = create_scheduler(MockSource::new(vec![])).await;
        scheduler.stop();
        scheduler.start().await.unwrap();
        scheduler.stop();
        scheduler.stop();
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn test_ticker_fires_periodically() {
        let source = Arc::new(CountingSource {
            next: AtomicI64::new(1),
        });
        let (scheduler, _handles) = create_scheduler(source).await;
        scheduler.state().interval = Duration::from_millis(50);

        scheduler.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;
        scheduler.stop();

        let stored = scheduler.status().stats.total_stored;
        assert!(stored >= 3, "expected several scheduled cycles, got {stored}");
    }

    #[tokio::test]
    async fn test_stop_halts_ticker() {
        let source = Arc::new(CountingSource {
            next: AtomicI64::new(1),
        });
        let (scheduler, _handles) = create_scheduler(source).await;
        scheduler.state().interval = Duration::from_millis(20);

        scheduler.start().await.unwrap();
        scheduler.stop();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let after_stop = scheduler.status().stats.total_fetched;
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(scheduler.status().stats.total_fetched, after_stop);
    }

    #[tokio::test]
    async fn test_update_interval_rejects_below_minimum() {
        let (scheduler, _handles) = create_scheduler(MockSource::new(vec![])).await;

        let err = scheduler.update_interval(4).await.unwrap_err();
        assert!(matches!(err, CollectorError::Config(_)));
        assert_eq!(scheduler.interval(), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_update_interval_while_stopped() {
        let source = MockSource::new(vec![Ok(Block::new(1, 1, 0, 0))]);
        let (scheduler, _handles) = create_scheduler(source.clone()).await;

        scheduler.update_interval(10).await.unwrap();

        assert_eq!(scheduler.status().interval_seconds, 10);
        assert!(!scheduler.is_running());
        assert_eq!(source.remaining(), 1);
    }

    #[tokio::test]
    async fn test_update_interval_restarts_running_scheduler() {
        let source = MockSource::new(vec![Ok(Block::new(1, 1, 0, 0)), Ok(Block::new(2, 2, 0, 0))]);
        let (scheduler, handles) = create_scheduler(source.clone()).await;

        scheduler.start().await.unwrap();
        scheduler.update_interval(60).await.unwrap();

        assert!(scheduler.is_running());
        assert_eq!(scheduler.interval(), Duration::from_secs(60));
        assert_eq!(source.remaining(), 0);
        assert_eq!(handles.blocks.latest_block_number().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_stop_during_start_prevents_ticker() {
        let source = SlowSource::new(Duration::from_millis(300));
        let (scheduler, _handles) = create_scheduler(source.clone()).await;
        scheduler.state().interval = Duration::from_millis(20);
        let scheduler = Arc::new(scheduler);

        let starting = {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move { scheduler.start().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        scheduler.stop();
        starting.await.unwrap().unwrap();

        assert!(!scheduler.is_running());
        assert!(!scheduler.status().running);
        let after_start = source.fetches();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(source.fetches(), after_start);
    }

    #[tokio::test]
    async fn test_start_after_cancelled_start_runs() {
        let source = SlowSource::new(Duration::from_millis(100));
        let (scheduler, _handles) = create_scheduler(source).await;
        let scheduler = Arc::new(scheduler);

        let starting = {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move { scheduler.start().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        scheduler.stop();
        starting.await.unwrap().unwrap();
        assert!(!scheduler.is_running());

        scheduler.start().await.unwrap();
        assert!(scheduler.is_running());
        scheduler.stop();
    }

    #[tokio::test]
    async fn test_update_interval_during_start_applies_to_ticker() {
        let source = SlowSource::new(Duration::from_millis(300));
        let (scheduler, _handles) = create_scheduler(source.clone()).await;
        scheduler.state().interval = Duration::from_millis(50);
        let scheduler = Arc::new(scheduler);

        let starting = {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move { scheduler.start().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        scheduler.update_interval(3600).await.unwrap();
        starting.await.unwrap().unwrap();

        assert!(scheduler.is_running());
        assert_eq!(scheduler.status().interval_seconds, 3600);

        // Let any cycle already in flight settle, then expect no firings
        tokio::time::sleep(Duration::from_millis(350)).await;
        let settled = source.fetches();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(source.fetches(), settled);
        scheduler.stop();
    }

    #[tokio::test]
    async fn test_manual_trigger_while_stopped() {
        let (scheduler, handles) =
            create_scheduler(MockSource::new(vec![Ok(Block::new(5, 5, 0, 0))])).await;

        assert!(scheduler.trigger_manual_collection().await);
        assert!(!scheduler.is_running());
        assert_eq!(handles.blocks.latest_block_number().await.unwrap(), 5);
    }

    #[test]
    fn test_status_serializes_camel_case() {
        let status = SchedulerStatus {
            running: true,
            interval_seconds: 30,
            stats: CollectorStats::default(),
        };
        let value = serde_json::to_value(status).unwrap();
        assert_eq!(value["intervalSeconds"], 30);
        assert_eq!(value["stats"]["totalStored"], 0);
    }
}
