//! Collector Layer
//!
//! Fetch → dedup → store cycles and the timer that drives them.
//!
//! # Architecture
//!
//! - [`BlockSource`]: Trait seam for anything that can produce the latest block
//! - [`BlockCollector`]: Runs one cycle and keeps cumulative counters
//! - [`CollectionScheduler`]: Fires cycles on a fixed interval with start/stop control
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use blockwatch::{BlockCollector, CollectionScheduler, SourceClient, SourceConfig, StorageBuilder};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let handles = StorageBuilder::new("data/blocks.db").build().await?;
//! let source = SourceClient::new(SourceConfig::new("http://localhost:8545/latest"))?;
//! let collector = Arc::new(BlockCollector::new(Arc::new(source), handles.blocks.clone()));
//! let scheduler = CollectionScheduler::new(collector, Duration::from_secs(30));
//! scheduler.start().await?;
//! # Ok(())
//! # }
//! ```

pub(crate) mod block_collector;
mod scheduler;
mod traits;

pub use block_collector::{BlockCollector, CollectorStats, CycleOutcome};
pub use scheduler::{CollectionScheduler, SchedulerStatus};
pub use traits::{BlockSource, CollectorError, DEFAULT_INTERVAL, MIN_INTERVAL, clamp_interval};
