//! blockwatch - Block Collection Pipeline
//!
//! This crate polls an external HTTP source for the latest block, normalizes
//! it, deduplicates against what is already stored, persists new blocks to
//! SQLite and bounds the store by count and age. It can be used as a library
//! or run as a standalone service with the `blockwatch` executable.
//!
//! # Architecture
//!
//! - **Source**: HTTP fetch with retries and a tolerant payload parser
//! - **Storage**: sqlx/SQLite persistence with insert-if-absent semantics
//! - **Collector**: Fetch → dedup → store cycles and a fixed-interval scheduler
//! - **Retention**: Count- and age-based bulk cleanup
//! - **Server**: JSON API over all of the above

pub mod collector;
pub mod config;
pub mod retention;
pub mod server;
pub mod source;
pub mod storage;

pub use collector::{
    BlockCollector, BlockSource, CollectionScheduler, CollectorError, CollectorStats,
    CycleOutcome, SchedulerStatus,
};
pub use config::{AppConfig, ConfigError};
pub use retention::{RetentionManager, RetentionPolicy};
pub use source::{SourceClient, SourceConfig, SourceError};
pub use storage::{
    Block, BlockPage, BlockStats, BlockStore, CleanupOptions, DatabaseStats, InsertOutcome,
    StorageAdmin, StorageBuilder, StorageError, StorageHandles,
};
