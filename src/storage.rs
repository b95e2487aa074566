//! Storage Layer
//!
//! SQLite persistence for blocks via sqlx:
//! - **Blocks**: Append-mostly table keyed by a unique block number
//! - **Admin**: Bulk deletion, compaction, export and whole-store stats
//!
//! # Components
//!
//! - [`BlockStore`]: Insert-if-absent, ranged reads, aggregate stats
//! - [`StorageAdmin`]: Cleanup and maintenance operations
//! - [`StorageBuilder`] / [`StorageHandles`]: Initialization and lifecycle management

mod admin;
mod block_store;
mod builder;
pub mod db;
mod error;
mod schema;
mod types;

pub use admin::{MAX_EXPORT_LIMIT, StorageAdmin};
pub use block_store::{BlockStore, DEFAULT_STATS_WINDOW, MAX_RANGE_LIMIT, MIN_RANGE_LIMIT};
pub use builder::{StorageBuilder, StorageHandles};
pub use error::StorageError;
pub use types::{
    Block, BlockPage, BlockStats, CleanupOptions, CleanupPredicate, DatabaseStats, InsertOutcome,
    SECONDS_PER_DAY,
};
