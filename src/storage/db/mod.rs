//! Database abstraction layer.
//!
//! Currently supports SQLite only. The wrapper is intentionally thin:
//! callers run sqlx queries against [`SqlitePool::inner`].
//!
//! # Example
//!
//! ```ignore
//! let pool = SqlitePool::connect("sqlite:data/blocks.db?mode=rwc").await?;
//! let row = sqlx::query("SELECT 1").fetch_one(pool.inner()).await?;
//! ```

mod sqlite;

pub use sqlite::{DEFAULT_MAX_CONNECTIONS, SqlitePool};
