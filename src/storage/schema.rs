//! Database schema definitions.

use crate::storage::StorageError;
use crate::storage::db::SqlitePool;

/// SQL statement for creating the blocks table.
///
/// `block_number` is the logical key and carries the UNIQUE constraint that
/// makes `INSERT OR IGNORE` an atomic insert-if-absent. `id` is storage
/// bookkeeping only; AUTOINCREMENT keeps its counter in `sqlite_sequence`
/// so it can be reset after a full clear.
pub const BLOCKS_TABLE_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS blocks (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    block_number      INTEGER NOT NULL UNIQUE,
    timestamp         INTEGER NOT NULL,
    transaction_count INTEGER NOT NULL,
    gas_used          INTEGER NOT NULL,
    created_at        INTEGER NOT NULL
);
"#;

/// Index backing age-based cleanup and oldest-timestamp lookups.
pub const BLOCKS_TIMESTAMP_INDEX_DDL: &str = r#"
CREATE INDEX IF NOT EXISTS idx_blocks_timestamp ON blocks (timestamp);
"#;

/// Initialize the database schema.
///
/// Creates all necessary tables and indexes if they don't exist.
pub async fn init_schema(pool: &SqlitePool) -> Result<(), StorageError> {
    sqlx::query(BLOCKS_TABLE_DDL).execute(pool.inner()).await?;
    sqlx::query(BLOCKS_TIMESTAMP_INDEX_DDL)
        .execute(pool.inner())
        .await?;

    tracing::info!("Database schema initialized");
    Ok(())
}
