//! Storage builder and handles.
//!
//! Provides a builder pattern for constructing the storage layer
//! and a handles struct for accessing all storage facades.

use std::path::Path;

use crate::storage::db::{DEFAULT_MAX_CONNECTIONS, SqlitePool};
use crate::storage::schema::init_schema;
use crate::storage::{BlockStore, StorageAdmin, StorageError};

/// Builder for constructing the storage layer.
pub struct StorageBuilder {
    url: String,
    max_connections: u32,
}

impl StorageBuilder {
    /// Create a new storage builder.
    ///
    /// Accepts a sqlx SQLite URL (`sqlite:data/blocks.db?mode=rwc`,
    /// `sqlite::memory:`) or a plain file path.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }

    /// Set the connection pool size.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Open the database, create the schema and return handles.
    ///
    /// Failure here is fatal for the service: nothing else can run without
    /// a store.
    pub async fn build(self) -> Result<StorageHandles, StorageError> {
        let url = normalize_url(&self.url);

        // Create parent directory if it doesn't exist
        if let Some(path) = file_path_of(&url)
            && let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Internal(format!(
                    "Failed to create database directory '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let pool = SqlitePool::connect_with(&url, self.max_connections).await?;
        init_schema(&pool).await?;

        Ok(StorageHandles {
            blocks: BlockStore::new(pool.clone()),
            admin: StorageAdmin::new(pool.clone()),
            pool,
        })
    }
}

/// Handles to all storage layer facades.
#[derive(Clone, Debug)]
pub struct StorageHandles {
    /// Block insert and query facade.
    pub blocks: BlockStore,
    /// Cleanup and maintenance facade.
    pub admin: StorageAdmin,
    /// Shared connection pool.
    pub pool: SqlitePool,
}

impl StorageHandles {
    /// Gracefully shutdown the storage layer.
    ///
    /// Closes the pool, waiting for checked-out connections to return.
    pub async fn shutdown(self) -> Result<(), StorageError> {
        self.pool.close().await;
        Ok(())
    }
}

fn normalize_url(url: &str) -> String {
    if url.starts_with("sqlite:") {
        url.to_string()
    } else {
        format!("sqlite:{url}?mode=rwc")
    }
}

/// File path component of a SQLite URL, if it names a file.
fn file_path_of(url: &str) -> Option<&str> {
    let rest = url.strip_prefix("sqlite://").or_else(|| url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or(rest);
    if path.is_empty() || path == ":memory:" || url.contains("mode=memory") {
        None
    } else {
        Some(path)
    }
}
