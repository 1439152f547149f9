//! logship Cache - Durable storage of pending records
//!
//! SQLite-based store for:
//! - Records waiting to be sent, partitioned by priority
//! - Installation-scoped settings (install id)
//!
//! ## Architecture
//!
//! This crate implements the `ILogStore` port from `logship-core` using
//! SQLite as the storage backend. It is a driven (secondary) adapter in the
//! hexagonal architecture.
//!
//! ## Key Components
//!
//! - [`DatabasePool`] - Connection pool with migration support
//! - [`SqliteLogStore`] - Full `ILogStore` implementation with loans and eviction
//! - [`SqliteSettings`] - Key/value settings, including the install id
//! - [`CacheError`] - Error types for cache operations
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use logship_cache::{DatabasePool, SqliteLogStore};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pool = DatabasePool::new(Path::new("/home/user/.local/share/logship/logs.db")).await?;
//! let store = SqliteLogStore::new(pool.pool().clone(), 10 * 1024 * 1024).await?;
//! // Use store as ILogStore...
//! # Ok(())
//! # }
//! ```

pub mod pool;
pub mod settings;
pub mod store;

pub use pool::DatabasePool;
pub use settings::SqliteSettings;
pub use store::SqliteLogStore;

use logship_core::domain::StoreError;

/// Errors that can occur during cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Failed to establish a database connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A database query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Serialization or deserialization of domain types failed
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<sqlx::Error> for CacheError {
    fn from(e: sqlx::Error) -> Self {
        CacheError::QueryFailed(e.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::SerializationError(e.to_string())
    }
}

impl From<CacheError> for StoreError {
    fn from(e: CacheError) -> Self {
        match e {
            CacheError::SerializationError(msg) => StoreError::Serialization(msg),
            other => StoreError::Backend(other.to_string()),
        }
    }
}
