//! CLI subcommands

pub mod config;
pub mod crashes;
pub mod flush;
pub mod purge;
pub mod status;

use anyhow::{Context, Result};
use logship_cache::{DatabasePool, SqliteLogStore};
use logship_core::config::Config;

/// Opens the store of an existing installation.
///
/// Returns `None` when no database has been created yet.
pub(crate) async fn open_store(config: &Config) -> Result<Option<(DatabasePool, SqliteLogStore)>> {
    let db_path = &config.storage.database_path;
    if !db_path.exists() {
        return Ok(None);
    }
    let pool = DatabasePool::new(db_path)
        .await
        .context("Failed to open database")?;
    let store = SqliteLogStore::new(pool.pool().clone(), config.storage.capacity_bytes)
        .await
        .context("Failed to open log store")?;
    Ok(Some((pool, store)))
}
