//! Purge command - Irreversibly delete buffered records
//!
//! Provides `logship purge` with exactly one scope:
//! - `--priority <high|default|background>`: one partition
//! - `--group <name>`: every record produced by one module
//! - `--all`: the whole store

use anyhow::Result;
use clap::Args;
use logship_core::config::Config;
use logship_core::domain::Priority;
use logship_core::ports::{ILogStore, PurgeScope};
use tracing::info;

use super::open_store;
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
pub struct PurgeCommand {
    /// Purge one priority partition
    #[arg(long)]
    pub priority: Option<Priority>,
    /// Purge every record produced by one module
    #[arg(long)]
    pub group: Option<String>,
    /// Purge everything
    #[arg(long)]
    pub all: bool,
}

impl PurgeCommand {
    fn scope(&self) -> PurgeScope {
        match (self.priority, &self.group) {
            (Some(priority), _) => PurgeScope::Priority(priority),
            (None, Some(group)) => PurgeScope::Group(group.clone()),
            (None, None) => PurgeScope::All,
        }
    }

    pub async fn execute(&self, config: &Config, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(matches!(format, OutputFormat::Json));
        let scope = self.scope();

        let deleted = purge(config, scope.clone()).await?;
        if matches!(format, OutputFormat::Json) {
            formatter.print_json(&serde_json::json!({
                "scope": format!("{scope:?}"),
                "deleted": deleted,
            }));
        } else {
            formatter.success(&format!("Deleted {} record(s)", deleted));
        }
        Ok(())
    }
}

/// Deletes every record in `scope`. A missing database counts as empty.
pub async fn purge(config: &Config, scope: PurgeScope) -> Result<u64> {
    let Some((pool, store)) = open_store(config).await? else {
        return Ok(0);
    };
    let deleted = store.delete_all(scope.clone()).await?;
    info!(?scope, deleted, "Purged records");
    pool.close().await;
    Ok(deleted)
}
