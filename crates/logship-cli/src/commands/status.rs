//! Status command - Pending records and crash backlog
//!
//! Provides the `logship status` CLI command which shows:
//! 1. Pending record count and bytes for each priority
//! 2. Bytes used by the whole store against its capacity
//! 3. Raw crash files not yet processed

use anyhow::Result;
use clap::Args;
use logship_core::config::Config;
use logship_core::domain::Priority;
use logship_core::ports::ILogStore;
use logship_crashes::CrashReportStore;
use serde::Serialize;
use tracing::info;

use super::open_store;
use crate::output::{format_size, get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct StatusCommand {}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartitionStatus {
    pub priority: Priority,
    pub pending: u64,
    pub pending_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub database_found: bool,
    pub partitions: Vec<PartitionStatus>,
    pub used_bytes: u64,
    pub capacity_bytes: u64,
    pub unprocessed_crashes: usize,
}

/// Gathers counts without touching any record
pub async fn collect(config: &Config) -> Result<StatusReport> {
    let crashes = CrashReportStore::new(config.crashes.reports_dir.clone())
        .list()?
        .len();

    let mut report = StatusReport {
        database_found: false,
        partitions: Vec::new(),
        used_bytes: 0,
        capacity_bytes: config.storage.capacity_bytes,
        unprocessed_crashes: crashes,
    };

    let Some((pool, store)) = open_store(config).await? else {
        return Ok(report);
    };
    report.database_found = true;
    for priority in Priority::DRAIN_ORDER {
        report.partitions.push(PartitionStatus {
            priority,
            pending: store.pending_count(priority).await?,
            pending_bytes: store.pending_bytes(priority).await?,
        });
    }
    report.used_bytes = store.used_bytes().await?;
    pool.close().await;
    Ok(report)
}

impl StatusCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(matches!(format, OutputFormat::Json));
        info!(db = %config.storage.database_path.display(), "Collecting status");
        let report = collect(config).await?;

        if matches!(format, OutputFormat::Json) {
            formatter.print_json(&serde_json::to_value(&report)?);
            return Ok(());
        }

        if !report.database_found {
            formatter.warn(&format!(
                "No database at {}",
                config.storage.database_path.display()
            ));
        } else {
            let rows: Vec<Vec<String>> = report
                .partitions
                .iter()
                .map(|p| {
                    vec![
                        p.priority.to_string(),
                        p.pending.to_string(),
                        format_size(p.pending_bytes),
                    ]
                })
                .collect();
            formatter.table(&["Priority", "Pending", "Size"], &rows);
            println!();
            println!(
                "Storage: {} of {}",
                format_size(report.used_bytes),
                format_size(report.capacity_bytes)
            );
        }
        println!("Unprocessed crashes: {}", report.unprocessed_crashes);
        Ok(())
    }
}
