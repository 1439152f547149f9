//! Crashes command - Manage raw crash files
//!
//! Provides the `logship crashes` CLI command with subcommands:
//! - `list`: Show crash files waiting to be processed
//! - `show <id>`: Display one crash record
//! - `delete`: Remove crash files from local storage
//!
//! Crash files are turned into crash logs on the next start of the
//! instrumented application; deleting one here means it is never reported.

use anyhow::Result;
use clap::Subcommand;
use logship_core::config::Config;
use logship_crashes::{CrashRecord, CrashReportStore};

use crate::output::{format_size, get_formatter, OutputFormat};

/// Crash file subcommands
#[derive(Debug, Subcommand)]
pub enum CrashesCommand {
    /// List unprocessed crash files
    List,
    /// Show one crash record
    Show {
        /// Incident id or id prefix
        id: String,
    },
    /// Delete crash files
    Delete {
        /// Incident id or id prefix
        id: Option<String>,
        /// Delete every crash file
        #[arg(long, conflicts_with = "id")]
        all: bool,
    },
}

impl CrashesCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(matches!(format, OutputFormat::Json));
        let store = CrashReportStore::new(config.crashes.reports_dir.clone());

        match self {
            CrashesCommand::List => {
                let entries = store.list()?;
                if matches!(format, OutputFormat::Json) {
                    let json: Vec<serde_json::Value> = entries
                        .iter()
                        .map(|e| {
                            serde_json::json!({
                                "id": e.id,
                                "date": e.date,
                                "size_bytes": e.size_bytes,
                            })
                        })
                        .collect();
                    formatter.print_json(&serde_json::json!(json));
                    return Ok(());
                }
                if entries.is_empty() {
                    formatter.info("No crash files found.");
                    return Ok(());
                }

                let rows: Vec<Vec<String>> = entries
                    .iter()
                    .map(|e| vec![e.id.clone(), e.date.clone(), format_size(e.size_bytes)])
                    .collect();
                formatter.table(&["ID", "Date", "Size"], &rows);
                println!();
                println!("Total: {} crash file(s)", entries.len());
                if store.always_send() {
                    formatter.info("Always-send is on: these will be sent without asking.");
                }
            }

            CrashesCommand::Show { id } => match store.load(id)? {
                Some(record) => {
                    if matches!(format, OutputFormat::Json) {
                        formatter.print_json(&serde_json::to_value(&record)?);
                    } else {
                        print_record(&record);
                    }
                }
                None => {
                    formatter.error(&format!("Crash '{}' not found", id));
                }
            },

            CrashesCommand::Delete { id, all } => {
                if *all {
                    let count = store.delete_all()?;
                    formatter.success(&format!("Deleted {} crash file(s)", count));
                } else if let Some(ref crash_id) = id {
                    if store.delete(crash_id)? {
                        formatter.success(&format!("Deleted crash '{}'", crash_id));
                    } else {
                        formatter.error(&format!("Crash '{}' not found", crash_id));
                    }
                } else {
                    formatter.error("Specify a crash ID or use --all");
                }
            }
        }

        Ok(())
    }
}

fn print_record(record: &CrashRecord) {
    println!("id:        {}", record.id);
    println!("time:      {}", record.timestamp.to_rfc3339());
    println!("version:   {}", record.version);
    println!("process:   {}", record.process);
    if !record.thread.is_empty() {
        println!("thread:    {}", record.thread);
    }
    println!("message:   {}", record.message);
    if !record.location.is_empty() {
        println!("location:  {}", record.location);
    }
    if !record.backtrace.is_empty() {
        println!();
        println!("{}", record.backtrace);
    }
}
