//! Flush command - Send everything pending and exit
//!
//! Starts a full runtime against the configured store, which also turns any
//! crash files into crash logs, then flushes every channel and shuts down
//! once they drain or the timeout passes.

use std::time::Duration;

use anyhow::Result;
use clap::Args;
use logship::LogShip;
use logship_core::config::Config;
use logship_core::domain::Priority;
use logship_core::ports::ILogStore;
use tracing::info;

use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct FlushCommand {
    /// Seconds to wait for the channels to drain
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,
}

impl FlushCommand {
    pub async fn execute(&self, config: Config, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(matches!(format, OutputFormat::Json));

        // Panics in this tool are not crashes of the instrumented application
        let logship = LogShip::builder(config).without_panic_hook().build().await?;
        logship.start().await?;
        info!(timeout_secs = self.timeout, "Flushing pending records");
        logship.shutdown(Duration::from_secs(self.timeout)).await;

        // The runtime closed its pool; count what is left with a fresh one
        let left = remaining(logship.config()).await?;
        if matches!(format, OutputFormat::Json) {
            formatter.print_json(&serde_json::json!({ "remaining": left }));
        } else if left == 0 {
            formatter.success("All pending records sent");
        } else {
            formatter.warn(&format!("{} record(s) still pending", left));
        }
        Ok(())
    }
}

async fn remaining(config: &Config) -> Result<u64> {
    let Some((pool, store)) = super::open_store(config).await? else {
        return Ok(0);
    };
    let mut total = 0;
    for priority in Priority::DRAIN_ORDER {
        total += store.pending_count(priority).await?;
    }
    pool.close().await;
    Ok(total)
}
