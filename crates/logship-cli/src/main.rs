//! LogShip CLI - Operator interface for a LogShip installation
//!
//! Works directly on the on-disk state of an installation:
//! - Pending record counts and storage usage
//! - Purging buffered records
//! - Inspecting and deleting raw crash files
//! - Flushing everything pending to the collector

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use logship_core::config::Config;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    config::ConfigCommand, crashes::CrashesCommand, flush::FlushCommand, purge::PurgeCommand,
    status::StatusCommand,
};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "logship", version, about = "Inspect and operate a LogShip pipeline")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show pending records, storage usage and unprocessed crashes
    Status(StatusCommand),
    /// Irreversibly delete buffered records
    Purge(PurgeCommand),
    /// Inspect and manage raw crash files
    #[command(subcommand)]
    Crashes(CrashesCommand),
    /// Send everything pending, then exit
    Flush(FlushCommand),
    /// View and check configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let config = Config::load_or_default(&config_path);

    // RUST_LOG wins, then -v, then the configured level
    let filter = match cli.verbose {
        0 => config.logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };

    match cli.command {
        Commands::Status(cmd) => cmd.execute(&config, format).await,
        Commands::Purge(cmd) => cmd.execute(&config, format).await,
        Commands::Crashes(cmd) => cmd.execute(&config, format).await,
        Commands::Flush(cmd) => cmd.execute(config, format).await,
        Commands::Config(cmd) => cmd.execute(&config_path, format).await,
    }
}
