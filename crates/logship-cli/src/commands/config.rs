//! Config command - View and check LogShip configuration
//!
//! Provides the `logship config` CLI command which:
//! 1. Shows the effective configuration (YAML or JSON)
//! 2. Validates the configuration file and reports errors

use std::path::Path;

use anyhow::{Context, Result};
use clap::Subcommand;
use logship_core::config::Config;
use tracing::info;

use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display the effective configuration
    Show,
    /// Validate the configuration file
    Validate,
}

/// Outcome of checking a configuration file
#[derive(Debug, PartialEq)]
pub enum Validation {
    /// No file; defaults apply
    Missing,
    /// The file is not valid YAML for a [`Config`]
    Unparseable(String),
    /// Parsed; lists every field error, empty when valid
    Checked(Vec<String>),
}

/// Loads `path` strictly (no fallback to defaults) and validates it
pub fn check(path: &Path) -> Validation {
    match Config::load(path) {
        Ok(config) => Validation::Checked(
            config.validate().iter().map(|e| e.to_string()).collect(),
        ),
        Err(_) if !path.exists() => Validation::Missing,
        Err(e) => Validation::Unparseable(e.to_string()),
    }
}

impl ConfigCommand {
    pub async fn execute(&self, config_path: &Path, format: OutputFormat) -> Result<()> {
        match self {
            ConfigCommand::Show => self.execute_show(config_path, format),
            ConfigCommand::Validate => self.execute_validate(config_path, format),
        }
    }

    fn execute_show(&self, config_path: &Path, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(matches!(format, OutputFormat::Json));
        let config = Config::load_or_default(config_path);

        info!(config_path = %config_path.display(), "Showing configuration");

        if matches!(format, OutputFormat::Json) {
            let json = serde_json::to_value(&config)
                .context("Failed to serialize configuration to JSON")?;
            formatter.print_json(&json);
        } else {
            if config_path.exists() {
                formatter.success(&format!("Configuration ({})", config_path.display()));
            } else {
                formatter.success("Configuration (defaults)");
            }
            formatter.info("");
            print!("{}", config.to_yaml()?);
        }
        Ok(())
    }

    fn execute_validate(&self, config_path: &Path, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(matches!(format, OutputFormat::Json));

        info!(config_path = %config_path.display(), "Validating configuration");

        let (valid, errors) = match check(config_path) {
            Validation::Missing => (true, Vec::new()),
            Validation::Unparseable(e) => (false, vec![format!("Failed to parse configuration: {e}")]),
            Validation::Checked(errors) => (errors.is_empty(), errors),
        };

        if matches!(format, OutputFormat::Json) {
            formatter.print_json(&serde_json::json!({
                "valid": valid,
                "config_path": config_path.display().to_string(),
                "exists": config_path.exists(),
                "errors": errors,
            }));
        } else if !config_path.exists() {
            formatter.info(&format!(
                "Configuration file not found at {}",
                config_path.display()
            ));
            formatter.info("Using default configuration.");
        } else if valid {
            formatter.success("Configuration is valid");
            formatter.info(&format!("File: {}", config_path.display()));
        } else {
            formatter.error(&format!(
                "Configuration has {} error{}:",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" }
            ));
            formatter.info(&format!("File: {}", config_path.display()));
            formatter.info("");
            for error in &errors {
                formatter.info(&format!("  {}", error));
            }
        }

        Ok(())
    }
}
