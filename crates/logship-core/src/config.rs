//! Configuration module for LogShip.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::Priority;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for LogShip.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub channels: ChannelsConfig,
    pub retry: RetryConfig,
    pub transport: TransportConfig,
    pub crashes: CrashesConfig,
    pub logging: LoggingConfig,
}

/// Persistence store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the SQLite database holding pending records.
    pub database_path: PathBuf,
    /// Store-wide quota in bytes, shared by every priority partition.
    pub capacity_bytes: u64,
}

/// Batch thresholds for one priority channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Send as soon as this many records are pending.
    pub max_batch_count: usize,
    /// Send as soon as this many bytes are pending.
    pub max_batch_bytes: u64,
    /// Send once the oldest pending record has waited this long (ms).
    pub max_batch_latency_ms: u64,
}

impl ChannelConfig {
    pub fn max_batch_latency(&self) -> Duration {
        Duration::from_millis(self.max_batch_latency_ms)
    }
}

/// Per-priority channel settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelsConfig {
    pub high: ChannelConfig,
    pub default: ChannelConfig,
    pub background: ChannelConfig,
}

impl ChannelsConfig {
    /// Thresholds for the channel serving `priority`.
    pub fn for_priority(&self, priority: Priority) -> &ChannelConfig {
        match priority {
            Priority::High => &self.high,
            Priority::Default => &self.default,
            Priority::Background => &self.background,
        }
    }
}

/// Retry and backpressure settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Recoverable failures tolerated for one batch before the channel pauses.
    pub max_retries: u32,
    /// Delay before the first retry (ms); doubled on every further attempt.
    pub base_delay_ms: u64,
    /// Upper bound of a single retry delay (ms).
    pub max_delay_ms: u64,
    /// How long a channel paused by the transport stays paused (seconds).
    pub pause_cooldown_secs: u64,
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn pause_cooldown(&self) -> Duration {
        Duration::from_secs(self.pause_cooldown_secs)
    }
}

/// Collector connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Base URL of the collector; batches go to `{endpoint}/v1/logs`.
    pub endpoint: String,
    /// Application secret sent with every request. `None` until configured.
    pub app_secret: Option<String>,
    /// Installation id. Generated and stored next to the database when absent.
    pub install_id: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Maximum number of channels sending at the same time.
    pub max_parallel_senders: usize,
}

/// Crash report handling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrashesConfig {
    /// Directory where raw crash records and attachments are written.
    pub reports_dir: PathBuf,
    /// Whether captured reports are processed without host intervention.
    pub automatic_processing: bool,
    /// Hold reports in `PendingUserConfirmation` until the host decides.
    pub await_user_confirmation: bool,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Level of the host-facing diagnostics channel.
    pub diagnostics_level: String,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/logship/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("logship")
            .join("config.yaml")
    }

    /// Serialize back to YAML (used by `logship config show`).
    pub fn to_yaml(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("~/.local/share"))
        .join("logship")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: data_dir().join("logs.db"),
            capacity_bytes: 10 * 1024 * 1024,
        }
    }
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            high: ChannelConfig {
                max_batch_count: 10,
                max_batch_bytes: 256 * 1024,
                max_batch_latency_ms: 1_000,
            },
            default: ChannelConfig {
                max_batch_count: 50,
                max_batch_bytes: 512 * 1024,
                max_batch_latency_ms: 3_000,
            },
            background: ChannelConfig {
                max_batch_count: 100,
                max_batch_bytes: 1024 * 1024,
                max_batch_latency_ms: 10_000,
            },
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            pause_cooldown_secs: 60,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://in.logship.dev".to_string(),
            app_secret: None,
            install_id: None,
            timeout_secs: 30,
            max_parallel_senders: 1,
        }
    }
}

impl Default for CrashesConfig {
    fn default() -> Self {
        Self {
            reports_dir: data_dir().join("crashes"),
            automatic_processing: true,
            await_user_confirmation: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            diagnostics_level: "warning".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"retry.max_delay_ms"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Valid values for `logging.diagnostics_level`.
const VALID_DIAGNOSTICS_LEVELS: &[&str] = &[
    "verbose", "debug", "info", "warning", "error", "assert", "none",
];

fn positive(errors: &mut Vec<ValidationError>, field: &str, value: u64) {
    if value == 0 {
        errors.push(ValidationError {
            field: field.into(),
            message: "must be greater than 0".into(),
        });
    }
}

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- storage ---
        positive(&mut errors, "storage.capacity_bytes", self.storage.capacity_bytes);

        // --- channels ---
        for priority in Priority::DRAIN_ORDER {
            let channel = self.channels.for_priority(priority);
            let prefix = format!("channels.{}", priority.as_str());
            positive(
                &mut errors,
                &format!("{prefix}.max_batch_count"),
                channel.max_batch_count as u64,
            );
            positive(
                &mut errors,
                &format!("{prefix}.max_batch_bytes"),
                channel.max_batch_bytes,
            );
            positive(
                &mut errors,
                &format!("{prefix}.max_batch_latency_ms"),
                channel.max_batch_latency_ms,
            );
            if channel.max_batch_bytes > self.storage.capacity_bytes {
                errors.push(ValidationError {
                    field: format!("{prefix}.max_batch_bytes"),
                    message: format!(
                        "max_batch_bytes ({}) must not exceed storage.capacity_bytes ({})",
                        channel.max_batch_bytes, self.storage.capacity_bytes
                    ),
                });
            }
        }

        // --- retry ---
        positive(&mut errors, "retry.base_delay_ms", self.retry.base_delay_ms);
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            errors.push(ValidationError {
                field: "retry.max_delay_ms".into(),
                message: format!(
                    "max_delay_ms ({}) must not be below base_delay_ms ({})",
                    self.retry.max_delay_ms, self.retry.base_delay_ms
                ),
            });
        }
        positive(
            &mut errors,
            "retry.pause_cooldown_secs",
            self.retry.pause_cooldown_secs,
        );

        // --- transport ---
        if !(self.transport.endpoint.starts_with("http://")
            || self.transport.endpoint.starts_with("https://"))
        {
            errors.push(ValidationError {
                field: "transport.endpoint".into(),
                message: format!(
                    "must be an http(s) URL, got '{}'",
                    self.transport.endpoint
                ),
            });
        }
        positive(&mut errors, "transport.timeout_secs", self.transport.timeout_secs);
        if self.transport.max_parallel_senders == 0 || self.transport.max_parallel_senders > 3 {
            errors.push(ValidationError {
                field: "transport.max_parallel_senders".into(),
                message: "must be in range 1..=3".into(),
            });
        }
        if let Some(install_id) = &self.transport.install_id {
            if uuid::Uuid::parse_str(install_id).is_err() {
                errors.push(ValidationError {
                    field: "transport.install_id".into(),
                    message: format!("not a UUID: '{install_id}'"),
                });
            }
        }

        // --- crashes ---
        if self.crashes.await_user_confirmation && !self.crashes.automatic_processing {
            errors.push(ValidationError {
                field: "crashes.await_user_confirmation".into(),
                message: "requires crashes.automatic_processing".into(),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }
        if !VALID_DIAGNOSTICS_LEVELS.contains(&self.logging.diagnostics_level.as_str()) {
            errors.push(ValidationError {
                field: "logging.diagnostics_level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.diagnostics_level,
                    VALID_DIAGNOSTICS_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use logship_core::config::ConfigBuilder;
/// use std::path::PathBuf;
///
/// let config = ConfigBuilder::new()
///     .database_path(PathBuf::from("/var/lib/app/logs.db"))
///     .endpoint("https://collector.example.com")
///     .app_secret("secret")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- storage ---

    pub fn database_path(mut self, path: PathBuf) -> Self {
        self.config.storage.database_path = path;
        self
    }

    pub fn capacity_bytes(mut self, bytes: u64) -> Self {
        self.config.storage.capacity_bytes = bytes;
        self
    }

    // --- channels ---

    pub fn channel(mut self, priority: Priority, channel: ChannelConfig) -> Self {
        match priority {
            Priority::High => self.config.channels.high = channel,
            Priority::Default => self.config.channels.default = channel,
            Priority::Background => self.config.channels.background = channel,
        }
        self
    }

    // --- retry ---

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.retry.max_retries = n;
        self
    }

    pub fn retry_delays_ms(mut self, base: u64, max: u64) -> Self {
        self.config.retry.base_delay_ms = base;
        self.config.retry.max_delay_ms = max;
        self
    }

    pub fn pause_cooldown_secs(mut self, seconds: u64) -> Self {
        self.config.retry.pause_cooldown_secs = seconds;
        self
    }

    // --- transport ---

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.transport.endpoint = endpoint.into();
        self
    }

    pub fn app_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.transport.app_secret = Some(secret.into());
        self
    }

    pub fn install_id(mut self, install_id: impl Into<String>) -> Self {
        self.config.transport.install_id = Some(install_id.into());
        self
    }

    pub fn timeout_secs(mut self, seconds: u64) -> Self {
        self.config.transport.timeout_secs = seconds;
        self
    }

    pub fn max_parallel_senders(mut self, n: usize) -> Self {
        self.config.transport.max_parallel_senders = n;
        self
    }

    // --- crashes ---

    pub fn reports_dir(mut self, dir: PathBuf) -> Self {
        self.config.crashes.reports_dir = dir;
        self
    }

    pub fn automatic_processing(mut self, enabled: bool) -> Self {
        self.config.crashes.automatic_processing = enabled;
        self
    }

    pub fn await_user_confirmation(mut self, enabled: bool) -> Self {
        self.config.crashes.await_user_confirmation = enabled;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn diagnostics_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.diagnostics_level = level.into();
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
