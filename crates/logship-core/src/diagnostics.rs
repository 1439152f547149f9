//! Diagnostic log bridge
//!
//! Process-wide hook through which the pipeline reports conditions a host
//! application may want to see: fatal transport errors, dropped records,
//! unknown crash reports. Detailed internal logging goes through `tracing`;
//! this module is the narrower, host-facing channel.
//!
//! - [`set_log_handler`] installs a handler, [`clear_log_handler`] removes it.
//!   Without a handler, diagnostics are forwarded to `tracing`.
//! - [`set_log_level`] filters by severity before anything is evaluated.
//! - The handler receives the message as a closure, so formatting only
//!   happens if the handler asks for it.
//! - [`log_from_wrapper`] is the entry point for non-Rust callers that bring
//!   their own source location.
//!
//! The handler may be invoked from any internal thread. It is cloned out of
//! the slot before being called, so a handler can itself replace or clear the
//! slot without deadlocking.

use std::fmt;
use std::panic::Location;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::domain::IngestionError;

/// Tag used by the channel state machine
pub const TAG_CHANNEL: &str = "logship.channel";
/// Tag used by the persistence store
pub const TAG_STORE: &str = "logship.store";
/// Tag used by the crash workflow
pub const TAG_CRASHES: &str = "logship.crashes";
/// Tag used by the module coordinator
pub const TAG_LIFECYCLE: &str = "logship.lifecycle";

// ============================================================================
// LogLevel
// ============================================================================

/// Severity of a diagnostic message. `None` disables all output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum LogLevel {
    Verbose = 2,
    Debug = 3,
    Info = 4,
    Warning = 5,
    Error = 6,
    Assert = 7,
    None = 99,
}

impl LogLevel {
    fn from_u8(raw: u8) -> Self {
        match raw {
            2 => LogLevel::Verbose,
            3 => LogLevel::Debug,
            4 => LogLevel::Info,
            5 => LogLevel::Warning,
            6 => LogLevel::Error,
            7 => LogLevel::Assert,
            _ => LogLevel::None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Verbose => "verbose",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
            LogLevel::Assert => "assert",
            LogLevel::None => "none",
        };
        f.write_str(s)
    }
}

impl FromStr for LogLevel {
    type Err = IngestionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "verbose" => Ok(LogLevel::Verbose),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warning" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            "assert" => Ok(LogLevel::Assert),
            "none" => Ok(LogLevel::None),
            other => Err(IngestionError::Configuration(format!(
                "unknown diagnostics level '{other}'"
            ))),
        }
    }
}

// ============================================================================
// Handler slot
// ============================================================================

/// Where a diagnostic message was emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation<'a> {
    pub file: &'a str,
    /// Empty when emitted from Rust code
    pub function: &'a str,
    pub line: u32,
}

/// Host-provided diagnostic handler: (lazy message, level, tag, location)
pub type LogHandler =
    Arc<dyn Fn(&dyn Fn() -> String, LogLevel, &str, &SourceLocation<'_>) + Send + Sync>;

static HANDLER: RwLock<Option<LogHandler>> = RwLock::new(None);
static LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Warning as u8);

/// Installs `handler`, replacing any previous one
pub fn set_log_handler(handler: LogHandler) {
    let mut slot = HANDLER.write().unwrap_or_else(|e| e.into_inner());
    *slot = Some(handler);
}

/// Removes the installed handler; diagnostics go back to `tracing`
pub fn clear_log_handler() {
    let mut slot = HANDLER.write().unwrap_or_else(|e| e.into_inner());
    *slot = None;
}

/// Sets the minimum level that is emitted
pub fn set_log_level(level: LogLevel) {
    LEVEL.store(level as u8, Ordering::Release);
}

/// The minimum level that is emitted
pub fn log_level() -> LogLevel {
    LogLevel::from_u8(LEVEL.load(Ordering::Acquire))
}

/// Whether a message at `level` would be emitted
pub fn is_enabled(level: LogLevel) -> bool {
    level != LogLevel::None && level >= log_level()
}

// ============================================================================
// Emission
// ============================================================================

/// Emits a diagnostic from Rust code; the caller's location is recorded
#[track_caller]
pub fn emit(level: LogLevel, tag: &str, message: impl Fn() -> String) {
    if !is_enabled(level) {
        return;
    }
    let caller = Location::caller();
    let location = SourceLocation {
        file: caller.file(),
        function: "",
        line: caller.line(),
    };
    dispatch(&message, level, tag, &location);
}

/// Entry point for wrapper SDKs that pass their own source location
pub fn log_from_wrapper(
    message: &str,
    tag: &str,
    level: LogLevel,
    file: &str,
    function: &str,
    line: u32,
) {
    if !is_enabled(level) {
        return;
    }
    let location = SourceLocation {
        file,
        function,
        line,
    };
    dispatch(&|| message.to_string(), level, tag, &location);
}

fn dispatch(message: &dyn Fn() -> String, level: LogLevel, tag: &str, location: &SourceLocation<'_>) {
    let handler = HANDLER
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .as_ref()
        .map(Arc::clone);

    match handler {
        Some(handler) => handler(message, level, tag, location),
        None => forward_to_tracing(message, level, tag, location),
    }
}

fn forward_to_tracing(
    message: &dyn Fn() -> String,
    level: LogLevel,
    tag: &str,
    location: &SourceLocation<'_>,
) {
    let file = location.file;
    let line = location.line;
    match level {
        LogLevel::Verbose => tracing::trace!(tag, file, line, "{}", message()),
        LogLevel::Debug => tracing::debug!(tag, file, line, "{}", message()),
        LogLevel::Info => tracing::info!(tag, file, line, "{}", message()),
        LogLevel::Warning => tracing::warn!(tag, file, line, "{}", message()),
        LogLevel::Error | LogLevel::Assert => tracing::error!(tag, file, line, "{}", message()),
        LogLevel::None => {}
    }
}
