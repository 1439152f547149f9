//! Crash capture boundary
//!
//! A panic hook writes a raw [`CrashRecord`] to the crash reports directory.
//! Nothing is processed in the crashing process; the workflow picks the
//! file up on the next start.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use logship_core::domain::{ErrorReport, IncidentId};

use crate::store::CrashReportStore;

/// Raw crash record as written by the panic hook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrashRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Version of the crashing binary
    pub version: String,
    pub process: String,
    #[serde(default)]
    pub thread: String,
    pub message: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub backtrace: String,
}

impl CrashRecord {
    /// Creates a record for a crash happening now
    pub fn new(process: &str, message: &str, location: &str, backtrace: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            process: process.to_string(),
            thread: std::thread::current()
                .name()
                .unwrap_or("<unnamed>")
                .to_string(),
            message: message.to_string(),
            location: location.to_string(),
            backtrace: backtrace.to_string(),
        }
    }

    /// Incident identifier of the report built from this record
    pub fn incident_id(&self) -> IncidentId {
        IncidentId::from_uuid(self.id)
    }

    /// Builds the in-memory report detected at `captured_at`
    pub fn to_report(&self, captured_at: DateTime<Utc>) -> ErrorReport {
        ErrorReport {
            incident_identifier: self.incident_id(),
            crash_time: self.timestamp,
            captured_at,
            process: self.process.clone(),
            message: self.message.clone(),
            location: self.location.clone(),
            backtrace: self.backtrace.clone(),
            attachments: Vec::new(),
        }
    }
}

/// Name of the running executable, used as the crash's process name
fn process_name() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Installs a panic hook that saves a crash record to `reports_dir`.
///
/// Chains with the existing panic hook so default behavior (stderr output)
/// is preserved.
pub fn install_crash_reporter(reports_dir: PathBuf) {
    let store = CrashReportStore::new(reports_dir);
    let process = process_name();
    let previous_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info| {
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_default();

        let backtrace = std::backtrace::Backtrace::force_capture().to_string();

        let record = CrashRecord::new(&process, &message, &location, &backtrace);
        if let Err(e) = store.save(&record) {
            eprintln!("Failed to save crash record: {e}");
        }

        previous_hook(panic_info);
    }));
}
