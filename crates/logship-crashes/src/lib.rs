//! logship Crashes - Crash capture and crash report processing
//!
//! Provides:
//! - `install_crash_reporter`: panic hook writing raw crash records
//! - `CrashReportStore`: the directory of raw crash records
//! - `CrashWorkflow`: the crash report state machine (capture, decision,
//!   user confirmation, sending, attachments)
//! - `CrashesModule`: the `Max`-priority lifecycle module wrapping them

pub mod capture;
pub mod delegate;
pub mod error;
pub mod module;
pub mod store;
pub mod workflow;

pub use capture::{install_crash_reporter, CrashRecord};
pub use delegate::CrashHandlerSetupDelegate;
pub use error::CrashError;
pub use module::CrashesModule;
pub use store::{CrashFileEntry, CrashReportStore};
pub use workflow::{CrashWorkflow, UserConfirmation, CRASHES_GROUP};
