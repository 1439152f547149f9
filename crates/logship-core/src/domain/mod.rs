//! Domain entities
//!
//! This module contains the core domain types of the pipeline:
//! - The log model (`Log`, `LogKind` and the kind payloads)
//! - Priorities, initialization priorities and persistence policies
//! - Identifiers (`RecordHandle`, `IncidentId`, `SessionId`, `EventId`)
//! - Device context attached to outgoing logs
//! - Crash report types
//! - Error types

pub mod crash;
pub mod device;
pub mod errors;
pub mod log;
pub mod newtypes;
pub mod priority;

// Re-export commonly used types
pub use crash::{CrashState, ErrorReport};
pub use device::DeviceContext;
pub use errors::{IngestionError, StoreError, TransportError};
pub use log::{
    CrashLog, ErrorAttachmentLog, EventLog, Log, LogKind, Properties, PropertiesLog,
    TypedProperty, TypedValue,
};
pub use newtypes::*;
pub use priority::{InitializationPriority, PersistencePolicy, Priority};
