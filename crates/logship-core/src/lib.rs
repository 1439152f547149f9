//! logship Core - Domain model, ports and configuration
//!
//! This crate is the hexagonal core of the telemetry pipeline:
//! - **Domain** - `Log` records (plain, with properties, events, crash and
//!   attachment logs), `Priority`, `PersistencePolicy`, identifiers, `DeviceContext`,
//!   crash report types and the error taxonomy
//! - **Ports** - Traits implemented by adapter crates: `ILogStore` (durable storage),
//!   `ISender` (transport), `ILogSink` (submission) and the `Enable` capability
//! - **Config** - YAML configuration with validation and a builder
//! - **Diagnostics** - Process-wide diagnostic log handler and wrapper entry point
//!
//! # Architecture
//!
//! The domain module has no I/O. Ports describe what the pipeline needs from
//! storage and transport; `logship-cache` and `logship-transport` provide them.

pub mod config;
pub mod diagnostics;
pub mod domain;
pub mod ports;
