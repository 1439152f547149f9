//! Port definitions (hexagonal architecture interfaces)
//!
//! Ports are the interfaces the pipeline depends on; their implementations
//! live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`ILogStore`] - Durable, partitioned storage of pending records (`logship-cache`)
//! - [`ISender`] - Batch transport to the collector (`logship-transport`)
//! - [`ILogSink`] - Record submission (`logship-pipeline`)
//! - [`Enable`] - Runtime enable/disable capability
//! - [`IModule`] - Startable producer module (lifecycle coordinator)

pub mod enable;
pub mod log_sink;
pub mod log_store;
pub mod module;
pub mod sender;

pub use enable::Enable;
pub use log_sink::{Enqueued, ILogSink};
pub use log_store::{ILogStore, PersistOutcome, PurgeScope, StoredRecord};
pub use module::IModule;
pub use sender::{Batch, BatchRecord, ISender, RecordRejection, SendResult};
