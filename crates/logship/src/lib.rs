//! logship - Durable telemetry ingestion and delivery
//!
//! The runtime facade of the workspace. It assembles the pieces provided by
//! the other crates:
//!
//! - `logship-cache` stores pending records in SQLite
//! - `logship-pipeline` batches them per priority and drives the sender
//! - `logship-transport` posts batches to the collector
//! - `logship-crashes` captures crashes and processes crash reports
//!
//! and adds the [`ModuleCoordinator`] (start order, enable fan-out), the
//! [`ProducerModule`] submission handle and the [`LogShip`] runtime.
//!
//! ```no_run
//! use logship::{LogShip, DEFAULT_DRAIN_TIMEOUT};
//! use logship_core::config::Config;
//! use logship_core::domain::InitializationPriority;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::load_or_default(&Config::default_path());
//! let logship = LogShip::builder(config).build().await?;
//! let analytics = logship.add_module("analytics", InitializationPriority::Default)?;
//! logship.start().await?;
//!
//! analytics.track_event("app_opened", Default::default()).await?;
//!
//! logship.shutdown(DEFAULT_DRAIN_TIMEOUT).await;
//! # Ok(())
//! # }
//! ```

pub mod coordinator;
pub mod producer;
pub mod runtime;

pub use coordinator::{LifecycleError, ModuleCoordinator};
pub use producer::ProducerModule;
pub use runtime::{LogShip, LogShipBuilder, DEFAULT_DRAIN_TIMEOUT};

pub use logship_core::diagnostics;
