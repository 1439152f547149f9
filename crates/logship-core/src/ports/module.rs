//! Module port
//!
//! A module is a producer of logs with its own lifecycle: it is started once
//! by the lifecycle coordinator, in descending [`InitializationPriority`], and
//! can be switched on and off through the [`Enable`] capability afterwards.

use crate::domain::InitializationPriority;

use super::enable::Enable;

/// A startable, switchable producer module
#[async_trait::async_trait]
pub trait IModule: Enable {
    /// Module name; also the group its records are tagged with
    fn name(&self) -> &str;

    /// Start-up ordering; `Max` is reserved for crash capture
    fn initialization_priority(&self) -> InitializationPriority;

    /// Called exactly once, before any module of lower priority starts
    async fn start(&self) -> anyhow::Result<()>;
}
