//! Enable capability
//!
//! Implemented by every component that can be switched on and off at runtime:
//! producer modules, the crashes module and the channel group. The lifecycle
//! coordinator holds a collection of this capability, not concrete types.

/// Runtime on/off switch with optional destruction of buffered data
#[async_trait::async_trait]
pub trait Enable: Send + Sync {
    /// Enables or disables the component. When disabling with `delete_data`,
    /// everything it has buffered is purged irreversibly; otherwise buffered
    /// data stays for a later re-enable.
    async fn set_enabled(&self, enabled: bool, delete_data: bool) -> anyhow::Result<()>;

    /// Current state
    fn is_enabled(&self) -> bool;
}
