//! Crash handler setup delegate
//!
//! Lets the host application observe, or veto, installation of the panic
//! hook. The slot holds at most one delegate; setting a new one replaces the
//! previous one.

use std::sync::{Arc, RwLock};

/// Callbacks around crash handler installation
pub trait CrashHandlerSetupDelegate: Send + Sync {
    /// Called before the panic hook is installed
    fn will_set_up_crash_handlers(&self) {}

    /// Returning `false` skips installing the panic hook
    fn should_install_panic_hook(&self) -> bool {
        true
    }

    /// Called after installation, whether or not the hook was installed
    fn did_set_up_crash_handlers(&self) {}
}

/// Single-slot, last-write-wins delegate holder
#[derive(Default)]
pub struct DelegateSlot {
    slot: RwLock<Option<Arc<dyn CrashHandlerSetupDelegate>>>,
}

impl DelegateSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the current delegate; `None` clears the slot
    pub fn set(&self, delegate: Option<Arc<dyn CrashHandlerSetupDelegate>>) {
        let mut slot = self.slot.write().unwrap_or_else(|e| e.into_inner());
        *slot = delegate;
    }

    /// The current delegate, if any
    pub fn get(&self) -> Option<Arc<dyn CrashHandlerSetupDelegate>> {
        self.slot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(Arc::clone)
    }
}
