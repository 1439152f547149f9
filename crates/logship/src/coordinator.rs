//! Module lifecycle coordinator
//!
//! Holds a non-owning registry of modules, starts them once in descending
//! [`InitializationPriority`] and fans enable/disable out in the same order.
//! Modules dropped by their owner simply disappear from the registry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use thiserror::Error;
use tracing::{debug, info, warn};

use logship_core::diagnostics::{self, LogLevel, TAG_LIFECYCLE};
use logship_core::domain::InitializationPriority;
use logship_core::ports::IModule;

/// Errors detected by the coordinator
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// Two modules claim the crash-capture slot
    #[error("Modules '{first}' and '{second}' both declare Max initialization priority")]
    DuplicateMaxPriority { first: String, second: String },

    /// A module with the same name is already registered
    #[error("Module '{0}' is already registered")]
    DuplicateName(String),

    /// `start_all` was called twice
    #[error("Modules have already been started")]
    AlreadyStarted,
}

/// Registry of modules and their start order
#[derive(Default)]
pub struct ModuleCoordinator {
    modules: Mutex<Vec<Weak<dyn IModule>>>,
    started: AtomicBool,
}

impl ModuleCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `module` to the registry without taking ownership of it
    pub fn register(&self, module: Arc<dyn IModule>) -> Result<(), LifecycleError> {
        let mut modules = self.modules.lock().unwrap_or_else(PoisonError::into_inner);
        modules.retain(|m| m.strong_count() > 0);

        let name = module.name();
        let taken = modules
            .iter()
            .filter_map(Weak::upgrade)
            .any(|m| m.name() == name);
        if taken {
            return Err(LifecycleError::DuplicateName(name.to_string()));
        }

        debug!(module = name, priority = %module.initialization_priority(), "Module registered");
        modules.push(Arc::downgrade(&module));
        Ok(())
    }

    /// Live modules, highest initialization priority first; registration
    /// order breaks ties
    pub fn modules(&self) -> Vec<Arc<dyn IModule>> {
        let mut live: Vec<Arc<dyn IModule>> = self
            .modules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter_map(Weak::upgrade)
            .collect();
        live.sort_by(|a, b| b.initialization_priority().cmp(&a.initialization_priority()));
        live
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Rejects a registry with more than one `Max` module
    pub fn validate(&self) -> Result<(), LifecycleError> {
        let max: Vec<_> = self
            .modules()
            .into_iter()
            .filter(|m| m.initialization_priority() == InitializationPriority::Max)
            .collect();
        if let [first, second, ..] = max.as_slice() {
            return Err(LifecycleError::DuplicateMaxPriority {
                first: first.name().to_string(),
                second: second.name().to_string(),
            });
        }
        Ok(())
    }

    /// Validates the registry, then starts every module in order.
    ///
    /// A module that fails to start is reported through the diagnostics
    /// handler and skipped; the others still start. Returns the names of the
    /// modules that started.
    pub async fn start_all(&self) -> Result<Vec<String>, LifecycleError> {
        self.validate()?;
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(LifecycleError::AlreadyStarted);
        }

        let mut started = Vec::new();
        for module in self.modules() {
            let name = module.name().to_string();
            match module.start().await {
                Ok(()) => {
                    debug!(module = %name, "Module started");
                    started.push(name);
                }
                Err(e) => {
                    warn!(module = %name, error = %e, "Module failed to start");
                    diagnostics::emit(LogLevel::Error, TAG_LIFECYCLE, || {
                        format!("Module '{name}' failed to start: {e:#}")
                    });
                }
            }
        }
        info!(count = started.len(), "Modules started");
        Ok(started)
    }

    /// Enables or disables every module, in start order. Every module is
    /// visited; the first failure is returned.
    pub async fn set_enabled(&self, enabled: bool, delete_data: bool) -> anyhow::Result<()> {
        let mut first_error = None;
        for module in self.modules() {
            if let Err(e) = module.set_enabled(enabled, delete_data).await {
                warn!(module = module.name(), error = %e, "Failed to switch module");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Whether every live module is enabled
    pub fn all_enabled(&self) -> bool {
        self.modules().iter().all(|m| m.is_enabled())
    }
}
