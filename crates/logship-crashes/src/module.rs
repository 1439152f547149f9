//! Crashes module
//!
//! The crash-capture module starts before every other module
//! (`InitializationPriority::Max`), so the panic hook is armed before any
//! other producer can emit. Starting it also runs the startup scan.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use logship_core::config::CrashesConfig;
use logship_core::domain::InitializationPriority;
use logship_core::ports::{Enable, ILogSink, IModule};

use crate::capture::install_crash_reporter;
use crate::delegate::{CrashHandlerSetupDelegate, DelegateSlot};
use crate::store::CrashReportStore;
use crate::workflow::{CrashWorkflow, CRASHES_GROUP};

/// Crash capture and crash report processing as a lifecycle module
pub struct CrashesModule {
    workflow: Arc<CrashWorkflow>,
    sink: Arc<dyn ILogSink>,
    reports_dir: PathBuf,
    delegate: DelegateSlot,
    install_panic_hook: bool,
    enabled: AtomicBool,
    started: AtomicBool,
}

impl CrashesModule {
    pub fn new(sink: Arc<dyn ILogSink>, config: &CrashesConfig) -> Self {
        let store = CrashReportStore::new(config.reports_dir.clone());
        let workflow = Arc::new(CrashWorkflow::new(store, Arc::clone(&sink), config));
        Self {
            workflow,
            sink,
            reports_dir: config.reports_dir.clone(),
            delegate: DelegateSlot::new(),
            install_panic_hook: true,
            enabled: AtomicBool::new(true),
            started: AtomicBool::new(false),
        }
    }

    /// Leaves the process panic hook untouched on start
    pub fn without_panic_hook(mut self) -> Self {
        self.install_panic_hook = false;
        self
    }

    pub fn workflow(&self) -> &Arc<CrashWorkflow> {
        &self.workflow
    }

    /// Replaces the crash handler setup delegate; `None` clears it
    pub fn set_crash_handler_setup_delegate(
        &self,
        delegate: Option<Arc<dyn CrashHandlerSetupDelegate>>,
    ) {
        self.delegate.set(delegate);
    }

    fn set_up_crash_handlers(&self) {
        let delegate = self.delegate.get();
        if let Some(d) = &delegate {
            d.will_set_up_crash_handlers();
        }

        let install = self.install_panic_hook
            && delegate.as_ref().map_or(true, |d| d.should_install_panic_hook());
        if install {
            install_crash_reporter(self.reports_dir.clone());
            info!(dir = %self.reports_dir.display(), "Crash reporter installed");
        }

        if let Some(d) = &delegate {
            d.did_set_up_crash_handlers();
        }
    }
}

#[async_trait::async_trait]
impl IModule for CrashesModule {
    fn name(&self) -> &str {
        CRASHES_GROUP
    }

    fn initialization_priority(&self) -> InitializationPriority {
        InitializationPriority::Max
    }

    async fn start(&self) -> anyhow::Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.set_up_crash_handlers();

        if !self.is_enabled() {
            self.workflow.skip_startup_scan();
            return Ok(());
        }
        let captured = self.workflow.process_startup_crashes().await?;
        info!(captured, "Crashes module started");
        Ok(())
    }
}

#[async_trait::async_trait]
impl Enable for CrashesModule {
    async fn set_enabled(&self, enabled: bool, delete_data: bool) -> anyhow::Result<()> {
        let was_enabled = self.enabled.swap(enabled, Ordering::SeqCst);
        self.sink
            .set_group_enabled(CRASHES_GROUP, enabled, delete_data)
            .await?;

        if !enabled && delete_data {
            let discarded = self.workflow.discard_all();
            info!(discarded, "Crash reports purged");
        }

        // Crash files written while disabled are picked up on re-enable
        if enabled && !was_enabled && self.started.load(Ordering::SeqCst) {
            if let Err(e) = self.workflow.process_startup_crashes().await {
                warn!(error = %e, "Crash scan after re-enable failed");
            }
        }
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}
