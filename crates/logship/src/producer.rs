//! Producer modules
//!
//! A [`ProducerModule`] is the submission handle of one named module
//! (analytics, a feature's own telemetry). Its records are tagged with the
//! module name, so disabling the module affects only them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use logship_core::diagnostics::{self, LogLevel, TAG_LIFECYCLE};
use logship_core::domain::{
    IngestionError, InitializationPriority, Log, PersistencePolicy, Priority, Properties,
    SessionId,
};
use logship_core::ports::{Enable, Enqueued, ILogSink, IModule};

/// A named module that submits logs through the pipeline
pub struct ProducerModule {
    name: String,
    initialization_priority: InitializationPriority,
    sink: Arc<dyn ILogSink>,
    session: SessionId,
    enabled: AtomicBool,
    started: AtomicBool,
}

impl ProducerModule {
    pub fn new(name: impl Into<String>, sink: Arc<dyn ILogSink>, session: SessionId) -> Self {
        Self {
            name: name.into(),
            initialization_priority: InitializationPriority::Default,
            sink,
            session,
            enabled: AtomicBool::new(true),
            started: AtomicBool::new(false),
        }
    }

    pub fn with_initialization_priority(mut self, priority: InitializationPriority) -> Self {
        self.initialization_priority = priority;
        self
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Submits `log`, stamping the session id when it has none.
    ///
    /// # Errors
    ///
    /// `IngestionError::Configuration` before the module has been started;
    /// otherwise whatever the pipeline returns synchronously
    /// (`InvalidContainer`, `StorageFull`).
    pub async fn track(
        &self,
        mut log: Log,
        priority: Priority,
        policy: PersistencePolicy,
    ) -> Result<Enqueued, IngestionError> {
        if !self.is_started() {
            diagnostics::emit(LogLevel::Error, TAG_LIFECYCLE, || {
                format!("Module '{}' used before it was started", self.name)
            });
            return Err(IngestionError::Configuration(format!(
                "module '{}' is not started",
                self.name
            )));
        }
        if !self.is_enabled() {
            debug!(module = %self.name, "Module disabled, dropping log");
            return Ok(Enqueued::Dropped);
        }

        if log.sid.is_none() {
            log.sid = Some(self.session);
        }
        self.sink.submit(&self.name, log, priority, policy).await
    }

    /// Submits a named event with string properties at `Default` priority
    pub async fn track_event(
        &self,
        name: &str,
        properties: Properties,
    ) -> Result<Enqueued, IngestionError> {
        let mut log = Log::event(name);
        for (key, value) in properties {
            log = log.with_property(key, value);
        }
        self.track(log, Priority::Default, PersistencePolicy::NORMAL)
            .await
    }
}

#[async_trait::async_trait]
impl IModule for ProducerModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialization_priority(&self) -> InitializationPriority {
        self.initialization_priority
    }

    async fn start(&self) -> anyhow::Result<()> {
        if !self.started.swap(true, Ordering::SeqCst) {
            info!(module = %self.name, "Producer module started");
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Enable for ProducerModule {
    async fn set_enabled(&self, enabled: bool, delete_data: bool) -> anyhow::Result<()> {
        self.enabled.store(enabled, Ordering::SeqCst);
        self.sink
            .set_group_enabled(&self.name, enabled, delete_data)
            .await?;
        info!(module = %self.name, enabled, delete_data, "Module switched");
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}
