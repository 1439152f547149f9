//! Channel group
//!
//! [`ChannelGroup`] owns the three priority channels, the shared send gate
//! and their workers. It is the pipeline's [`ILogSink`]: producers submit
//! records tagged with their module name (the *group*), and module-level
//! enablement is tracked here.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let group = ChannelGroup::builder(store, sender)
//!     .config(&config)
//!     .metrics(metrics)
//!     .build();
//! group.start().await?;
//! group
//!     .submit("analytics", Log::event("launch"), Priority::Default, PersistencePolicy::NORMAL)
//!     .await?;
//! group.shutdown().await;
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use dashmap::DashSet;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use logship_core::config::{ChannelsConfig, Config, RetryConfig};
use logship_core::domain::{
    DeviceContext, IngestionError, Log, PersistencePolicy, Priority, StoreError,
};
use logship_core::ports::{Enable, Enqueued, ILogSink, ILogStore, ISender, PurgeScope};

use crate::channel::{Channel, ChannelParts};
use crate::gate::SendGate;
use crate::metrics::{drop_reason, MetricsRegistry};

/// Poll interval of [`ChannelGroup::drain`]
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`ChannelGroup`]
pub struct ChannelGroupBuilder {
    store: Arc<dyn ILogStore>,
    sender: Arc<dyn ISender>,
    channels: ChannelsConfig,
    retry: RetryConfig,
    max_parallel_senders: usize,
    metrics: Option<Arc<MetricsRegistry>>,
    device: Option<DeviceContext>,
    cancel: Option<CancellationToken>,
}

impl ChannelGroupBuilder {
    pub fn new(store: Arc<dyn ILogStore>, sender: Arc<dyn ISender>) -> Self {
        let defaults = Config::default();
        Self {
            store,
            sender,
            channels: defaults.channels,
            retry: defaults.retry,
            max_parallel_senders: defaults.transport.max_parallel_senders,
            metrics: None,
            device: None,
            cancel: None,
        }
    }

    /// Takes channel, retry and parallelism settings from `config`
    pub fn config(mut self, config: &Config) -> Self {
        self.channels = config.channels.clone();
        self.retry = config.retry.clone();
        self.max_parallel_senders = config.transport.max_parallel_senders;
        self
    }

    pub fn channels(mut self, channels: ChannelsConfig) -> Self {
        self.channels = channels;
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn max_parallel_senders(mut self, n: usize) -> Self {
        self.max_parallel_senders = n;
        self
    }

    pub fn metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Device context attached to outgoing records; collected when unset
    pub fn device(mut self, device: DeviceContext) -> Self {
        self.device = Some(device);
        self
    }

    /// Shutdown token; a child of it is used when set
    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn build(self) -> Arc<ChannelGroup> {
        let gate = SendGate::new(self.max_parallel_senders);
        let cancel = self
            .cancel
            .map(|t| t.child_token())
            .unwrap_or_default();
        let device = self.device.unwrap_or_else(DeviceContext::collect);

        let make = |priority: Priority| {
            Channel::new(ChannelParts {
                priority,
                config: *self.channels.for_priority(priority),
                retry: self.retry.clone(),
                store: Arc::clone(&self.store),
                sender: Arc::clone(&self.sender),
                gate: Arc::clone(&gate),
                device: device.clone(),
                metrics: self.metrics.clone(),
                cancel: cancel.clone(),
            })
        };
        // Indexed by Priority::index
        let channels = [
            make(Priority::Background),
            make(Priority::Default),
            make(Priority::High),
        ];

        Arc::new(ChannelGroup {
            channels,
            store: self.store,
            gate,
            enabled: AtomicBool::new(true),
            disabled_groups: DashSet::new(),
            admission: RwLock::new(()),
            cancel,
            workers: Mutex::new(Vec::new()),
            metrics: self.metrics,
        })
    }
}

// ============================================================================
// ChannelGroup
// ============================================================================

/// The three priority channels behind one submission interface
pub struct ChannelGroup {
    channels: [Arc<Channel>; 3],
    store: Arc<dyn ILogStore>,
    gate: Arc<SendGate>,
    enabled: AtomicBool,
    disabled_groups: DashSet<String>,
    /// Submissions hold the read side; group enablement changes the write side
    admission: RwLock<()>,
    cancel: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl ChannelGroup {
    pub fn builder(store: Arc<dyn ILogStore>, sender: Arc<dyn ISender>) -> ChannelGroupBuilder {
        ChannelGroupBuilder::new(store, sender)
    }

    /// The channel serving `priority`
    pub fn channel(&self, priority: Priority) -> &Arc<Channel> {
        &self.channels[priority.index()]
    }

    pub fn store(&self) -> &Arc<dyn ILogStore> {
        &self.store
    }

    pub fn gate(&self) -> &Arc<SendGate> {
        &self.gate
    }

    pub fn metrics(&self) -> Option<&Arc<MetricsRegistry>> {
        self.metrics.as_ref()
    }

    /// Token cancelled by [`ChannelGroup::shutdown`]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_group_enabled(&self, group: &str) -> bool {
        !self.disabled_groups.contains(group)
    }

    /// Loads pending counters from the store and spawns one worker per
    /// channel. Records left over from a previous run are sent again.
    pub async fn start(&self) -> Result<(), StoreError> {
        for channel in &self.channels {
            let pending = channel.refresh_pending().await?;
            if pending > 0 {
                info!(priority = %channel.priority(), pending, "Recovered pending records");
            }
        }

        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        if !workers.is_empty() {
            debug!("Channel workers already running");
            return Ok(());
        }
        for channel in &self.channels {
            workers.push(tokio::spawn(Arc::clone(channel).run()));
        }
        info!(
            max_parallel_senders = self.gate.max_parallel(),
            "Channel group started"
        );
        Ok(())
    }

    /// Forces every channel to send what it has
    pub fn flush_all(&self) {
        for channel in &self.channels {
            channel.flush();
        }
    }

    /// Waits until every channel is drained. Returns false on timeout, e.g.
    /// when a channel is paused with records pending.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.channels.iter().all(|c| c.is_drained()) {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }
    }

    pub fn pause_all(&self) {
        for channel in &self.channels {
            channel.pause();
        }
    }

    /// Resumes channels highest priority first
    pub fn resume_all(&self) {
        for priority in Priority::DRAIN_ORDER {
            self.channel(priority).resume();
        }
    }

    /// Re-reads pending counters of every channel
    pub async fn refresh_all(&self) -> Result<(), StoreError> {
        for channel in &self.channels {
            channel.refresh_pending().await?;
        }
        Ok(())
    }

    async fn refresh_logged(&self) {
        if let Err(e) = self.refresh_all().await {
            error!(error = %e, "Failed to refresh pending counters");
        }
    }

    /// Stops the workers. An in-flight send is cancelled and its records
    /// stay persisted for the next run.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let workers: Vec<JoinHandle<()>> = {
            let mut guard = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
            guard.drain(..).collect()
        };
        for worker in workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "Channel worker ended abnormally");
            }
        }
        info!("Channel group stopped");
    }

    fn record_disabled_drop(&self, priority: Priority) {
        if let Some(metrics) = &self.metrics {
            metrics.record_dropped(priority, drop_reason::DISABLED, 1);
        }
    }
}

#[async_trait::async_trait]
impl ILogSink for ChannelGroup {
    async fn submit(
        &self,
        group: &str,
        log: Log,
        priority: Priority,
        policy: PersistencePolicy,
    ) -> Result<Enqueued, IngestionError> {
        log.validate()?;

        let _admission = self.admission.read().await;
        if !self.is_enabled() || self.disabled_groups.contains(group) {
            debug!(group, %priority, "Group disabled, dropping record");
            self.record_disabled_drop(priority);
            return Ok(Enqueued::Dropped);
        }

        let outcome = self.channel(priority).enqueue(&log, policy, group).await?;
        if let Enqueued::Persisted { evicted, .. } = outcome {
            if evicted > 0 {
                // Evicted records may belong to any partition
                self.refresh_logged().await;
            }
        }
        Ok(outcome)
    }

    async fn set_group_enabled(
        &self,
        group: &str,
        enabled: bool,
        delete_data: bool,
    ) -> Result<(), IngestionError> {
        // Submissions that already passed the group check finish first, so
        // the purge below sees their records
        let _admission = self.admission.write().await;
        if enabled {
            self.disabled_groups.remove(group);
        } else {
            self.disabled_groups.insert(group.to_string());
        }

        if !enabled && delete_data {
            let purged = self
                .store
                .delete_all(PurgeScope::Group(group.to_string()))
                .await?;
            info!(group, purged, "Group data deleted");
        }
        self.store.set_group_held(group, !enabled).await?;
        self.refresh_all().await?;

        info!(group, enabled, delete_data, "Group enablement changed");
        Ok(())
    }
}

#[async_trait::async_trait]
impl Enable for ChannelGroup {
    async fn set_enabled(&self, enabled: bool, delete_data: bool) -> anyhow::Result<()> {
        self.enabled.store(enabled, Ordering::Release);
        for priority in Priority::DRAIN_ORDER {
            self.channel(priority)
                .set_enabled(enabled, delete_data)
                .await?;
        }
        info!(enabled, delete_data, "Pipeline enablement changed");
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }
}
