//! Per-priority channel
//!
//! A [`Channel`] accepts records of one priority, persists them and runs a
//! background worker that turns pending records into batches for the sender.
//!
//! ## State machine
//!
//! ```text
//! Idle ──enqueue──▶ Batching ──trigger──▶ Sending ──success/fatal──▶ Idle
//!                                            │
//!                                            └─retries exhausted / paused──▶ Paused
//! ```
//!
//! A batch is triggered by whichever fires first: the count threshold, the
//! byte threshold, the latency since the oldest pending record, or an
//! explicit [`Channel::flush`]. Recoverable failures retry the same batch
//! with exponential backoff; fatal failures delete it.
//!
//! ## Counters
//!
//! The in-memory pending counters are hints used for trigger evaluation.
//! The store is the source of truth; [`Channel::refresh_pending`] resyncs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{Notify, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use logship_core::config::{ChannelConfig, RetryConfig};
use logship_core::diagnostics::{self, LogLevel, TAG_CHANNEL};
use logship_core::domain::{
    DeviceContext, IngestionError, Log, PersistencePolicy, Priority, RecordHandle, StoreError,
    TransportError,
};
use logship_core::ports::{
    Batch, BatchRecord, Enqueued, ILogStore, ISender, PurgeScope, RecordRejection, SendResult,
};

use crate::backoff::Backoff;
use crate::gate::{SendGate, SendPermit};
use crate::metrics::{batch_result, drop_reason, MetricsRegistry};

/// Observable state of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Nothing pending, or disabled
    Idle,
    /// Records pending, waiting for a trigger
    Batching,
    /// A batch is in flight or backing off
    Sending,
    /// Sending suspended; enqueue still persists
    Paused,
}

/// Why a channel is paused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseReason {
    /// [`Channel::pause`]; lasts until [`Channel::resume`]
    Explicit,
    /// The transport refused or kept failing; lifts itself at `until`
    Transport { until: Instant },
}

#[derive(Debug)]
struct ChannelShared {
    enabled: bool,
    pause: Option<PauseReason>,
    pending_count: u64,
    pending_bytes: u64,
    first_pending_at: Option<Instant>,
    flush_requested: bool,
    sending: bool,
    /// Cancelled and replaced by pause and disable to abort the in-flight send
    abort: CancellationToken,
}

impl ChannelShared {
    fn has_demand(&self) -> bool {
        self.enabled && self.pause.is_none() && self.pending_count > 0
    }

    fn abort_in_flight(&mut self) {
        self.abort.cancel();
        self.abort = CancellationToken::new();
    }
}

enum NextAction {
    Send,
    WaitUntil(Instant),
    Wait,
}

/// Everything a channel is built from
pub(crate) struct ChannelParts {
    pub priority: Priority,
    pub config: ChannelConfig,
    pub retry: RetryConfig,
    pub store: Arc<dyn ILogStore>,
    pub sender: Arc<dyn ISender>,
    pub gate: Arc<SendGate>,
    pub device: DeviceContext,
    pub metrics: Option<Arc<MetricsRegistry>>,
    pub cancel: CancellationToken,
}

/// One priority queue and its send worker
pub struct Channel {
    priority: Priority,
    config: ChannelConfig,
    backoff: Backoff,
    pause_cooldown: Duration,
    store: Arc<dyn ILogStore>,
    sender: Arc<dyn ISender>,
    gate: Arc<SendGate>,
    device: DeviceContext,
    metrics: Option<Arc<MetricsRegistry>>,
    shared: Mutex<ChannelShared>,
    /// Incremental counter updates hold the read side, a full refresh the write side
    counters: RwLock<()>,
    wake: Notify,
    cancel: CancellationToken,
}

impl Channel {
    pub(crate) fn new(parts: ChannelParts) -> Arc<Self> {
        Arc::new(Self {
            priority: parts.priority,
            config: parts.config,
            backoff: Backoff::from_config(&parts.retry),
            pause_cooldown: parts.retry.pause_cooldown(),
            store: parts.store,
            sender: parts.sender,
            gate: parts.gate,
            device: parts.device,
            metrics: parts.metrics,
            shared: Mutex::new(ChannelShared {
                enabled: true,
                pause: None,
                pending_count: 0,
                pending_bytes: 0,
                first_pending_at: None,
                flush_requested: false,
                sending: false,
                abort: CancellationToken::new(),
            }),
            counters: RwLock::new(()),
            wake: Notify::new(),
            cancel: parts.cancel,
        })
    }

    fn lock(&self) -> MutexGuard<'_, ChannelShared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publishes this channel's demand to the gate; called with the lock held
    fn sync_demand(&self, shared: &ChannelShared) {
        self.gate.set_demand(self.priority, shared.has_demand());
    }

    fn with_metrics(&self, f: impl FnOnce(&MetricsRegistry)) {
        if let Some(metrics) = &self.metrics {
            f(metrics);
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn state(&self) -> ChannelState {
        let shared = self.lock();
        if !shared.enabled {
            ChannelState::Idle
        } else if shared.pause.is_some() {
            ChannelState::Paused
        } else if shared.sending {
            ChannelState::Sending
        } else if shared.pending_count > 0 {
            ChannelState::Batching
        } else {
            ChannelState::Idle
        }
    }

    pub fn pause_reason(&self) -> Option<PauseReason> {
        self.lock().pause
    }

    pub fn is_enabled(&self) -> bool {
        self.lock().enabled
    }

    /// Pending records according to the in-memory counters
    pub fn pending_count(&self) -> u64 {
        self.lock().pending_count
    }

    /// True when nothing is pending and no send is in flight
    pub fn is_drained(&self) -> bool {
        let shared = self.lock();
        shared.pending_count == 0 && !shared.sending
    }

    // ========================================================================
    // Producer side
    // ========================================================================

    /// Validates and persists `log`, then lets the worker evaluate triggers.
    ///
    /// Never waits on the network. While paused the record is persisted but
    /// not sent; while disabled it is dropped.
    ///
    /// # Errors
    ///
    /// `InvalidContainer` for malformed records, `StorageFull` when the store
    /// refuses the record, `Storage` for backend failures.
    pub async fn enqueue(
        &self,
        log: &Log,
        policy: PersistencePolicy,
        group: &str,
    ) -> Result<Enqueued, IngestionError> {
        log.validate()?;

        // Checked under the read guard so a destructive disable, which holds
        // the write guard, cannot interleave with this persist
        let _counters = self.counters.read().await;
        if !self.is_enabled() {
            debug!(priority = %self.priority, group, "Channel disabled, dropping record");
            self.with_metrics(|m| m.record_dropped(self.priority, drop_reason::DISABLED, 1));
            return Ok(Enqueued::Dropped);
        }

        let outcome = match self.store.persist(log, self.priority, policy, group).await {
            Ok(outcome) => outcome,
            Err(e @ StoreError::StorageFull { .. }) => {
                self.with_metrics(|m| {
                    m.record_dropped(self.priority, drop_reason::STORAGE_FULL, 1)
                });
                diagnostics::emit(LogLevel::Warning, TAG_CHANNEL, || {
                    format!("{} channel: record dropped, {e}", self.priority)
                });
                return Err(e.into());
            }
            Err(e) => {
                error!(priority = %self.priority, error = %e, "Failed to persist record");
                return Err(e.into());
            }
        };

        {
            let mut shared = self.lock();
            shared.pending_count += 1;
            shared.pending_bytes += outcome.size_bytes;
            shared.first_pending_at.get_or_insert_with(Instant::now);
            self.sync_demand(&shared);
        }
        self.with_metrics(|m| m.record_enqueued(self.priority));
        self.wake.notify_one();

        Ok(Enqueued::Persisted {
            handle: outcome.handle,
            evicted: outcome.evicted,
        })
    }

    // ========================================================================
    // Control
    // ========================================================================

    /// Suspends sending and cancels the in-flight send, if any
    pub fn pause(&self) {
        let mut shared = self.lock();
        shared.pause = Some(PauseReason::Explicit);
        shared.abort_in_flight();
        self.sync_demand(&shared);
        info!(priority = %self.priority, "Channel paused");
    }

    /// Lifts any pause and re-evaluates triggers
    pub fn resume(&self) {
        {
            let mut shared = self.lock();
            if shared.pause.take().is_none() {
                return;
            }
            self.sync_demand(&shared);
        }
        info!(priority = %self.priority, "Channel resumed");
        self.wake.notify_one();
    }

    /// Sends pending records now, regardless of thresholds
    pub fn flush(&self) {
        self.lock().flush_requested = true;
        self.wake.notify_one();
    }

    /// Enables or disables the channel.
    ///
    /// Disabling forces the channel back to idle and aborts the in-flight
    /// send. With `delete_data` the whole partition is purged; otherwise the
    /// records wait for a later re-enable. Returns the number purged.
    pub async fn set_enabled(&self, enabled: bool, delete_data: bool) -> Result<u64, StoreError> {
        // Waits for in-flight enqueues; later ones see the new flag
        let _counters = self.counters.write().await;
        {
            let mut shared = self.lock();
            shared.enabled = enabled;
            if !enabled {
                shared.pause = None;
                shared.flush_requested = false;
                shared.abort_in_flight();
            }
            self.sync_demand(&shared);
        }

        let mut purged = 0;
        if !enabled && delete_data {
            purged = self
                .store
                .delete_all(PurgeScope::Priority(self.priority))
                .await?;
            self.reload_counters().await?;
        }

        info!(priority = %self.priority, enabled, delete_data, purged, "Channel enablement changed");
        if enabled {
            self.wake.notify_one();
        }
        Ok(purged)
    }

    /// Reloads the pending counters from the store
    pub async fn refresh_pending(&self) -> Result<u64, StoreError> {
        let _counters = self.counters.write().await;
        self.reload_counters().await
    }

    /// Caller holds the `counters` write guard
    async fn reload_counters(&self) -> Result<u64, StoreError> {
        let count = self.store.pending_count(self.priority).await?;
        let bytes = self.store.pending_bytes(self.priority).await?;
        {
            let mut shared = self.lock();
            shared.pending_count = count;
            shared.pending_bytes = bytes;
            if count == 0 {
                shared.first_pending_at = None;
            } else {
                shared.first_pending_at.get_or_insert_with(Instant::now);
            }
            self.sync_demand(&shared);
        }
        self.with_metrics(|m| m.set_pending(self.priority, count));
        self.wake.notify_one();
        Ok(count)
    }

    // ========================================================================
    // Worker
    // ========================================================================

    /// Worker loop; returns when the shutdown token is cancelled
    pub async fn run(self: Arc<Self>) {
        debug!(priority = %self.priority, "Channel worker started");
        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            match self.next_action() {
                NextAction::Send => self.send_cycle().await,
                NextAction::WaitUntil(deadline) => {
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = self.wake.notified() => {}
                        _ = tokio::time::sleep_until(deadline) => {}
                    }
                }
                NextAction::Wait => {
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = self.wake.notified() => {}
                    }
                }
            }
        }
        debug!(priority = %self.priority, "Channel worker stopped");
    }

    fn next_action(&self) -> NextAction {
        let now = Instant::now();
        let mut shared = self.lock();
        if !shared.enabled {
            return NextAction::Wait;
        }
        match shared.pause {
            Some(PauseReason::Explicit) => return NextAction::Wait,
            Some(PauseReason::Transport { until }) if now < until => {
                return NextAction::WaitUntil(until)
            }
            Some(PauseReason::Transport { .. }) => {
                shared.pause = None;
                self.sync_demand(&shared);
                info!(priority = %self.priority, "Pause cooldown elapsed, resuming");
            }
            None => {}
        }

        if shared.pending_count == 0 {
            shared.flush_requested = false;
            return NextAction::Wait;
        }
        if shared.flush_requested
            || shared.pending_count >= self.config.max_batch_count as u64
            || shared.pending_bytes >= self.config.max_batch_bytes
        {
            return NextAction::Send;
        }
        let first = *shared.first_pending_at.get_or_insert(now);
        let deadline = first + self.config.max_batch_latency();
        if now >= deadline {
            NextAction::Send
        } else {
            NextAction::WaitUntil(deadline)
        }
    }

    /// Marks the channel as sending if it still may send
    fn begin_send(&self) -> Option<CancellationToken> {
        let mut shared = self.lock();
        if !shared.enabled || shared.pause.is_some() {
            return None;
        }
        shared.sending = true;
        Some(shared.abort.clone())
    }

    fn end_send(&self) {
        self.lock().sending = false;
    }

    async fn send_cycle(&self) {
        let permit = tokio::select! {
            _ = self.cancel.cancelled() => return,
            permit = self.gate.acquire(self.priority) => permit,
        };
        let Some(abort) = self.begin_send() else {
            return;
        };

        self.send_pending(permit, &abort).await;

        self.end_send();
        self.with_metrics(|m| m.set_pending(self.priority, self.pending_count()));
    }

    async fn send_pending(&self, permit: SendPermit, abort: &CancellationToken) {
        let records = match self
            .store
            .load_batch(
                self.priority,
                self.config.max_batch_count,
                self.config.max_batch_bytes,
            )
            .await
        {
            Ok(records) => records,
            Err(e) => {
                error!(priority = %self.priority, error = %e, "Failed to load batch");
                drop(permit);
                self.idle_for(self.backoff.delay(0, None), abort).await;
                return;
            }
        };

        if records.is_empty() {
            // Counters drifted from the store
            drop(permit);
            if let Err(e) = self.refresh_pending().await {
                error!(priority = %self.priority, error = %e, "Failed to refresh pending counters");
            }
            return;
        }

        let sizes: HashMap<RecordHandle, u64> =
            records.iter().map(|r| (r.handle, r.size_bytes)).collect();
        let mut batch = Batch::new(
            self.priority,
            records
                .into_iter()
                .map(|r| {
                    let mut log = r.log;
                    if log.device.is_none() {
                        log.device = Some(self.device.clone());
                    }
                    BatchRecord {
                        handle: r.handle,
                        log,
                    }
                })
                .collect(),
        );

        let mut permit = Some(permit);
        let mut failures: u32 = 0;

        loop {
            debug!(
                priority = %self.priority,
                batch_id = %batch.id,
                count = batch.len(),
                attempt = failures,
                "Sending batch"
            );
            let started = Instant::now();
            let result = tokio::select! {
                _ = self.cancel.cancelled() => SendResult::Recoverable(TransportError::Cancelled),
                _ = abort.cancelled() => SendResult::Recoverable(TransportError::Cancelled),
                result = self.sender.send(&batch) => result,
            };
            let elapsed = started.elapsed().as_secs_f64();
            self.with_metrics(|m| m.observe_send_duration(self.priority, elapsed));

            let failure = match result {
                SendResult::Success => {
                    self.with_metrics(|m| m.record_batch(self.priority, batch_result::SUCCESS));
                    self.acknowledge(&batch.handles(), &sizes).await;
                    debug!(priority = %self.priority, batch_id = %batch.id, "Batch delivered");
                    return;
                }
                SendResult::Fatal(err) => {
                    self.with_metrics(|m| m.record_batch(self.priority, batch_result::FATAL));
                    self.report_fatal(&batch, batch.len(), &err);
                    self.acknowledge(&batch.handles(), &sizes).await;
                    return;
                }
                SendResult::Partial(rejections) => {
                    self.with_metrics(|m| m.record_batch(self.priority, batch_result::PARTIAL));
                    match self.settle_partial(&mut batch, rejections, &sizes).await {
                        Some(err) => err,
                        None => return,
                    }
                }
                SendResult::Recoverable(err) => {
                    self.with_metrics(|m| {
                        m.record_batch(self.priority, batch_result::RECOVERABLE)
                    });
                    err
                }
            };

            match failure {
                TransportError::Cancelled => {
                    debug!(priority = %self.priority, batch_id = %batch.id, "Send cancelled, releasing batch");
                    self.release(&batch).await;
                    return;
                }
                TransportError::ConnectionPaused => {
                    diagnostics::emit(LogLevel::Debug, TAG_CHANNEL, || {
                        format!("{} channel: connection paused", self.priority)
                    });
                    self.release(&batch).await;
                    self.pause_for_cooldown();
                    return;
                }
                _ => {}
            }

            failures += 1;
            if self.backoff.exhausted(failures) {
                warn!(
                    priority = %self.priority,
                    batch_id = %batch.id,
                    failures,
                    error = %failure,
                    "Retries exhausted, pausing channel"
                );
                self.release(&batch).await;
                self.pause_for_cooldown();
                return;
            }

            let delay = self.backoff.delay(failures - 1, failure.retry_after());
            debug!(
                priority = %self.priority,
                batch_id = %batch.id,
                error = %failure,
                delay_ms = delay.as_millis() as u64,
                "Recoverable send failure, backing off"
            );

            // Other channels may send while this one waits
            drop(permit.take());
            if !self.idle_for(delay, abort).await {
                self.release(&batch).await;
                return;
            }
            permit = tokio::select! {
                _ = self.cancel.cancelled() => None,
                _ = abort.cancelled() => None,
                permit = self.gate.acquire(self.priority) => Some(permit),
            };
            if permit.is_none() {
                self.release(&batch).await;
                return;
            }
        }
    }

    /// Sleeps unless cancelled; false when cancelled
    async fn idle_for(&self, delay: Duration, abort: &CancellationToken) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = abort.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    /// Deletes accepted and fatally rejected records of a mixed response and
    /// narrows `batch` to the recoverable remainder. Returns the error to
    /// retry with, or `None` when nothing is left to retry.
    async fn settle_partial(
        &self,
        batch: &mut Batch,
        rejections: Vec<RecordRejection>,
        sizes: &HashMap<RecordHandle, u64>,
    ) -> Option<TransportError> {
        let (retry, fatal): (Vec<_>, Vec<_>) = rejections
            .into_iter()
            .partition(|r| r.error.is_recoverable());
        let retry_handles: Vec<RecordHandle> = retry.iter().map(|r| r.handle).collect();

        if let Some(first) = fatal.first() {
            self.report_fatal(batch, fatal.len(), &first.error);
        }

        let settled: Vec<RecordHandle> = batch
            .handles()
            .into_iter()
            .filter(|h| !retry_handles.contains(h))
            .collect();
        self.acknowledge(&settled, sizes).await;

        debug!(
            priority = %self.priority,
            batch_id = %batch.id,
            settled = settled.len(),
            rejected = fatal.len(),
            retry = retry_handles.len(),
            "Partial batch result"
        );

        let first_retry = retry.into_iter().next()?;
        batch.retain_handles(&retry_handles);
        Some(first_retry.error)
    }

    fn report_fatal(&self, batch: &Batch, count: usize, err: &TransportError) {
        self.with_metrics(|m| m.record_dropped(self.priority, drop_reason::FATAL, count as u64));
        diagnostics::emit(LogLevel::Error, TAG_CHANNEL, || {
            format!(
                "{} channel: collector rejected {count} record(s) of batch {}: {err}",
                self.priority, batch.id
            )
        });
    }

    /// Deletes delivered (or dropped) records and updates the counters
    async fn acknowledge(&self, handles: &[RecordHandle], sizes: &HashMap<RecordHandle, u64>) {
        if handles.is_empty() {
            return;
        }
        let _counters = self.counters.read().await;
        if let Err(e) = self.store.delete_batch(handles).await {
            error!(priority = %self.priority, error = %e, "Failed to delete sent records");
            // Release the loans so the records are retried rather than stranded
            if let Err(e) = self.store.release_batch(handles).await {
                error!(priority = %self.priority, error = %e, "Failed to release records");
            }
            return;
        }

        let bytes: u64 = handles.iter().filter_map(|h| sizes.get(h)).sum();
        let mut shared = self.lock();
        shared.pending_count = shared.pending_count.saturating_sub(handles.len() as u64);
        shared.pending_bytes = shared.pending_bytes.saturating_sub(bytes);
        if shared.pending_count == 0 {
            shared.first_pending_at = None;
        }
        self.sync_demand(&shared);
    }

    async fn release(&self, batch: &Batch) {
        if let Err(e) = self.store.release_batch(&batch.handles()).await {
            error!(priority = %self.priority, batch_id = %batch.id, error = %e, "Failed to release batch");
        }
    }

    fn pause_for_cooldown(&self) {
        let mut shared = self.lock();
        if shared.pause == Some(PauseReason::Explicit) || !shared.enabled {
            return;
        }
        let until = Instant::now() + self.pause_cooldown;
        shared.pause = Some(PauseReason::Transport { until });
        self.sync_demand(&shared);
        info!(
            priority = %self.priority,
            cooldown_secs = self.pause_cooldown.as_secs(),
            "Channel paused by transport"
        );
    }
}
