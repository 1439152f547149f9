//! Shared test helpers for pipeline integration tests
//!
//! Provides a scripted [`RecordingSender`] and a harness that wires it to a
//! fresh in-memory store and channel group.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;

use logship_cache::{DatabasePool, SqliteLogStore};
use logship_core::config::{ChannelConfig, ChannelsConfig, RetryConfig};
use logship_core::domain::{
    IncidentId, Log, LogKind, PersistencePolicy, Priority, RecordHandle, StoreError,
};
use logship_core::ports::{
    Batch, ILogSink, ILogStore, ISender, PersistOutcome, PurgeScope, SendResult, StoredRecord,
};
use logship_pipeline::{ChannelGroup, MetricsRegistry};

// ============================================================================
// RecordingSender
// ============================================================================

/// Sender double: answers from a script (then `Success`) and records every
/// attempt together with the answer it gave.
#[derive(Default)]
pub struct RecordingSender {
    script: Mutex<VecDeque<SendResult>>,
    attempts: Mutex<Vec<(Batch, SendResult)>>,
    /// While set, sends never complete
    hang: AtomicBool,
    hung: AtomicUsize,
    /// When set, the next send waits for a notification before answering
    hold: Mutex<Option<Arc<Notify>>>,
}

impl RecordingSender {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, results: impl IntoIterator<Item = SendResult>) {
        self.script.lock().unwrap().extend(results);
    }

    pub fn set_hang(&self, hang: bool) {
        self.hang.store(hang, Ordering::SeqCst);
    }

    /// Sends that started while hanging
    pub fn hung(&self) -> usize {
        self.hung.load(Ordering::SeqCst)
    }

    /// Makes the next send wait until the returned notify fires
    pub fn hold_next(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.hold.lock().unwrap() = Some(Arc::clone(&notify));
        notify
    }

    pub fn attempts(&self) -> Vec<(Batch, SendResult)> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }

    /// Event names of records in batches answered with `Success`, in send order
    pub fn delivered(&self) -> Vec<String> {
        self.attempts
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, result)| result.is_success())
            .flat_map(|(batch, _)| names(batch))
            .collect()
    }

    /// Priorities of every attempted batch, in send order
    pub fn priorities(&self) -> Vec<Priority> {
        self.attempts
            .lock()
            .unwrap()
            .iter()
            .map(|(batch, _)| batch.priority)
            .collect()
    }
}

#[async_trait::async_trait]
impl ISender for RecordingSender {
    async fn send(&self, batch: &Batch) -> SendResult {
        if self.hang.load(Ordering::SeqCst) {
            self.hung.fetch_add(1, Ordering::SeqCst);
            std::future::pending::<()>().await;
        }

        let hold = self.hold.lock().unwrap().take();
        let result = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(SendResult::Success);
        self.attempts
            .lock()
            .unwrap()
            .push((batch.clone(), result.clone()));

        if let Some(notify) = hold {
            notify.notified().await;
        }
        result
    }
}

// ============================================================================
// SlowStore
// ============================================================================

/// Store wrapper whose `persist` takes `delay`, so a control call can land
/// while a submission is still writing
pub struct SlowStore {
    pub inner: Arc<SqliteLogStore>,
    delay: Duration,
    persists_started: AtomicUsize,
}

impl SlowStore {
    pub async fn new(delay: Duration) -> Arc<Self> {
        let pool = DatabasePool::in_memory()
            .await
            .expect("Failed to create in-memory database");
        let inner = SqliteLogStore::new(pool.pool().clone(), 1024 * 1024)
            .await
            .expect("Failed to create store");
        Arc::new(Self {
            inner: Arc::new(inner),
            delay,
            persists_started: AtomicUsize::new(0),
        })
    }

    pub fn persists_started(&self) -> usize {
        self.persists_started.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ILogStore for SlowStore {
    async fn persist(
        &self,
        log: &Log,
        priority: Priority,
        policy: PersistencePolicy,
        group: &str,
    ) -> Result<PersistOutcome, StoreError> {
        self.persists_started.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.inner.persist(log, priority, policy, group).await
    }

    async fn load_batch(
        &self,
        priority: Priority,
        max_count: usize,
        max_bytes: u64,
    ) -> Result<Vec<StoredRecord>, StoreError> {
        self.inner.load_batch(priority, max_count, max_bytes).await
    }

    async fn release_batch(&self, handles: &[RecordHandle]) -> Result<(), StoreError> {
        self.inner.release_batch(handles).await
    }

    async fn delete_batch(&self, handles: &[RecordHandle]) -> Result<u64, StoreError> {
        self.inner.delete_batch(handles).await
    }

    async fn delete_all(&self, scope: PurgeScope) -> Result<u64, StoreError> {
        self.inner.delete_all(scope).await
    }

    async fn set_group_held(&self, group: &str, held: bool) -> Result<(), StoreError> {
        self.inner.set_group_held(group, held).await
    }

    async fn pending_count(&self, priority: Priority) -> Result<u64, StoreError> {
        self.inner.pending_count(priority).await
    }

    async fn pending_bytes(&self, priority: Priority) -> Result<u64, StoreError> {
        self.inner.pending_bytes(priority).await
    }

    async fn pending_count_for_group(&self, group: &str) -> Result<u64, StoreError> {
        self.inner.pending_count_for_group(group).await
    }

    async fn records_for_incident(
        &self,
        incident_id: IncidentId,
    ) -> Result<Vec<StoredRecord>, StoreError> {
        self.inner.records_for_incident(incident_id).await
    }

    async fn used_bytes(&self) -> Result<u64, StoreError> {
        self.inner.used_bytes().await
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub group: Arc<ChannelGroup>,
    pub store: Arc<SqliteLogStore>,
    pub sender: Arc<RecordingSender>,
    pub metrics: Arc<MetricsRegistry>,
}

impl Harness {
    /// Submits an event named `name`
    pub async fn submit(&self, group: &str, name: &str, priority: Priority) -> RecordHandle {
        self.group
            .submit(group, event(name), priority, PersistencePolicy::NORMAL)
            .await
            .expect("submit")
            .handle()
            .expect("persisted")
    }
}

pub async fn harness(channels: ChannelsConfig, retry: RetryConfig) -> Harness {
    harness_with_capacity(channels, retry, 1024 * 1024).await
}

pub async fn harness_with_capacity(
    channels: ChannelsConfig,
    retry: RetryConfig,
    capacity: u64,
) -> Harness {
    let pool = DatabasePool::in_memory()
        .await
        .expect("Failed to create in-memory database");
    let store = Arc::new(
        SqliteLogStore::new(pool.pool().clone(), capacity)
            .await
            .expect("Failed to create store"),
    );
    let sender = RecordingSender::new();
    let metrics = Arc::new(MetricsRegistry::new().expect("metrics"));

    let group = ChannelGroup::builder(store.clone(), sender.clone())
        .channels(channels)
        .retry(retry)
        .max_parallel_senders(1)
        .metrics(Arc::clone(&metrics))
        .build();

    Harness {
        group,
        store,
        sender,
        metrics,
    }
}

/// Same thresholds for every priority
pub fn channels(max_batch_count: usize, max_batch_latency_ms: u64) -> ChannelsConfig {
    let channel = ChannelConfig {
        max_batch_count,
        max_batch_bytes: 1024 * 1024,
        max_batch_latency_ms,
    };
    ChannelsConfig {
        high: channel,
        default: channel,
        background: channel,
    }
}

/// Millisecond backoff; transport pauses last a minute unless resumed
pub fn retry(max_retries: u32) -> RetryConfig {
    RetryConfig {
        max_retries,
        base_delay_ms: 5,
        max_delay_ms: 20,
        pause_cooldown_secs: 60,
    }
}

pub fn event(name: &str) -> Log {
    Log::event(name)
}

/// Event names of a batch, in batch order
pub fn names(batch: &Batch) -> Vec<String> {
    batch
        .records
        .iter()
        .filter_map(|r| match &r.log.kind {
            LogKind::Event(e) => Some(e.name.clone()),
            _ => None,
        })
        .collect()
}

/// Polls `condition` until it holds or five seconds pass
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
