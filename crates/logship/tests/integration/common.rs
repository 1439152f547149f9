//! Shared test helpers for runtime integration tests

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use logship::LogShip;
use logship_core::config::{ChannelConfig, Config, ConfigBuilder};
use logship_core::domain::{LogKind, Priority, TransportError};
use logship_core::ports::{Batch, ISender, SendResult};

/// Sender double: records every batch; while offline answers `ConnectionPaused`
#[derive(Default)]
pub struct RecordingSender {
    batches: Mutex<Vec<Batch>>,
    offline: AtomicBool,
}

impl RecordingSender {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn batches(&self) -> Vec<Batch> {
        self.batches.lock().unwrap().clone()
    }

    /// Kind-specific names of every delivered record: event names, or
    /// `crash` / `attachment`
    pub fn delivered(&self) -> Vec<String> {
        self.batches()
            .iter()
            .flat_map(|b| b.records.iter())
            .map(|r| match &r.log.kind {
                LogKind::Event(e) => e.name.clone(),
                LogKind::Crash(_) => "crash".to_string(),
                LogKind::ErrorAttachment(_) => "attachment".to_string(),
                _ => r.log.kind_name().to_string(),
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl ISender for RecordingSender {
    async fn send(&self, batch: &Batch) -> SendResult {
        if self.offline.load(Ordering::SeqCst) {
            return SendResult::Recoverable(TransportError::ConnectionPaused);
        }
        self.batches.lock().unwrap().push(batch.clone());
        SendResult::Success
    }
}

/// Config rooted in `dir` with fast channels and millisecond retries
pub fn config_builder(dir: &Path, latency_ms: u64) -> ConfigBuilder {
    let channel = ChannelConfig {
        max_batch_count: 50,
        max_batch_bytes: 1024 * 1024,
        max_batch_latency_ms: latency_ms,
    };
    ConfigBuilder::new()
        .database_path(dir.join("logs.db"))
        .reports_dir(dir.join("crashes"))
        .channel(Priority::High, channel)
        .channel(Priority::Default, channel)
        .channel(Priority::Background, channel)
        .max_retries(2)
        .retry_delays_ms(5, 20)
        .pause_cooldown_secs(60)
}

pub fn config(dir: &Path, latency_ms: u64) -> Config {
    config_builder(dir, latency_ms).build()
}

pub async fn runtime(config: Config, sender: &Arc<RecordingSender>) -> LogShip {
    LogShip::builder(config)
        .sender(sender.clone())
        .without_panic_hook()
        .build()
        .await
        .expect("build runtime")
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
