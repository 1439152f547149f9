//! Prometheus metrics registry for the pipeline
//!
//! Provides typed, labeled counters, gauges, and histograms for record
//! intake, drops, batch outcomes and send latency. Encoded text is exposed
//! through [`MetricsRegistry::encode`]; there is no HTTP exporter.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};

use logship_core::domain::Priority;

/// Why a record never reached the collector
pub mod drop_reason {
    /// Submitted while its channel or module was disabled
    pub const DISABLED: &str = "disabled";
    /// Rejected by the store
    pub const STORAGE_FULL: &str = "storage_full";
    /// Rejected by the collector with a non-retryable status
    pub const FATAL: &str = "fatal";
}

/// Outcome label of a batch send
pub mod batch_result {
    pub const SUCCESS: &str = "success";
    pub const PARTIAL: &str = "partial";
    pub const RECOVERABLE: &str = "recoverable";
    pub const FATAL: &str = "fatal";
}

/// Central metrics registry holding all Prometheus metrics.
pub struct MetricsRegistry {
    registry: Registry,
    /// Counter: records accepted per priority
    pub records_enqueued_total: IntCounterVec,
    /// Counter: records lost per (priority, reason)
    pub records_dropped_total: IntCounterVec,
    /// Counter: send attempts per (priority, result)
    pub batches_total: IntCounterVec,
    /// Gauge: records waiting in the store per priority
    pub pending_records: IntGaugeVec,
    /// Histogram: sender round-trip time in seconds
    pub send_duration_seconds: HistogramVec,
}

impl MetricsRegistry {
    /// Creates a new `MetricsRegistry` with all metrics registered.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new_custom(Some("logship".to_string()), None)?;

        let records_enqueued_total = IntCounterVec::new(
            Opts::new("records_enqueued_total", "Records accepted by a channel"),
            &["priority"],
        )?;
        registry.register(Box::new(records_enqueued_total.clone()))?;

        let records_dropped_total = IntCounterVec::new(
            Opts::new("records_dropped_total", "Records dropped before delivery"),
            &["priority", "reason"],
        )?;
        registry.register(Box::new(records_dropped_total.clone()))?;

        let batches_total = IntCounterVec::new(
            Opts::new("batches_total", "Batch send attempts by outcome"),
            &["priority", "result"],
        )?;
        registry.register(Box::new(batches_total.clone()))?;

        let pending_records = IntGaugeVec::new(
            Opts::new("pending_records", "Records waiting to be sent"),
            &["priority"],
        )?;
        registry.register(Box::new(pending_records.clone()))?;

        let send_duration_seconds = HistogramVec::new(
            HistogramOpts::new("send_duration_seconds", "Batch send duration in seconds")
                .buckets(vec![0.05, 0.25, 1.0, 5.0, 30.0, f64::INFINITY]),
            &["priority"],
        )?;
        registry.register(Box::new(send_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            records_enqueued_total,
            records_dropped_total,
            batches_total,
            pending_records,
            send_duration_seconds,
        })
    }

    // ========================================================================
    // Recording helpers
    // ========================================================================

    pub fn record_enqueued(&self, priority: Priority) {
        self.records_enqueued_total
            .with_label_values(&[priority.as_str()])
            .inc();
    }

    pub fn record_dropped(&self, priority: Priority, reason: &str, count: u64) {
        self.records_dropped_total
            .with_label_values(&[priority.as_str(), reason])
            .inc_by(count);
    }

    pub fn record_batch(&self, priority: Priority, result: &str) {
        self.batches_total
            .with_label_values(&[priority.as_str(), result])
            .inc();
    }

    pub fn set_pending(&self, priority: Priority, count: u64) {
        self.pending_records
            .with_label_values(&[priority.as_str()])
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    pub fn observe_send_duration(&self, priority: Priority, duration_secs: f64) {
        self.send_duration_seconds
            .with_label_values(&[priority.as_str()])
            .observe(duration_secs);
    }

    /// Current value of `records_dropped_total` for one label pair
    pub fn dropped(&self, priority: Priority, reason: &str) -> u64 {
        self.records_dropped_total
            .with_label_values(&[priority.as_str(), reason])
            .get()
    }

    /// Current value of `batches_total` for one label pair
    pub fn batches(&self, priority: Priority, result: &str) -> u64 {
        self.batches_total
            .with_label_values(&[priority.as_str(), result])
            .get()
    }

    // ========================================================================
    // Encoding
    // ========================================================================

    /// Encode all metrics in Prometheus text exposition format.
    pub fn encode(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
