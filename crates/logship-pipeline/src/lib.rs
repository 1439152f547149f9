//! logship Pipeline - Priority channels and delivery
//!
//! Provides:
//! - One [`Channel`] per priority with persistence, batch triggers and a
//!   background worker that drives the sender
//! - A global [`SendGate`] enforcing strict priority and a parallel-sender cap
//! - Exponential [`Backoff`] with `Retry-After` support
//! - The [`ChannelGroup`], which routes submissions, tracks per-module
//!   enablement and implements the `ILogSink` and `Enable` ports
//! - Prometheus [`MetricsRegistry`]
//!
//! ## Modules
//!
//! - [`channel`] - Per-priority state machine (`Idle → Batching → Sending → Idle | Paused`)
//! - [`gate`] - Cross-channel send arbitration
//! - [`backoff`] - Retry delay computation
//! - [`group`] - The three channels behind one submission interface
//! - [`metrics`] - Counters, gauges and histograms of the pipeline

pub mod backoff;
pub mod channel;
pub mod gate;
pub mod group;
pub mod metrics;

pub use backoff::Backoff;
pub use channel::{Channel, ChannelState, PauseReason};
pub use gate::{SendGate, SendPermit};
pub use group::{ChannelGroup, ChannelGroupBuilder};
pub use metrics::MetricsRegistry;
