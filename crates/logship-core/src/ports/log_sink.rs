//! Log sink port (driving/primary port)
//!
//! The submission entry point producers use. Implemented by the channel group
//! in `logship-pipeline`; the crash workflow and producer modules only see
//! this trait.
//!
//! ## Design Notes
//!
//! - Submission is fire-and-forget: once `submit` returns `Ok`, delivery is the
//!   pipeline's job. It fails synchronously only with `InvalidContainer` or
//!   `StorageFull`.
//! - A disabled pipeline or group accepts the call and drops the record
//!   ([`Enqueued::Dropped`]).

use crate::domain::{IngestionError, Log, PersistencePolicy, Priority, RecordHandle};

/// What happened to a submitted record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// Durably stored and queued for sending
    Persisted {
        handle: RecordHandle,
        /// `Normal` records evicted to make room
        evicted: u64,
    },
    /// Discarded because the channel or group is disabled
    Dropped,
}

impl Enqueued {
    /// The handle of the persisted record, if any
    pub fn handle(&self) -> Option<RecordHandle> {
        match self {
            Enqueued::Persisted { handle, .. } => Some(*handle),
            Enqueued::Dropped => None,
        }
    }
}

/// Submission interface of the pipeline
#[async_trait::async_trait]
pub trait ILogSink: Send + Sync {
    /// Validates and enqueues `log` for the module `group`
    async fn submit(
        &self,
        group: &str,
        log: Log,
        priority: Priority,
        policy: PersistencePolicy,
    ) -> Result<Enqueued, IngestionError>;

    /// Accepts or drops future submissions of `group`; with `delete_data`,
    /// also purges the records it already has pending
    async fn set_group_enabled(
        &self,
        group: &str,
        enabled: bool,
        delete_data: bool,
    ) -> Result<(), IngestionError>;
}
