//! Sender port (driven/secondary port)
//!
//! The transport boundary. An [`ISender`] serializes a [`Batch`], performs the
//! network exchange and reports what happened. It never retries; retry and
//! backpressure decisions belong to the channel.

use uuid::Uuid;

use crate::domain::{Log, Priority, RecordHandle, TransportError};

/// One record inside a batch
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRecord {
    pub handle: RecordHandle,
    pub log: Log,
}

/// A bounded group of records sent in one transport call
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub id: Uuid,
    pub priority: Priority,
    pub records: Vec<BatchRecord>,
}

impl Batch {
    /// Creates a batch with a fresh id
    pub fn new(priority: Priority, records: Vec<BatchRecord>) -> Self {
        Self {
            id: Uuid::new_v4(),
            priority,
            records,
        }
    }

    /// Handles of every record in the batch
    pub fn handles(&self) -> Vec<RecordHandle> {
        self.records.iter().map(|r| r.handle).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Keeps only the records whose handle is in `handles`
    pub fn retain_handles(&mut self, handles: &[RecordHandle]) {
        self.records.retain(|r| handles.contains(&r.handle));
    }
}

/// A record the collector refused while accepting the rest of its batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordRejection {
    pub handle: RecordHandle,
    /// Classified per record with [`TransportError::is_recoverable`]
    pub error: TransportError,
}

/// Outcome of [`ISender::send`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendResult {
    /// Every record was accepted
    Success,
    /// Nothing was accepted; retry the batch later
    Recoverable(TransportError),
    /// Nothing was accepted and retrying will not help
    Fatal(TransportError),
    /// Mixed status: the listed records were rejected, all others accepted
    Partial(Vec<RecordRejection>),
}

impl SendResult {
    /// Classifies a whole-batch failure
    pub fn from_error(error: TransportError) -> Self {
        if error.is_recoverable() {
            SendResult::Recoverable(error)
        } else {
            SendResult::Fatal(error)
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SendResult::Success)
    }
}

/// Transport-agnostic dispatcher for batches
#[async_trait::async_trait]
pub trait ISender: Send + Sync {
    /// Sends one batch. May block on I/O; the caller cancels it by dropping
    /// the future.
    async fn send(&self, batch: &Batch) -> SendResult;
}
