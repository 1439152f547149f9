//! Log store port (driven/secondary port)
//!
//! This module defines the interface of the durable, crash-safe store that
//! holds pending records until the collector has acknowledged them.
//!
//! ## Design Notes
//!
//! - The store is partitioned by [`Priority`]. Operations on one partition are
//!   serialized; partitions do not contend with each other.
//! - `load_batch` puts the returned records *on loan*: they are hidden from
//!   later `load_batch` calls until `delete_batch` acknowledges them or
//!   `release_batch` gives them back. Loans are not persisted, so a restart
//!   re-exposes every unacknowledged record.
//! - A *held* group is hidden the same way until the hold is lifted; holds
//!   are in memory too. They back module-level disable without data deletion.
//! - Uses the typed [`StoreError`] because callers must distinguish
//!   `StorageFull` from backend failures.

use chrono::{DateTime, Utc};

use crate::domain::{
    IncidentId, Log, PersistencePolicy, Priority, RecordHandle, StoreError,
};

/// A record as held by the store
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub handle: RecordHandle,
    pub priority: Priority,
    /// Name of the module that produced the record
    pub group: String,
    pub policy: PersistencePolicy,
    pub log: Log,
    /// Serialized payload size
    pub size_bytes: u64,
    pub enqueued_at: DateTime<Utc>,
}

/// Result of a successful [`ILogStore::persist`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistOutcome {
    pub handle: RecordHandle,
    /// Serialized payload size of the new record
    pub size_bytes: u64,
    /// Number of `Normal` records evicted to make room
    pub evicted: u64,
}

/// Which records [`ILogStore::delete_all`] removes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurgeScope {
    /// One priority partition
    Priority(Priority),
    /// Every record produced by one module, across partitions
    Group(String),
    /// Everything
    All,
}

/// Durable storage for pending records
#[async_trait::async_trait]
pub trait ILogStore: Send + Sync {
    /// Persists `log` in the partition of `priority`.
    ///
    /// When the store is at capacity the oldest `Normal` records not on loan
    /// are evicted first. `Critical` records are never evicted.
    ///
    /// # Errors
    ///
    /// `StoreError::StorageFull` when the record does not fit even after
    /// evicting every evictable `Normal` record.
    async fn persist(
        &self,
        log: &Log,
        priority: Priority,
        policy: PersistencePolicy,
        group: &str,
    ) -> Result<PersistOutcome, StoreError>;

    /// Loads the oldest pending records of a partition and puts them on loan.
    ///
    /// Stops at `max_count` records or before the record that would push the
    /// batch over `max_bytes`, whichever comes first. The first record is
    /// always included so an oversized record cannot block its partition.
    async fn load_batch(
        &self,
        priority: Priority,
        max_count: usize,
        max_bytes: u64,
    ) -> Result<Vec<StoredRecord>, StoreError>;

    /// Returns loaned records to the pending pool without deleting them
    async fn release_batch(&self, handles: &[RecordHandle]) -> Result<(), StoreError>;

    /// Permanently removes acknowledged records. Unknown handles are ignored.
    async fn delete_batch(&self, handles: &[RecordHandle]) -> Result<u64, StoreError>;

    /// Irreversibly removes every record in `scope`, loaned or not
    async fn delete_all(&self, scope: PurgeScope) -> Result<u64, StoreError>;

    /// Hides the records of `group` from `load_batch` and from the partition
    /// counts, or lifts that hold again
    async fn set_group_held(&self, group: &str, held: bool) -> Result<(), StoreError>;

    /// Number of records in a partition, including loaned ones and excluding
    /// held groups
    async fn pending_count(&self, priority: Priority) -> Result<u64, StoreError>;

    /// Serialized bytes of the records counted by `pending_count`
    async fn pending_bytes(&self, priority: Priority) -> Result<u64, StoreError>;

    /// Number of records produced by one module, held or not
    async fn pending_count_for_group(&self, group: &str) -> Result<u64, StoreError>;

    /// Crash and attachment records belonging to an incident, oldest first
    async fn records_for_incident(
        &self,
        incident_id: IncidentId,
    ) -> Result<Vec<StoredRecord>, StoreError>;

    /// Serialized bytes held by the whole store
    async fn used_bytes(&self) -> Result<u64, StoreError>;
}
