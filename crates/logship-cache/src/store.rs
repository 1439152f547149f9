//! SQLite implementation of ILogStore
//!
//! Every pending record is one row of `pending_logs`; the `priority` column is
//! the partition key and `handle` (AUTOINCREMENT) gives oldest-first order.
//!
//! ## Type Mapping
//!
//! | Domain Type        | SQL Type | Strategy                                   |
//! |--------------------|----------|--------------------------------------------|
//! | RecordHandle       | INTEGER  | rowid                                      |
//! | Priority           | TEXT     | `as_str()` / `FromStr`                     |
//! | PersistencePolicy  | INTEGER  | `bits()` / `from_bits()`                   |
//! | IncidentId         | TEXT     | UUID string, NULL for non-crash logs       |
//! | Log                | TEXT     | serde_json serialization                   |
//! | DateTime<Utc>      | TEXT     | ISO 8601 via `to_rfc3339()`                |
//!
//! ## Loans and capacity
//!
//! Loans live in memory only: a record loaned to an in-flight batch is hidden
//! from `load_batch` until deleted or released, and a restart releases every
//! loan. The eviction pass claims its victims through the same loan set, so a
//! record is never handed to a channel and evicted at the same time.
//!
//! Group holds follow the same in-memory discipline: records of a held group
//! stay persisted but are skipped by `load_batch` and the partition counts.
//!
//! Capacity is store-wide. The fast path reserves bytes on an atomic counter
//! without any cross-partition lock; only a persist that overflows the quota
//! takes the eviction lock.

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashSet;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool};
use tokio::sync::{Mutex, MutexGuard};

use logship_core::domain::{
    IncidentId, Log, PersistencePolicy, Priority, RecordHandle, StoreError,
};
use logship_core::ports::{ILogStore, PersistOutcome, PurgeScope, StoredRecord};

use crate::CacheError;

/// Eviction rounds attempted before a persist gives up with `StorageFull`.
/// More than one round is only needed when concurrent writers consume the
/// space freed by a previous round.
const MAX_EVICTION_ROUNDS: usize = 4;

/// SQLite-based implementation of the log store port
pub struct SqliteLogStore {
    pool: SqlitePool,
    capacity_bytes: u64,
    /// Bytes persisted plus bytes reserved by in-progress persists
    used_bytes: AtomicU64,
    loans: DashSet<RecordHandle>,
    held_groups: DashSet<String>,
    /// One lock per priority partition, indexed by `Priority::index`
    partitions: [Mutex<()>; 3],
    eviction: Mutex<()>,
}

impl SqliteLogStore {
    /// Creates a store over `pool` bounded to `capacity_bytes` of payload
    pub async fn new(pool: SqlitePool, capacity_bytes: u64) -> Result<Self, CacheError> {
        let used: i64 = sqlx::query_scalar("SELECT COALESCE(SUM(size_bytes), 0) FROM pending_logs")
            .fetch_one(&pool)
            .await?;
        let used = used.max(0) as u64;

        if used > capacity_bytes {
            tracing::warn!(
                used,
                capacity_bytes,
                "Log store holds more than its capacity; new normal records will evict old ones"
            );
        }

        Ok(Self {
            pool,
            capacity_bytes,
            used_bytes: AtomicU64::new(used),
            loans: DashSet::new(),
            held_groups: DashSet::new(),
            partitions: [Mutex::new(()), Mutex::new(()), Mutex::new(())],
            eviction: Mutex::new(()),
        })
    }

    /// Store-wide quota in bytes
    pub fn capacity_bytes(&self) -> u64 {
        self.capacity_bytes
    }

    /// Number of records currently on loan to in-flight batches
    pub fn loaned_count(&self) -> usize {
        self.loans.len()
    }

    /// Groups currently held, in a stable order for binding
    fn held(&self) -> Vec<String> {
        let mut held: Vec<String> = self.held_groups.iter().map(|g| g.clone()).collect();
        held.sort();
        held
    }

    async fn lock_partition(&self, priority: Priority) -> MutexGuard<'_, ()> {
        self.partitions[priority.index()].lock().await
    }

    /// Locks every partition in index order
    async fn lock_all(&self) -> Vec<MutexGuard<'_, ()>> {
        let mut guards = Vec::with_capacity(self.partitions.len());
        for partition in &self.partitions {
            guards.push(partition.lock().await);
        }
        guards
    }

    // ========================================================================
    // Capacity accounting
    // ========================================================================

    fn try_reserve(&self, size: u64) -> bool {
        let capacity = self.capacity_bytes;
        self.used_bytes
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(size).filter(|next| *next <= capacity)
            })
            .is_ok()
    }

    fn release_bytes(&self, bytes: u64) {
        let _ = self
            .used_bytes
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                Some(used.saturating_sub(bytes))
            });
    }

    /// Reserves `size` bytes, evicting `Normal` records when needed.
    /// Returns the number of evicted records.
    async fn reserve(&self, priority: Priority, size: u64) -> Result<u64, StoreError> {
        if self.try_reserve(size) {
            return Ok(0);
        }

        let _eviction = self.eviction.lock().await;
        let mut evicted = 0;
        for _ in 0..MAX_EVICTION_ROUNDS {
            if self.try_reserve(size) {
                return Ok(evicted);
            }
            let used = self.used_bytes.load(Ordering::Acquire);
            let needed = used.saturating_add(size).saturating_sub(self.capacity_bytes);
            let round = self.evict_oldest_normal(needed).await?;
            if round == 0 {
                break;
            }
            evicted += round;
        }

        if self.try_reserve(size) {
            return Ok(evicted);
        }
        Err(StoreError::StorageFull {
            priority,
            requested_bytes: size,
        })
    }

    /// Deletes the oldest `Normal` records not on loan until `needed` bytes
    /// are freed. Evicts nothing when that much cannot be freed.
    async fn evict_oldest_normal(&self, needed: u64) -> Result<u64, CacheError> {
        let rows = sqlx::query(
            "SELECT handle, size_bytes FROM pending_logs WHERE (policy & ?) = 0 ORDER BY handle ASC",
        )
        .bind(i64::from(PersistencePolicy::CRITICAL.bits()))
        .fetch_all(&self.pool)
        .await?;

        let mut claimed = Vec::new();
        let mut freed = 0u64;
        for row in &rows {
            if freed >= needed {
                break;
            }
            let handle = RecordHandle::new(row.try_get("handle")?);
            let size: i64 = row.try_get("size_bytes")?;
            // Claiming through the loan set keeps load_batch off the victims
            if !self.loans.insert(handle) {
                continue;
            }
            claimed.push(handle);
            freed += size.max(0) as u64;
        }

        if freed < needed {
            for handle in &claimed {
                self.loans.remove(handle);
            }
            tracing::debug!(needed, freeable = freed, "Not enough normal records to evict");
            return Ok(0);
        }

        let deleted = self.delete_rows(&claimed).await;
        for handle in &claimed {
            self.loans.remove(handle);
        }
        let (count, bytes) = deleted?;

        tracing::warn!(count, bytes, "Evicted oldest normal records to make room");
        Ok(count)
    }

    /// Deletes rows by handle in one transaction; returns (rows, bytes)
    async fn delete_rows(&self, handles: &[RecordHandle]) -> Result<(u64, u64), CacheError> {
        if handles.is_empty() {
            return Ok((0, 0));
        }

        let mut tx = self.pool.begin().await?;
        let mut count = 0u64;
        let mut bytes = 0u64;
        for handle in handles {
            let size: Option<i64> =
                sqlx::query_scalar("DELETE FROM pending_logs WHERE handle = ? RETURNING size_bytes")
                    .bind(handle.get())
                    .fetch_optional(&mut *tx)
                    .await?;
            if let Some(size) = size {
                count += 1;
                bytes += size.max(0) as u64;
            }
        }
        tx.commit().await?;

        self.release_bytes(bytes);
        Ok((count, bytes))
    }

    async fn purge(&self, scope: &PurgeScope) -> Result<u64, CacheError> {
        let rows = match scope {
            PurgeScope::Priority(priority) => {
                sqlx::query("DELETE FROM pending_logs WHERE priority = ? RETURNING handle, size_bytes")
                    .bind(priority.as_str())
                    .fetch_all(&self.pool)
                    .await?
            }
            PurgeScope::Group(group) => {
                sqlx::query(
                    "DELETE FROM pending_logs WHERE group_name = ? RETURNING handle, size_bytes",
                )
                .bind(group)
                .fetch_all(&self.pool)
                .await?
            }
            PurgeScope::All => {
                sqlx::query("DELETE FROM pending_logs RETURNING handle, size_bytes")
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        let mut bytes = 0u64;
        for row in &rows {
            let handle = RecordHandle::new(row.try_get("handle")?);
            let size: i64 = row.try_get("size_bytes")?;
            self.loans.remove(&handle);
            bytes += size.max(0) as u64;
        }
        self.release_bytes(bytes);

        Ok(rows.len() as u64)
    }
}

/// `AND group_name NOT IN (?, ...)` for `held` groups, empty when none are held
fn exclude_held(held: &[String]) -> String {
    if held.is_empty() {
        String::new()
    } else {
        format!(" AND group_name NOT IN ({})", vec!["?"; held.len()].join(", "))
    }
}

// ============================================================================
// Row conversion
// ============================================================================

fn row_to_record(row: &SqliteRow) -> Result<StoredRecord, CacheError> {
    let handle = RecordHandle::new(row.try_get("handle")?);

    let priority: String = row.try_get("priority")?;
    let priority = Priority::from_str(&priority)
        .map_err(|e| CacheError::SerializationError(e.to_string()))?;

    let policy: i64 = row.try_get("policy")?;
    let payload: String = row.try_get("payload")?;
    let log: Log = serde_json::from_str(&payload)?;

    let size_bytes: i64 = row.try_get("size_bytes")?;
    let enqueued_at: String = row.try_get("enqueued_at")?;
    let enqueued_at = DateTime::parse_from_rfc3339(&enqueued_at)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| CacheError::SerializationError(format!("Invalid enqueued_at: {}", e)))?;

    Ok(StoredRecord {
        handle,
        priority,
        group: row.try_get("group_name")?,
        policy: PersistencePolicy::from_bits(policy as u8),
        log,
        size_bytes: size_bytes.max(0) as u64,
        enqueued_at,
    })
}

// ============================================================================
// ILogStore implementation
// ============================================================================

#[async_trait::async_trait]
impl ILogStore for SqliteLogStore {
    async fn persist(
        &self,
        log: &Log,
        priority: Priority,
        policy: PersistencePolicy,
        group: &str,
    ) -> Result<PersistOutcome, StoreError> {
        let payload = serde_json::to_string(log).map_err(CacheError::from)?;
        let size = payload.len() as u64;
        let policy = policy.effective();

        if size > self.capacity_bytes {
            return Err(StoreError::StorageFull {
                priority,
                requested_bytes: size,
            });
        }

        let evicted = self.reserve(priority, size).await?;

        let _partition = self.lock_partition(priority).await;
        let inserted = sqlx::query(
            r#"
            INSERT INTO pending_logs
                (priority, group_name, incident_id, policy, payload, size_bytes, enqueued_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(priority.as_str())
        .bind(group)
        .bind(log.incident_id().map(|id| id.to_string()))
        .bind(i64::from(policy.bits()))
        .bind(&payload)
        .bind(size as i64)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await;

        let handle = match inserted {
            Ok(result) => RecordHandle::new(result.last_insert_rowid()),
            Err(e) => {
                self.release_bytes(size);
                return Err(CacheError::from(e).into());
            }
        };

        tracing::trace!(%handle, %priority, %policy, group, size, "Record persisted");

        Ok(PersistOutcome {
            handle,
            size_bytes: size,
            evicted,
        })
    }

    async fn load_batch(
        &self,
        priority: Priority,
        max_count: usize,
        max_bytes: u64,
    ) -> Result<Vec<StoredRecord>, StoreError> {
        if max_count == 0 {
            return Ok(Vec::new());
        }

        let _partition = self.lock_partition(priority).await;

        // Loaned rows are skipped in memory, so read past them
        let limit = max_count.saturating_add(self.loans.len());
        let held = self.held();
        let sql = format!(
            "SELECT * FROM pending_logs WHERE priority = ?{} ORDER BY handle ASC LIMIT ?",
            exclude_held(&held)
        );
        let mut query = sqlx::query::<Sqlite>(&sql).bind(priority.as_str());
        for group in &held {
            query = query.bind(group.as_str());
        }
        let rows = query
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(CacheError::from)?;

        let mut batch: Vec<StoredRecord> = Vec::new();
        let mut bytes = 0u64;
        let mut corrupt = Vec::new();

        for row in &rows {
            if batch.len() >= max_count {
                break;
            }
            let handle = RecordHandle::new(row.try_get("handle").map_err(CacheError::from)?);
            if self.loans.contains(&handle) {
                continue;
            }
            let size: i64 = row.try_get("size_bytes").map_err(CacheError::from)?;
            let size = size.max(0) as u64;
            if !batch.is_empty() && bytes + size > max_bytes {
                break;
            }

            match row_to_record(row) {
                Ok(record) => {
                    if !self.loans.insert(handle) {
                        continue;
                    }
                    bytes += size;
                    batch.push(record);
                }
                Err(e) => {
                    tracing::error!(%handle, %priority, error = %e, "Dropping undecodable record");
                    corrupt.push(handle);
                }
            }
        }

        if !corrupt.is_empty() {
            self.delete_rows(&corrupt).await?;
        }

        if !batch.is_empty() {
            tracing::debug!(%priority, count = batch.len(), bytes, "Batch loaned");
        }
        Ok(batch)
    }

    async fn release_batch(&self, handles: &[RecordHandle]) -> Result<(), StoreError> {
        for handle in handles {
            self.loans.remove(handle);
        }
        Ok(())
    }

    async fn delete_batch(&self, handles: &[RecordHandle]) -> Result<u64, StoreError> {
        let deleted = self.delete_rows(handles).await;
        for handle in handles {
            self.loans.remove(handle);
        }
        let (count, bytes) = deleted?;
        tracing::trace!(count, bytes, "Batch deleted");
        Ok(count)
    }

    async fn delete_all(&self, scope: PurgeScope) -> Result<u64, StoreError> {
        let _guards = match &scope {
            PurgeScope::Priority(priority) => vec![self.lock_partition(*priority).await],
            PurgeScope::Group(_) | PurgeScope::All => self.lock_all().await,
        };

        let count = self.purge(&scope).await?;
        tracing::info!(?scope, count, "Pending records purged");
        Ok(count)
    }

    async fn set_group_held(&self, group: &str, held: bool) -> Result<(), StoreError> {
        let changed = if held {
            self.held_groups.insert(group.to_string())
        } else {
            self.held_groups.remove(group).is_some()
        };
        if changed {
            tracing::debug!(group, held, "Group hold changed");
        }
        Ok(())
    }

    async fn pending_count(&self, priority: Priority) -> Result<u64, StoreError> {
        let held = self.held();
        let sql = format!(
            "SELECT COUNT(*) FROM pending_logs WHERE priority = ?{}",
            exclude_held(&held)
        );
        let mut query = sqlx::query_scalar::<Sqlite, i64>(&sql).bind(priority.as_str());
        for group in &held {
            query = query.bind(group.as_str());
        }
        let count = query
            .fetch_one(&self.pool)
            .await
            .map_err(CacheError::from)?;
        Ok(count.max(0) as u64)
    }

    async fn pending_bytes(&self, priority: Priority) -> Result<u64, StoreError> {
        let held = self.held();
        let sql = format!(
            "SELECT COALESCE(SUM(size_bytes), 0) FROM pending_logs WHERE priority = ?{}",
            exclude_held(&held)
        );
        let mut query = sqlx::query_scalar::<Sqlite, i64>(&sql).bind(priority.as_str());
        for group in &held {
            query = query.bind(group.as_str());
        }
        let bytes = query
            .fetch_one(&self.pool)
            .await
            .map_err(CacheError::from)?;
        Ok(bytes.max(0) as u64)
    }

    async fn pending_count_for_group(&self, group: &str) -> Result<u64, StoreError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM pending_logs WHERE group_name = ?")
                .bind(group)
                .fetch_one(&self.pool)
                .await
                .map_err(CacheError::from)?;
        Ok(count.max(0) as u64)
    }

    async fn records_for_incident(
        &self,
        incident_id: IncidentId,
    ) -> Result<Vec<StoredRecord>, StoreError> {
        let rows =
            sqlx::query("SELECT * FROM pending_logs WHERE incident_id = ? ORDER BY handle ASC")
                .bind(incident_id.to_string())
                .fetch_all(&self.pool)
                .await
                .map_err(CacheError::from)?;

        let records = rows
            .iter()
            .map(row_to_record)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    async fn used_bytes(&self) -> Result<u64, StoreError> {
        let bytes: i64 = sqlx::query_scalar("SELECT COALESCE(SUM(size_bytes), 0) FROM pending_logs")
            .fetch_one(&self.pool)
            .await
            .map_err(CacheError::from)?;
        Ok(bytes.max(0) as u64)
    }
}
