//! Shared test helpers for crashes integration tests

use std::path::Path;
use std::sync::Arc;

use logship_cache::{DatabasePool, SqliteLogStore};
use logship_core::config::CrashesConfig;
use logship_core::domain::IncidentId;
use logship_core::ports::{Batch, ISender, SendResult};
use logship_crashes::{CrashRecord, CrashReportStore, CrashesModule};
use logship_pipeline::ChannelGroup;

/// Never called: the channel group is not started in these tests
pub struct AcceptAll;

#[async_trait::async_trait]
impl ISender for AcceptAll {
    async fn send(&self, _batch: &Batch) -> SendResult {
        SendResult::Success
    }
}

pub struct Harness {
    pub group: Arc<ChannelGroup>,
    pub store: Arc<SqliteLogStore>,
    pub dir: tempfile::TempDir,
}

impl Harness {
    pub async fn new() -> Self {
        let pool = DatabasePool::in_memory()
            .await
            .expect("Failed to create in-memory database");
        let store = Arc::new(
            SqliteLogStore::new(pool.pool().clone(), 1024 * 1024)
                .await
                .expect("Failed to create store"),
        );
        let group = ChannelGroup::builder(store.clone(), Arc::new(AcceptAll)).build();
        Self {
            group,
            store,
            dir: tempfile::tempdir().expect("tempdir"),
        }
    }

    pub fn config(&self, automatic: bool, confirm: bool) -> CrashesConfig {
        CrashesConfig {
            reports_dir: self.dir.path().join("crashes"),
            automatic_processing: automatic,
            await_user_confirmation: confirm,
        }
    }

    /// Crashes module over this harness; never touches the panic hook
    pub fn module(&self, automatic: bool, confirm: bool) -> CrashesModule {
        CrashesModule::new(self.group.clone(), &self.config(automatic, confirm)).without_panic_hook()
    }

    pub fn crash_files(&self) -> usize {
        CrashReportStore::new(self.dir.path().join("crashes"))
            .list()
            .expect("list crash files")
            .len()
    }
}

/// Writes a raw crash record as the panic hook of a previous run would
pub fn write_crash(reports_dir: &Path, message: &str) -> IncidentId {
    let record = CrashRecord::new("demo", message, "src/main.rs:1:1", "");
    CrashReportStore::new(reports_dir.to_path_buf())
        .save(&record)
        .expect("save crash record");
    record.incident_id()
}
