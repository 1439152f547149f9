//! Start order, module enablement and session stamping

use std::time::Duration;

use logship::LifecycleError;
use logship_core::domain::{
    CrashState, InitializationPriority, Log, PersistencePolicy, Priority,
};
use logship_core::ports::{Enable, Enqueued, ILogStore, IModule};
use logship_crashes::{CrashRecord, CrashReportStore};

use crate::common::{config, eventually, runtime, RecordingSender};

#[tokio::test]
async fn test_crashes_module_starts_first() {
    let dir = tempfile::tempdir().unwrap();
    let sender = RecordingSender::new();
    let logship = runtime(config(dir.path(), 10), &sender).await;
    logship
        .add_module("analytics", InitializationPriority::Default)
        .unwrap();
    logship
        .add_module("remote_config", InitializationPriority::High)
        .unwrap();

    let order: Vec<String> = logship
        .coordinator()
        .modules()
        .iter()
        .map(|m| m.name().to_string())
        .collect();
    assert_eq!(order, ["crashes", "remote_config", "analytics"]);

    logship.start().await.unwrap();
    assert!(logship.module("analytics").unwrap().is_started());
    logship.shutdown(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn test_second_max_module_fails_before_any_start() {
    let dir = tempfile::tempdir().unwrap();
    let sender = RecordingSender::new();
    let logship = runtime(config(dir.path(), 10), &sender).await;
    let analytics = logship
        .add_module("analytics", InitializationPriority::Default)
        .unwrap();
    logship
        .add_module("another_crash_reporter", InitializationPriority::Max)
        .unwrap();

    let err = logship.start().await.unwrap_err();

    assert!(matches!(
        err.downcast_ref::<LifecycleError>(),
        Some(LifecycleError::DuplicateMaxPriority { .. })
    ));
    assert!(!analytics.is_started());
    assert!(!logship.coordinator().is_started());
}

#[tokio::test]
async fn test_records_are_stamped_with_the_session() {
    let dir = tempfile::tempdir().unwrap();
    let sender = RecordingSender::new();
    let logship = runtime(config(dir.path(), 10), &sender).await;
    let analytics = logship
        .add_module("analytics", InitializationPriority::Default)
        .unwrap();
    logship.start().await.unwrap();

    analytics
        .track_event("app_opened", Default::default())
        .await
        .unwrap();
    logship
        .submit("analytics", Log::event("via_runtime"), Priority::High, PersistencePolicy::CRITICAL)
        .await
        .unwrap();

    assert!(eventually(|| sender.delivered().len() == 2).await);
    for batch in sender.batches() {
        for record in &batch.records {
            assert_eq!(record.log.sid, Some(logship.session_id()));
        }
    }
    logship.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_module_disable_with_delete_purges_only_its_records() {
    let dir = tempfile::tempdir().unwrap();
    let sender = RecordingSender::new();
    let logship = runtime(config(dir.path(), 60_000), &sender).await;
    let analytics = logship
        .add_module("analytics", InitializationPriority::Default)
        .unwrap();
    let feedback = logship
        .add_module("feedback", InitializationPriority::Default)
        .unwrap();
    logship.start().await.unwrap();

    for i in 0..3 {
        analytics
            .track_event(&format!("a{i}"), Default::default())
            .await
            .unwrap();
    }
    feedback.track_event("f0", Default::default()).await.unwrap();

    logship
        .set_module_enabled("analytics", false, true)
        .await
        .unwrap();

    let store = logship.store();
    assert_eq!(store.pending_count_for_group("analytics").await.unwrap(), 0);
    assert_eq!(store.pending_count_for_group("feedback").await.unwrap(), 1);
    assert!(!analytics.is_enabled());
    assert_eq!(
        analytics.track_event("late", Default::default()).await.unwrap(),
        Enqueued::Dropped
    );

    logship
        .set_module_enabled("analytics", true, false)
        .await
        .unwrap();
    assert!(matches!(
        analytics.track_event("back", Default::default()).await.unwrap(),
        Enqueued::Persisted { .. }
    ));
    logship.shutdown(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn test_global_disable_without_delete_then_enable_sends() {
    let dir = tempfile::tempdir().unwrap();
    let sender = RecordingSender::new();
    let logship = runtime(config(dir.path(), 10), &sender).await;
    let analytics = logship
        .add_module("analytics", InitializationPriority::Default)
        .unwrap();
    logship.start().await.unwrap();

    logship.group().pause_all();
    analytics.track_event("kept", Default::default()).await.unwrap();
    logship.set_enabled(false, false).await.unwrap();
    assert!(!logship.is_enabled());
    assert!(!logship.coordinator().all_enabled());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(sender.delivered().is_empty());

    logship.set_enabled(true, false).await.unwrap();
    assert!(eventually(|| sender.delivered() == ["kept"]).await);
    logship.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_crash_from_previous_run_is_delivered_on_high() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), 10);
    let record = CrashRecord::new("demo", "index out of bounds", "src/main.rs:3:9", "");
    CrashReportStore::new(config.crashes.reports_dir.clone())
        .save(&record)
        .unwrap();

    let sender = RecordingSender::new();
    let logship = runtime(config, &sender).await;
    logship.start().await.unwrap();

    assert!(eventually(|| sender.delivered() == ["crash"]).await);
    let batch = &sender.batches()[0];
    assert_eq!(batch.priority, Priority::High);
    assert_eq!(batch.records[0].log.incident_id(), Some(record.incident_id()));
    assert_eq!(batch.records[0].log.sid, None);
    assert_eq!(
        logship.crashes().workflow().state(record.incident_id()),
        Some(CrashState::Sent)
    );
    logship.shutdown(Duration::from_secs(1)).await;
}
