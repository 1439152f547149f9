//! Batch formation, ordering and send-result handling

use std::sync::Arc;

use logship_core::domain::{
    IngestionError, PersistencePolicy, Priority, TransportError,
};
use logship_core::ports::{ILogSink, ILogStore, RecordRejection, SendResult};
use logship_pipeline::metrics::drop_reason;
use logship_pipeline::{ChannelGroup, ChannelState, PauseReason};

use crate::common::{channels, event, eventually, harness, harness_with_capacity, names, retry};

// ============================================================================
// Triggers and ordering
// ============================================================================

#[tokio::test]
async fn test_records_delivered_in_fifo_order() {
    let h = harness(channels(5, 20), retry(3)).await;
    h.group.start().await.unwrap();

    let expected: Vec<String> = (0..12).map(|i| format!("e{i}")).collect();
    for name in &expected {
        h.submit("analytics", name, Priority::Default).await;
    }

    assert!(eventually(|| h.sender.delivered().len() == 12).await);
    assert_eq!(h.sender.delivered(), expected);
    for (batch, _) in h.sender.attempts() {
        assert!(batch.len() <= 5);
    }
    h.group.shutdown().await;
}

#[tokio::test]
async fn test_count_threshold_sends_without_waiting_for_latency() {
    let h = harness(channels(3, 60_000), retry(3)).await;
    h.group.start().await.unwrap();

    for i in 0..3 {
        h.submit("analytics", &format!("e{i}"), Priority::Default).await;
    }

    assert!(eventually(|| h.sender.attempt_count() == 1).await);
    assert_eq!(h.sender.attempts()[0].0.len(), 3);
    h.group.shutdown().await;
}

#[tokio::test]
async fn test_latency_threshold_sends_partial_batch() {
    let h = harness(channels(100, 30), retry(3)).await;
    h.group.start().await.unwrap();

    h.submit("analytics", "a", Priority::Background).await;
    h.submit("analytics", "b", Priority::Background).await;

    assert!(eventually(|| h.sender.delivered() == ["a", "b"]).await);
    assert_eq!(h.sender.attempts()[0].0.priority, Priority::Background);
    h.group.shutdown().await;
}

#[tokio::test]
async fn test_flush_sends_below_thresholds() {
    let h = harness(channels(100, 60_000), retry(3)).await;
    h.group.start().await.unwrap();

    h.submit("analytics", "a", Priority::Default).await;
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(h.sender.attempt_count(), 0);

    h.group.flush_all();
    assert!(eventually(|| h.sender.delivered() == ["a"]).await);
    assert!(h.group.drain(std::time::Duration::from_secs(1)).await);
    h.group.shutdown().await;
}

#[tokio::test]
async fn test_device_context_attached_before_send() {
    let h = harness(channels(1, 10), retry(3)).await;
    h.group.start().await.unwrap();

    let log = event("with_device");
    assert!(log.device.is_none());
    h.group
        .submit("analytics", log, Priority::High, PersistencePolicy::NORMAL)
        .await
        .unwrap();

    assert!(eventually(|| h.sender.attempt_count() == 1).await);
    let (batch, _) = &h.sender.attempts()[0];
    let device = batch.records[0].log.device.as_ref().expect("device attached");
    assert_eq!(device.os_name, std::env::consts::OS);
    h.group.shutdown().await;
}

// ============================================================================
// Send results
// ============================================================================

#[tokio::test]
async fn test_fatal_batch_is_dropped() {
    let h = harness(channels(1, 10), retry(3)).await;
    h.sender.script([SendResult::Fatal(TransportError::http(400))]);
    h.group.start().await.unwrap();

    h.submit("analytics", "malformed", Priority::Default).await;
    h.submit("analytics", "fine", Priority::Default).await;

    assert!(eventually(|| h.sender.delivered() == ["fine"]).await);
    assert_eq!(h.sender.attempt_count(), 2);
    assert_eq!(h.store.pending_count(Priority::Default).await.unwrap(), 0);
    assert_eq!(h.metrics.dropped(Priority::Default, drop_reason::FATAL), 1);
    h.group.shutdown().await;
}

#[tokio::test]
async fn test_recoverable_failure_retries_same_batch() {
    let h = harness(channels(2, 10), retry(3)).await;
    h.sender.script([
        SendResult::Recoverable(TransportError::http(503)),
        SendResult::Recoverable(TransportError::Network("reset".into())),
    ]);
    h.group.start().await.unwrap();

    h.submit("analytics", "a", Priority::Default).await;
    h.submit("analytics", "b", Priority::Default).await;

    assert!(eventually(|| h.sender.delivered() == ["a", "b"]).await);
    let attempts = h.sender.attempts();
    assert_eq!(attempts.len(), 3);
    assert_eq!(attempts[0].0.id, attempts[2].0.id);
    assert_eq!(names(&attempts[0].0), names(&attempts[2].0));
    assert!(eventually(|| h.group.channel(Priority::Default).is_drained()).await);
    h.group.shutdown().await;
}

#[tokio::test]
async fn test_retries_exhausted_pauses_channel() {
    let h = harness(channels(1, 10), retry(1)).await;
    h.sender.script([
        SendResult::Recoverable(TransportError::http(500)),
        SendResult::Recoverable(TransportError::http(502)),
    ]);
    h.group.start().await.unwrap();
    h.submit("analytics", "a", Priority::High).await;

    let channel = Arc::clone(h.group.channel(Priority::High));
    assert!(eventually(|| channel.state() == ChannelState::Paused).await);
    assert!(matches!(
        channel.pause_reason(),
        Some(PauseReason::Transport { .. })
    ));
    assert_eq!(h.sender.attempt_count(), 2);
    assert_eq!(h.store.pending_count(Priority::High).await.unwrap(), 1);
    assert_eq!(h.store.loaned_count(), 0);

    channel.resume();
    assert!(eventually(|| h.sender.delivered() == ["a"]).await);
    h.group.shutdown().await;
}

#[tokio::test]
async fn test_connection_paused_pauses_without_retry() {
    let h = harness(channels(1, 10), retry(3)).await;
    h.sender
        .script([SendResult::Recoverable(TransportError::ConnectionPaused)]);
    h.group.start().await.unwrap();
    h.submit("analytics", "a", Priority::Default).await;

    let channel = Arc::clone(h.group.channel(Priority::Default));
    assert!(eventually(|| channel.state() == ChannelState::Paused).await);
    assert_eq!(h.sender.attempt_count(), 1);

    // Still persisted while paused
    h.submit("analytics", "b", Priority::Default).await;
    assert_eq!(h.store.pending_count(Priority::Default).await.unwrap(), 2);

    channel.resume();
    assert!(eventually(|| h.sender.delivered() == ["a", "b"]).await);
    h.group.shutdown().await;
}

#[tokio::test]
async fn test_partial_result_settles_per_record() {
    let h = harness(channels(3, 60_000), retry(3)).await;

    h.submit("analytics", "accepted", Priority::Default).await;
    let retried = h.submit("analytics", "retried", Priority::Default).await;
    let rejected = h.submit("analytics", "rejected", Priority::Default).await;

    h.sender.script([SendResult::Partial(vec![
        RecordRejection {
            handle: retried,
            error: TransportError::http(503),
        },
        RecordRejection {
            handle: rejected,
            error: TransportError::http(422),
        },
    ])]);
    h.group.start().await.unwrap();

    assert!(eventually(|| h.sender.attempt_count() == 2).await);
    let attempts = h.sender.attempts();
    assert_eq!(names(&attempts[0].0), ["accepted", "retried", "rejected"]);
    assert_eq!(names(&attempts[1].0), ["retried"]);
    assert!(attempts[1].1.is_success());

    assert!(eventually(|| h.group.channel(Priority::Default).is_drained()).await);
    assert_eq!(h.store.pending_count(Priority::Default).await.unwrap(), 0);
    assert_eq!(h.metrics.dropped(Priority::Default, drop_reason::FATAL), 1);
    h.group.shutdown().await;
}

// ============================================================================
// Storage
// ============================================================================

#[tokio::test]
async fn test_storage_full_is_returned_to_producer() {
    let h = harness_with_capacity(channels(10, 60_000), retry(3), 16).await;

    let err = h
        .group
        .submit(
            "analytics",
            event("too_big_for_store"),
            Priority::Background,
            PersistencePolicy::CRITICAL,
        )
        .await
        .unwrap_err();

    assert_eq!(
        err,
        IngestionError::StorageFull {
            priority: Priority::Background
        }
    );
    assert_eq!(
        h.metrics
            .dropped(Priority::Background, drop_reason::STORAGE_FULL),
        1
    );
}

#[tokio::test]
async fn test_pending_records_resent_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("logs.db");

    {
        let pool = logship_cache::DatabasePool::new(&db).await.unwrap();
        let store = logship_cache::SqliteLogStore::new(pool.pool().clone(), 1024 * 1024)
            .await
            .unwrap();
        let sender = crate::common::RecordingSender::new();
        let group = ChannelGroup::builder(Arc::new(store), sender).build();
        for i in 0..3 {
            group
                .submit(
                    "analytics",
                    event(&format!("e{i}")),
                    Priority::Default,
                    PersistencePolicy::CRITICAL,
                )
                .await
                .unwrap();
        }
        // Never started: nothing was sent
        pool.close().await;
    }

    let pool = logship_cache::DatabasePool::new(&db).await.unwrap();
    let store = logship_cache::SqliteLogStore::new(pool.pool().clone(), 1024 * 1024)
        .await
        .unwrap();
    let sender = crate::common::RecordingSender::new();
    let group = ChannelGroup::builder(Arc::new(store), sender.clone())
        .channels(channels(10, 10))
        .build();
    group.start().await.unwrap();

    assert!(eventually(|| sender.delivered() == ["e0", "e1", "e2"]).await);
    group.shutdown().await;
}
