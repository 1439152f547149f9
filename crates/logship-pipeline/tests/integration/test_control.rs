//! Pause, shutdown and enablement

use std::sync::Arc;
use std::time::Duration;

use logship_core::domain::{PersistencePolicy, Priority};
use logship_core::ports::{Enable, Enqueued, ILogSink, ILogStore};
use logship_pipeline::{ChannelGroup, ChannelState};

use crate::common::{channels, event, eventually, harness, retry, RecordingSender, SlowStore};

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn test_pause_cancels_in_flight_send() {
    let h = harness(channels(1, 1), retry(3)).await;
    h.sender.set_hang(true);
    h.group.start().await.unwrap();
    h.submit("g", "a", Priority::Default).await;

    let channel = Arc::clone(h.group.channel(Priority::Default));
    assert!(eventually(|| h.sender.hung() == 1).await);
    assert_eq!(channel.state(), ChannelState::Sending);

    channel.pause();
    assert!(eventually(|| h.store.loaned_count() == 0).await);
    assert_eq!(channel.state(), ChannelState::Paused);
    assert_eq!(h.store.pending_count(Priority::Default).await.unwrap(), 1);

    h.sender.set_hang(false);
    channel.resume();
    assert!(eventually(|| h.sender.delivered() == ["a"]).await);
    h.group.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_keeps_in_flight_records() {
    let h = harness(channels(1, 1), retry(3)).await;
    h.sender.set_hang(true);
    h.group.start().await.unwrap();
    h.submit("g", "a", Priority::High).await;
    assert!(eventually(|| h.sender.hung() == 1).await);

    tokio::time::timeout(Duration::from_secs(2), h.group.shutdown())
        .await
        .expect("shutdown completes");

    assert_eq!(h.store.loaned_count(), 0);
    assert_eq!(h.store.pending_count(Priority::High).await.unwrap(), 1);
}

// ============================================================================
// Module (group) enablement
// ============================================================================

#[tokio::test]
async fn test_group_disable_with_delete_purges_only_that_group() {
    let h = harness(channels(100, 60_000), retry(3)).await;
    for i in 0..3 {
        h.submit("analytics", &format!("a{i}"), Priority::Default).await;
    }
    h.submit("crashes", "c0", Priority::High).await;
    h.submit("crashes", "c1", Priority::Default).await;

    h.group
        .set_group_enabled("analytics", false, true)
        .await
        .unwrap();

    assert_eq!(h.store.pending_count_for_group("analytics").await.unwrap(), 0);
    assert_eq!(h.store.pending_count_for_group("crashes").await.unwrap(), 2);
    assert_eq!(h.group.channel(Priority::Default).pending_count(), 1);

    let outcome = h
        .group
        .submit("analytics", event("late"), Priority::Default, PersistencePolicy::NORMAL)
        .await
        .unwrap();
    assert_eq!(outcome, Enqueued::Dropped);
}

#[tokio::test]
async fn test_group_disable_without_delete_holds_then_sends() {
    let h = harness(channels(10, 5), retry(3)).await;
    h.group.start().await.unwrap();
    h.group.pause_all();
    for i in 0..3 {
        h.submit("analytics", &format!("a{i}"), Priority::Default).await;
    }
    h.submit("crashes", "c0", Priority::Default).await;

    h.group
        .set_group_enabled("analytics", false, false)
        .await
        .unwrap();
    h.group.resume_all();

    assert!(eventually(|| h.sender.delivered() == ["c0"]).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.sender.delivered(), ["c0"]);
    assert_eq!(h.store.pending_count_for_group("analytics").await.unwrap(), 3);

    h.group
        .set_group_enabled("analytics", true, false)
        .await
        .unwrap();
    assert!(eventually(|| h.sender.delivered() == ["c0", "a0", "a1", "a2"]).await);
    h.group.shutdown().await;
}

// ============================================================================
// Pipeline enablement
// ============================================================================

#[tokio::test]
async fn test_pipeline_disable_without_delete_keeps_records() {
    let h = harness(channels(10, 5), retry(3)).await;
    h.group.start().await.unwrap();
    h.group.pause_all();
    h.submit("g", "kept", Priority::Background).await;

    h.group.set_enabled(false, false).await.unwrap();
    assert!(!h.group.is_enabled());
    let outcome = h
        .group
        .submit("g", event("dropped"), Priority::Background, PersistencePolicy::NORMAL)
        .await
        .unwrap();
    assert_eq!(outcome, Enqueued::Dropped);
    assert_eq!(
        h.group.channel(Priority::Background).state(),
        ChannelState::Idle
    );

    h.group.set_enabled(true, false).await.unwrap();
    assert!(eventually(|| h.sender.delivered() == ["kept"]).await);
    h.group.shutdown().await;
}

#[tokio::test]
async fn test_pipeline_disable_with_delete_purges_everything() {
    let h = harness(channels(10, 60_000), retry(3)).await;
    h.submit("g", "a", Priority::Background).await;
    h.submit("g", "b", Priority::Default).await;
    h.submit("g", "c", Priority::High).await;

    h.group.set_enabled(false, true).await.unwrap();

    for priority in Priority::DRAIN_ORDER {
        assert_eq!(h.store.pending_count(priority).await.unwrap(), 0);
        assert_eq!(h.group.channel(priority).pending_count(), 0);
    }
    assert_eq!(h.store.used_bytes().await.unwrap(), 0);
}

// ============================================================================
// Destructive disable racing a submission
// ============================================================================

/// Group whose store takes 100 ms per persist
async fn slow_group() -> (Arc<ChannelGroup>, Arc<SlowStore>) {
    let store = SlowStore::new(Duration::from_millis(100)).await;
    let group = ChannelGroup::builder(store.clone(), RecordingSender::new())
        .channels(channels(100, 60_000))
        .retry(retry(3))
        .build();
    (group, store)
}

#[tokio::test]
async fn test_group_purge_covers_submission_still_persisting() {
    let (group, store) = slow_group().await;
    let submitting = {
        let group = Arc::clone(&group);
        tokio::spawn(async move {
            group
                .submit("analytics", event("racing"), Priority::Default, PersistencePolicy::NORMAL)
                .await
        })
    };
    assert!(eventually(|| store.persists_started() == 1).await);

    group
        .set_group_enabled("analytics", false, true)
        .await
        .unwrap();

    let outcome = submitting.await.unwrap().unwrap();
    assert!(matches!(outcome, Enqueued::Persisted { .. }));
    assert_eq!(store.inner.pending_count_for_group("analytics").await.unwrap(), 0);
    assert_eq!(group.channel(Priority::Default).pending_count(), 0);

    // Nothing resurfaces once the group is back
    group
        .set_group_enabled("analytics", true, false)
        .await
        .unwrap();
    assert_eq!(store.inner.pending_count(Priority::Default).await.unwrap(), 0);
}

#[tokio::test]
async fn test_channel_purge_covers_submission_still_persisting() {
    let (group, store) = slow_group().await;
    let submitting = {
        let group = Arc::clone(&group);
        tokio::spawn(async move {
            group
                .submit("analytics", event("racing"), Priority::High, PersistencePolicy::NORMAL)
                .await
        })
    };
    assert!(eventually(|| store.persists_started() == 1).await);

    let purged = group
        .channel(Priority::High)
        .set_enabled(false, true)
        .await
        .unwrap();

    assert!(matches!(
        submitting.await.unwrap().unwrap(),
        Enqueued::Persisted { .. }
    ));
    assert_eq!(purged, 1);
    assert_eq!(store.inner.pending_count(Priority::High).await.unwrap(), 0);
    assert_eq!(group.channel(Priority::High).pending_count(), 0);

    let late = group
        .submit("analytics", event("late"), Priority::High, PersistencePolicy::NORMAL)
        .await
        .unwrap();
    assert_eq!(late, Enqueued::Dropped);
    assert_eq!(store.persists_started(), 1);
}
