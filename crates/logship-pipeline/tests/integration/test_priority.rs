//! Strict priority scheduling across channels

use logship_core::domain::Priority;

use crate::common::{channels, eventually, harness, retry};

/// Index of the last occurrence of `p` and the first occurrence of `q`
fn last_and_first(order: &[Priority], p: Priority, q: Priority) -> (usize, usize) {
    let last = order.iter().rposition(|x| *x == p).expect("p was sent");
    let first = order.iter().position(|x| *x == q).expect("q was sent");
    (last, first)
}

#[tokio::test]
async fn test_higher_priorities_drain_first() {
    let h = harness(channels(2, 1), retry(3)).await;
    h.group.start().await.unwrap();
    h.group.pause_all();

    for i in 0..5 {
        h.submit("g", &format!("bg{i}"), Priority::Background).await;
        h.submit("g", &format!("def{i}"), Priority::Default).await;
        h.submit("g", &format!("high{i}"), Priority::High).await;
    }
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(h.sender.attempt_count(), 0);

    h.group.resume_all();
    assert!(eventually(|| h.sender.delivered().len() == 15).await);

    let order = h.sender.priorities();
    let (last_high, first_default) = last_and_first(&order, Priority::High, Priority::Default);
    assert!(last_high < first_default, "order: {order:?}");
    let (last_default, first_bg) = last_and_first(&order, Priority::Default, Priority::Background);
    assert!(last_default < first_bg, "order: {order:?}");
    h.group.shutdown().await;
}

#[tokio::test]
async fn test_background_waits_while_high_keeps_arriving() {
    let h = harness(channels(2, 1), retry(3)).await;
    h.group.start().await.unwrap();
    h.group.pause_all();

    for i in 0..3 {
        h.submit("g", &format!("bg{i}"), Priority::Background).await;
    }
    h.submit("g", "high0", Priority::High).await;
    h.submit("g", "high1", Priority::High).await;

    // Hold the first High batch in flight while more High records arrive
    let release = h.sender.hold_next();
    h.group.resume_all();
    assert!(eventually(|| h.sender.attempt_count() == 1).await);
    for i in 2..7 {
        h.submit("g", &format!("high{i}"), Priority::High).await;
    }
    release.notify_one();

    assert!(eventually(|| h.sender.delivered().len() == 10).await);
    let order = h.sender.priorities();
    assert_eq!(order[0], Priority::High);
    let (last_high, first_bg) = last_and_first(&order, Priority::High, Priority::Background);
    assert!(last_high < first_bg, "order: {order:?}");

    let delivered = h.sender.delivered();
    let highs: Vec<_> = delivered.iter().filter(|n| n.starts_with("high")).collect();
    assert_eq!(highs.len(), 7);
    h.group.shutdown().await;
}

#[tokio::test]
async fn test_paused_high_does_not_block_lower_priorities() {
    let h = harness(channels(1, 1), retry(3)).await;
    h.group.start().await.unwrap();
    h.group.channel(Priority::High).pause();

    h.submit("g", "high0", Priority::High).await;
    h.submit("g", "bg0", Priority::Background).await;

    assert!(eventually(|| h.sender.delivered() == ["bg0"]).await);
    h.group.channel(Priority::High).resume();
    assert!(eventually(|| h.sender.delivered() == ["bg0", "high0"]).await);
    h.group.shutdown().await;
}
