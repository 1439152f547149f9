//! Many producers on one partition while the worker drains

use std::collections::HashSet;
use std::sync::Arc;

use logship_core::domain::{PersistencePolicy, Priority};
use logship_core::ports::{ILogSink, ILogStore};

use crate::common::{channels, event, eventually, harness, retry};

const PRODUCERS: usize = 8;
const PER_PRODUCER: usize = 25;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_producers_delivered_once_in_producer_order() {
    let h = harness(channels(7, 5), retry(3)).await;
    h.group.start().await.unwrap();

    let mut tasks = Vec::new();
    for p in 0..PRODUCERS {
        let group = Arc::clone(&h.group);
        tasks.push(tokio::spawn(async move {
            for n in 0..PER_PRODUCER {
                group
                    .submit(
                        &format!("p{p}"),
                        event(&format!("p{p}-{n}")),
                        Priority::Default,
                        PersistencePolicy::NORMAL,
                    )
                    .await
                    .unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let total = PRODUCERS * PER_PRODUCER;
    assert!(eventually(|| h.sender.delivered().len() >= total).await);
    let delivered = h.sender.delivered();
    assert_eq!(delivered.len(), total);
    let unique: HashSet<&String> = delivered.iter().collect();
    assert_eq!(unique.len(), total);

    for p in 0..PRODUCERS {
        let prefix = format!("p{p}-");
        let sequence: Vec<usize> = delivered
            .iter()
            .filter_map(|name| name.strip_prefix(&prefix))
            .map(|n| n.parse().unwrap())
            .collect();
        assert_eq!(sequence, (0..PER_PRODUCER).collect::<Vec<_>>(), "producer {p}");
    }

    assert!(eventually(|| h.group.channel(Priority::Default).is_drained()).await);
    assert_eq!(h.store.pending_count(Priority::Default).await.unwrap(), 0);
    assert_eq!(h.store.loaned_count(), 0);
    h.group.shutdown().await;
}
