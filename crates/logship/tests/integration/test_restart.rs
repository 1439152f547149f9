//! Durability across restarts

use std::time::Duration;

use logship_core::domain::{InitializationPriority, Priority};
use logship_core::ports::ILogStore;

use crate::common::{config, eventually, runtime, RecordingSender};

#[tokio::test]
async fn test_unsent_records_survive_shutdown() {
    let dir = tempfile::tempdir().unwrap();

    {
        let offline = RecordingSender::new();
        offline.set_offline(true);
        let logship = runtime(config(dir.path(), 10), &offline).await;
        let analytics = logship
            .add_module("analytics", InitializationPriority::Default)
            .unwrap();
        logship.start().await.unwrap();

        for i in 0..3 {
            analytics
                .track_event(&format!("e{i}"), Default::default())
                .await
                .unwrap();
        }
        logship.shutdown(Duration::from_millis(100)).await;
        assert!(offline.delivered().is_empty());
    }

    let online = RecordingSender::new();
    let logship = runtime(config(dir.path(), 10), &online).await;
    logship
        .add_module("analytics", InitializationPriority::Default)
        .unwrap();
    assert_eq!(
        logship.store().pending_count(Priority::Default).await.unwrap(),
        3
    );

    logship.start().await.unwrap();
    assert!(eventually(|| online.delivered() == ["e0", "e1", "e2"]).await);

    // A new process gets a new session; the old records keep theirs
    let old_sid = online.batches()[0].records[0].log.sid;
    assert!(old_sid.is_some());
    assert_ne!(old_sid, Some(logship.session_id()));
    logship.shutdown(Duration::from_secs(1)).await;
}
