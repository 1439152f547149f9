//! Crash workflow against the real pipeline

use logship_core::domain::{CrashState, ErrorAttachmentLog, LogKind, Priority};
use logship_core::ports::{IModule, ILogStore};
use logship_crashes::UserConfirmation;

use crate::common::{write_crash, Harness};

#[tokio::test]
async fn test_filtered_confirmation_sends_selected_reports_on_high() {
    let h = Harness::new().await;
    let config = h.config(false, false);
    let a = write_crash(&config.reports_dir, "a");
    let b = write_crash(&config.reports_dir, "b");
    let c = write_crash(&config.reports_dir, "c");

    let module = h.module(false, false);
    module.start().await.unwrap();
    let workflow = module.workflow();

    let unprocessed = workflow.unprocessed_crash_reports().await;
    assert_eq!(unprocessed.len(), 3);

    let always = workflow
        .send_crash_reports_or_await_user_confirmation_for_filtered_ids(&[a, c])
        .await;
    assert!(!always);

    for id in [a, c] {
        let records = h.store.records_for_incident(id).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].priority, Priority::High);
        assert!(records[0].policy.is_critical());
        assert!(matches!(records[0].log.kind, LogKind::Crash(_)));
    }
    assert!(h.store.records_for_incident(b).await.unwrap().is_empty());
    assert_eq!(workflow.state(b), Some(CrashState::Discarded));
    assert_eq!(h.store.pending_count(Priority::High).await.unwrap(), 2);
    assert_eq!(h.crash_files(), 0);
}

#[tokio::test]
async fn test_attachments_stored_with_parent_incident() {
    let h = Harness::new().await;
    let config = h.config(true, false);
    let id = write_crash(&config.reports_dir, "boom");

    let module = h.module(true, false);
    module.start().await.unwrap();
    assert_eq!(module.workflow().state(id), Some(CrashState::Sent));

    let attachments = vec![
        ErrorAttachmentLog::text(id, "last log lines", Some("tail.txt".into())),
        ErrorAttachmentLog::binary(id, &[0xde, 0xad], "application/octet-stream", None),
    ];
    let enqueued = module
        .workflow()
        .send_error_attachments(attachments, id)
        .await
        .unwrap();
    assert_eq!(enqueued, 2);

    let records = h.store.records_for_incident(id).await.unwrap();
    assert_eq!(records.len(), 3);
    assert!(matches!(records[0].log.kind, LogKind::Crash(_)));
    assert!(records[1..]
        .iter()
        .all(|r| matches!(r.log.kind, LogKind::ErrorAttachment(_))));
    assert_eq!(h.store.pending_count_for_group("crashes").await.unwrap(), 3);
}

#[tokio::test]
async fn test_user_confirmation_resolves_pending_reports() {
    let h = Harness::new().await;
    let config = h.config(true, true);
    let id = write_crash(&config.reports_dir, "boom");

    let module = h.module(true, true);
    module.start().await.unwrap();
    let workflow = module.workflow();
    assert_eq!(workflow.state(id), Some(CrashState::PendingUserConfirmation));
    assert_eq!(h.store.pending_count(Priority::High).await.unwrap(), 0);

    workflow
        .notify_user_confirmation(UserConfirmation::AlwaysSend)
        .await;
    assert_eq!(workflow.state(id), Some(CrashState::Sent));
    assert_eq!(h.store.pending_count(Priority::High).await.unwrap(), 1);
    assert!(workflow.store().always_send());
}
