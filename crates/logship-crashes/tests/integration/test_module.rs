//! Crashes module lifecycle and enablement

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use logship_core::domain::{CrashState, InitializationPriority, Priority};
use logship_core::ports::{Enable, ILogStore, IModule};
use logship_crashes::{CrashHandlerSetupDelegate, CrashesModule, CRASHES_GROUP};

use crate::common::{write_crash, Harness};

#[derive(Default)]
struct CountingDelegate {
    will: AtomicUsize,
    did: AtomicUsize,
}

impl CrashHandlerSetupDelegate for CountingDelegate {
    fn will_set_up_crash_handlers(&self) {
        self.will.fetch_add(1, Ordering::SeqCst);
    }

    fn should_install_panic_hook(&self) -> bool {
        false
    }

    fn did_set_up_crash_handlers(&self) {
        self.did.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_module_identity() {
    let h = Harness::new().await;
    let module = h.module(true, false);
    assert_eq!(module.name(), CRASHES_GROUP);
    assert_eq!(module.initialization_priority(), InitializationPriority::Max);
    assert!(module.is_enabled());
}

#[tokio::test]
async fn test_delegate_notified_around_setup() {
    let h = Harness::new().await;
    // Panic hook installation enabled, but vetoed by the delegate
    let module = CrashesModule::new(h.group.clone(), &h.config(true, false));
    let first = Arc::new(CountingDelegate::default());
    let second = Arc::new(CountingDelegate::default());
    module.set_crash_handler_setup_delegate(Some(first.clone()));
    module.set_crash_handler_setup_delegate(Some(second.clone()));

    module.start().await.unwrap();
    module.start().await.unwrap();

    assert_eq!(first.will.load(Ordering::SeqCst), 0);
    assert_eq!(second.will.load(Ordering::SeqCst), 1);
    assert_eq!(second.did.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_disable_with_delete_purges_records_and_files() {
    let h = Harness::new().await;
    let config = h.config(true, false);
    write_crash(&config.reports_dir, "sent before disable");

    let module = h.module(true, false);
    module.start().await.unwrap();
    assert_eq!(h.store.pending_count_for_group(CRASHES_GROUP).await.unwrap(), 1);

    // Written by a later panic, not yet scanned
    write_crash(&config.reports_dir, "not yet scanned");
    module.set_enabled(false, true).await.unwrap();

    assert!(!module.is_enabled());
    assert_eq!(h.store.pending_count_for_group(CRASHES_GROUP).await.unwrap(), 0);
    assert_eq!(h.crash_files(), 0);
}

#[tokio::test]
async fn test_reenable_picks_up_crashes_written_while_disabled() {
    let h = Harness::new().await;
    let config = h.config(true, false);
    let module = h.module(true, false);
    module.start().await.unwrap();

    module.set_enabled(false, false).await.unwrap();
    let id = write_crash(&config.reports_dir, "while disabled");
    module.set_enabled(true, false).await.unwrap();

    assert_eq!(module.workflow().state(id), Some(CrashState::Sent));
    assert_eq!(h.store.pending_count(Priority::High).await.unwrap(), 1);
}

#[tokio::test]
async fn test_disabled_module_skips_startup_scan() {
    let h = Harness::new().await;
    let config = h.config(false, false);
    write_crash(&config.reports_dir, "left alone");

    let module = h.module(false, false);
    module.set_enabled(false, false).await.unwrap();
    module.start().await.unwrap();

    let unprocessed = tokio::time::timeout(
        std::time::Duration::from_secs(1),
        module.workflow().unprocessed_crash_reports(),
    )
    .await
    .expect("startup signal completed");
    assert!(unprocessed.is_empty());
    assert_eq!(h.crash_files(), 1);
}
