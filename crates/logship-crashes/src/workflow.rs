//! Crash processing workflow
//!
//! Tracks every crash found by the startup scan and advances it through
//! [`CrashState`]:
//!
//! ```text
//!  Captured ──► AwaitingDecision ──► PendingUserConfirmation
//!     │               │                      │
//!     │               ▼                      ▼
//!     └─────────► AutomaticSend ──► Sent    Discarded
//! ```
//!
//! - With automatic processing on, captures go straight to `AutomaticSend`,
//!   or to `PendingUserConfirmation` when user confirmation is required.
//! - With automatic processing off, captures stop at `AwaitingDecision` and
//!   the host picks what to send with
//!   [`CrashWorkflow::send_crash_reports_or_await_user_confirmation_for_filtered_ids`].
//! - Once the user chose "always send", later captures skip every decision.
//!
//! A sent report is enqueued as a `Critical` crash log on the `High`
//! channel, after which its raw crash file is deleted; the store owns the
//! bytes from then on. Discarding deletes the raw file too.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use logship_core::config::CrashesConfig;
use logship_core::diagnostics::{self, LogLevel, TAG_CRASHES};
use logship_core::domain::{
    CrashState, ErrorAttachmentLog, ErrorReport, IncidentId, IngestionError, Log,
    PersistencePolicy, Priority,
};
use logship_core::ports::{Enqueued, ILogSink};

use crate::capture::CrashRecord;
use crate::error::Result;
use crate::store::CrashReportStore;

/// Group that crash and attachment logs are tagged with
pub const CRASHES_GROUP: &str = "crashes";

/// Answer of the end user to a pending confirmation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserConfirmation {
    /// Send the pending reports
    Send,
    /// Discard the pending reports
    DontSend,
    /// Send them, and every future report without asking
    AlwaysSend,
}

struct TrackedReport {
    report: ErrorReport,
    state: CrashState,
}

/// Crash report state machine and its registry
pub struct CrashWorkflow {
    store: CrashReportStore,
    sink: Arc<dyn ILogSink>,
    reports: DashMap<IncidentId, TrackedReport>,
    automatic_processing: AtomicBool,
    await_user_confirmation: AtomicBool,
    always_send: AtomicBool,
    /// Flips to `true` once the startup scan has finished
    scan_complete: watch::Sender<bool>,
}

impl CrashWorkflow {
    /// Creates a workflow reading raw crash files from `store`.
    ///
    /// The persisted always-send preference is loaded here.
    pub fn new(store: CrashReportStore, sink: Arc<dyn ILogSink>, config: &CrashesConfig) -> Self {
        let always_send = store.always_send();
        let (scan_complete, _) = watch::channel(false);
        Self {
            store,
            sink,
            reports: DashMap::new(),
            automatic_processing: AtomicBool::new(config.automatic_processing),
            await_user_confirmation: AtomicBool::new(config.await_user_confirmation),
            always_send: AtomicBool::new(always_send),
            scan_complete,
        }
    }

    /// The raw crash file store
    pub fn store(&self) -> &CrashReportStore {
        &self.store
    }

    // ========================================================================
    // Settings
    // ========================================================================

    /// Controls whether new captures are sent without host intervention
    pub fn set_automatic_processing(&self, enabled: bool) {
        self.automatic_processing.store(enabled, Ordering::SeqCst);
    }

    pub fn automatic_processing(&self) -> bool {
        self.automatic_processing.load(Ordering::SeqCst)
    }

    /// Controls whether approved reports wait for the end user first
    pub fn set_await_user_confirmation(&self, enabled: bool) {
        self.await_user_confirmation.store(enabled, Ordering::SeqCst);
    }

    /// The "always send" preference
    pub fn always_send(&self) -> bool {
        self.always_send.load(Ordering::SeqCst)
    }

    fn must_confirm(&self) -> bool {
        self.await_user_confirmation.load(Ordering::SeqCst) && !self.always_send()
    }

    // ========================================================================
    // Capture
    // ========================================================================

    /// Scans the crash directory for crashes of the previous session and
    /// processes them. Completes the startup signal even when the scan fails.
    pub async fn process_startup_crashes(&self) -> Result<usize> {
        let result = self.scan().await;
        self.scan_complete.send_replace(true);
        result
    }

    /// Completes the startup signal without looking for crashes
    pub fn skip_startup_scan(&self) {
        self.scan_complete.send_replace(true);
    }

    async fn scan(&self) -> Result<usize> {
        let captured_at = Utc::now();
        let mut captured = Vec::new();

        for entry in self.store.list()? {
            match self.store.read(&entry) {
                Ok(record) => captured.push(self.track(record.to_report(captured_at))),
                Err(e) => {
                    warn!(path = %entry.path.display(), error = %e, "Discarding unreadable crash record");
                    if let Err(e) = self.store.remove(&entry) {
                        warn!(error = %e, "Failed to delete unreadable crash record");
                    }
                }
            }
        }

        if !captured.is_empty() {
            info!(count = captured.len(), "Captured crash reports from previous session");
        }
        for id in &captured {
            self.advance_captured(*id).await;
        }
        Ok(captured.len())
    }

    /// Tracks a crash detected after the startup scan and processes it
    /// according to the current settings
    pub async fn capture(&self, record: CrashRecord) -> IncidentId {
        let id = self.track(record.to_report(Utc::now()));
        self.advance_captured(id).await;
        id
    }

    fn track(&self, report: ErrorReport) -> IncidentId {
        let id = report.incident_identifier;
        self.reports.entry(id).or_insert(TrackedReport {
            report,
            state: CrashState::Captured,
        });
        id
    }

    async fn advance_captured(&self, id: IncidentId) {
        if self.state(id) != Some(CrashState::Captured) {
            return;
        }

        if self.always_send() {
            self.send_report(id).await;
        } else if !self.automatic_processing() {
            self.transition(id, CrashState::AwaitingDecision);
        } else if self.must_confirm() {
            self.transition(id, CrashState::AwaitingDecision);
            self.transition(id, CrashState::PendingUserConfirmation);
        } else {
            self.send_report(id).await;
        }
    }

    // ========================================================================
    // Decisions
    // ========================================================================

    /// Resolves once the startup scan has completed
    pub async fn wait_for_startup_scan(&self) {
        let mut rx = self.scan_complete.subscribe();
        // The sender lives as long as `self`, so this cannot fail
        let _ = rx.wait_for(|done| *done).await;
    }

    /// Reports waiting for the host's decision, oldest crash first.
    ///
    /// Waits for the startup scan to complete.
    pub async fn unprocessed_crash_reports(&self) -> Vec<ErrorReport> {
        self.wait_for_startup_scan().await;
        let mut reports: Vec<ErrorReport> = self
            .reports
            .iter()
            .filter(|entry| entry.state == CrashState::AwaitingDecision)
            .map(|entry| entry.report.clone())
            .collect();
        reports.sort_by_key(|r| r.crash_time);
        reports
    }

    /// Sends the undecided reports listed in `ids` and discards every other
    /// undecided report. When user confirmation is required, the listed
    /// reports wait for [`notify_user_confirmation`](Self::notify_user_confirmation)
    /// instead of being sent.
    ///
    /// Returns the "always send" preference.
    pub async fn send_crash_reports_or_await_user_confirmation_for_filtered_ids(
        &self,
        ids: &[IncidentId],
    ) -> bool {
        self.wait_for_startup_scan().await;

        for id in self.ids_in(&[CrashState::Captured, CrashState::AwaitingDecision]) {
            if !ids.contains(&id) {
                self.discard(id);
            } else if self.must_confirm() {
                self.transition(id, CrashState::AwaitingDecision);
                self.transition(id, CrashState::PendingUserConfirmation);
            } else {
                self.send_report(id).await;
            }
        }
        self.always_send()
    }

    /// Resolves every report pending user confirmation. Returns how many
    /// reports were resolved.
    pub async fn notify_user_confirmation(&self, confirmation: UserConfirmation) -> usize {
        if confirmation == UserConfirmation::AlwaysSend {
            self.always_send.store(true, Ordering::SeqCst);
            if let Err(e) = self.store.set_always_send(true) {
                warn!(error = %e, "Failed to persist always-send preference");
            }
        }

        let pending = self.ids_in(&[CrashState::PendingUserConfirmation]);
        for id in &pending {
            match confirmation {
                UserConfirmation::DontSend => self.discard(*id),
                UserConfirmation::Send | UserConfirmation::AlwaysSend => {
                    self.send_report(*id).await;
                }
            }
        }
        debug!(?confirmation, count = pending.len(), "User confirmation applied");
        pending.len()
    }

    /// Discards every undecided report and deletes all raw crash files
    pub fn discard_all(&self) -> usize {
        let undecided = self.ids_in(&[
            CrashState::Captured,
            CrashState::AwaitingDecision,
            CrashState::PendingUserConfirmation,
        ]);
        for id in &undecided {
            self.discard(*id);
        }
        if let Err(e) = self.store.delete_all() {
            warn!(error = %e, "Failed to delete crash records");
        }
        undecided.len()
    }

    // ========================================================================
    // Attachments
    // ========================================================================

    /// Enqueues attachments for a report that is being sent or was sent.
    ///
    /// # Errors
    ///
    /// `IngestionError::UnknownReport` when the incident is unknown, was
    /// discarded, or has not been approved for sending. Submission errors
    /// are returned as they are.
    pub async fn send_error_attachments(
        &self,
        attachments: Vec<ErrorAttachmentLog>,
        incident_id: IncidentId,
    ) -> std::result::Result<usize, IngestionError> {
        let approved = self.state(incident_id).is_some_and(|s| s.is_send_approved());
        if !approved {
            diagnostics::emit(LogLevel::Warning, TAG_CRASHES, || {
                format!("Ignoring attachments for unknown crash report {incident_id}")
            });
            return Err(IngestionError::UnknownReport(incident_id));
        }

        let mut enqueued = 0;
        for attachment in attachments {
            let attachment = attachment.for_incident(incident_id);
            let log = Log::attachment(attachment.clone());
            let outcome = self
                .sink
                .submit(CRASHES_GROUP, log, Priority::High, PersistencePolicy::CRITICAL)
                .await?;
            if let Enqueued::Persisted { .. } = outcome {
                enqueued += 1;
                if let Some(mut entry) = self.reports.get_mut(&incident_id) {
                    entry.report.attachments.push(attachment);
                }
            }
        }
        debug!(incident = %incident_id, count = enqueued, "Enqueued crash attachments");
        Ok(enqueued)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Current state of a tracked report
    pub fn state(&self, id: IncidentId) -> Option<CrashState> {
        self.reports.get(&id).map(|entry| entry.state)
    }

    /// Snapshot of every tracked report with its state
    pub fn reports(&self) -> Vec<(ErrorReport, CrashState)> {
        let mut reports: Vec<_> = self
            .reports
            .iter()
            .map(|entry| (entry.report.clone(), entry.state))
            .collect();
        reports.sort_by_key(|(r, _)| r.crash_time);
        reports
    }

    fn ids_in(&self, states: &[CrashState]) -> Vec<IncidentId> {
        let mut found: Vec<(IncidentId, chrono::DateTime<Utc>)> = self
            .reports
            .iter()
            .filter(|entry| states.contains(&entry.state))
            .map(|entry| (*entry.key(), entry.report.crash_time))
            .collect();
        found.sort_by_key(|(_, crash_time)| *crash_time);
        found.into_iter().map(|(id, _)| id).collect()
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    /// Moves a report to `next` if that is a legal step; returns a copy of
    /// the report on success
    fn transition(&self, id: IncidentId, next: CrashState) -> Option<ErrorReport> {
        let mut entry = self.reports.get_mut(&id)?;
        if !entry.state.can_transition_to(next) {
            return None;
        }
        debug!(incident = %id, from = %entry.state, to = %next, "Crash report transition");
        entry.state = next;
        Some(entry.report.clone())
    }

    /// `* -> AutomaticSend -> Sent`. A report that cannot be enqueued stays
    /// at `AutomaticSend` and keeps its raw file for the next start.
    async fn send_report(&self, id: IncidentId) -> bool {
        let Some(report) = self.transition(id, CrashState::AutomaticSend) else {
            return false;
        };

        let log = Log::crash(report.to_crash_log());
        match self
            .sink
            .submit(CRASHES_GROUP, log, Priority::High, PersistencePolicy::CRITICAL)
            .await
        {
            Ok(Enqueued::Persisted { handle, .. }) => {
                self.transition(id, CrashState::Sent);
                self.reclaim(id);
                info!(incident = %id, handle = %handle, "Crash report enqueued");
                true
            }
            Ok(Enqueued::Dropped) => {
                warn!(incident = %id, "Crash report dropped by disabled pipeline");
                false
            }
            Err(e) => {
                diagnostics::emit(LogLevel::Error, TAG_CRASHES, || {
                    format!("Failed to enqueue crash report {id}: {e}")
                });
                false
            }
        }
    }

    fn discard(&self, id: IncidentId) {
        if self.transition(id, CrashState::Discarded).is_some() {
            self.reclaim(id);
            info!(incident = %id, "Crash report discarded");
        }
    }

    /// Deletes the raw crash file of a report that left the undecided states
    fn reclaim(&self, id: IncidentId) {
        if let Err(e) = self.store.delete(&id.to_string()) {
            warn!(incident = %id, error = %e, "Failed to delete crash record");
        }
    }
}
