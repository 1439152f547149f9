//! Crash report types
//!
//! An [`ErrorReport`] is the in-memory view of one captured crash (an
//! incident). Its [`CrashState`] is advanced by the crash processing workflow
//! in `logship-crashes`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::log::{CrashLog, ErrorAttachmentLog, Properties};
use super::newtypes::IncidentId;

/// Processing state of a captured crash report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrashState {
    /// Found by the startup scan
    Captured,
    /// Waiting for the host application to decide
    AwaitingDecision,
    /// Waiting for the end user to confirm sending
    PendingUserConfirmation,
    /// Approved; being enqueued
    AutomaticSend,
    /// Enqueued to the high-priority channel
    Sent,
    /// Dropped; storage reclaimed
    Discarded,
}

impl CrashState {
    /// Whether the report has been approved for sending
    pub fn is_send_approved(&self) -> bool {
        matches!(self, CrashState::AutomaticSend | CrashState::Sent)
    }

    /// Whether the report still waits for a decision
    pub fn is_undecided(&self) -> bool {
        matches!(
            self,
            CrashState::Captured | CrashState::AwaitingDecision | CrashState::PendingUserConfirmation
        )
    }

    /// Whether `next` is a legal successor of this state
    pub fn can_transition_to(&self, next: CrashState) -> bool {
        use CrashState::*;
        matches!(
            (self, next),
            (Captured, AwaitingDecision)
                | (Captured, AutomaticSend)
                | (Captured, Discarded)
                | (AwaitingDecision, AutomaticSend)
                | (AwaitingDecision, PendingUserConfirmation)
                | (AwaitingDecision, Discarded)
                | (PendingUserConfirmation, AutomaticSend)
                | (PendingUserConfirmation, Discarded)
                | (AutomaticSend, Sent)
        )
    }
}

impl fmt::Display for CrashState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CrashState::Captured => "captured",
            CrashState::AwaitingDecision => "awaiting_decision",
            CrashState::PendingUserConfirmation => "pending_user_confirmation",
            CrashState::AutomaticSend => "automatic_send",
            CrashState::Sent => "sent",
            CrashState::Discarded => "discarded",
        };
        f.write_str(s)
    }
}

/// A captured crash and the attachments associated with it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub incident_identifier: IncidentId,
    /// When the crash happened (previous session)
    pub crash_time: DateTime<Utc>,
    /// When this process detected it
    pub captured_at: DateTime<Utc>,
    pub process: String,
    pub message: String,
    pub location: String,
    pub backtrace: String,
    #[serde(default)]
    pub attachments: Vec<ErrorAttachmentLog>,
}

impl ErrorReport {
    /// Builds the crash log that represents this report on the wire
    pub fn to_crash_log(&self) -> CrashLog {
        CrashLog {
            properties: Properties::new(),
            incident_id: self.incident_identifier,
            crash_time: self.crash_time,
            process: self.process.clone(),
            message: self.message.clone(),
            location: self.location.clone(),
            backtrace: self.backtrace.clone(),
        }
    }
}
