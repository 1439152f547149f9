//! Domain error types
//!
//! This module defines the error taxonomy of the ingestion pipeline:
//! submission failures, storage failures and transport failures.
//! Only [`IngestionError::InvalidContainer`] and [`IngestionError::StorageFull`]
//! ever reach a producer synchronously; everything else is handled by the
//! channel state machine or reported through the diagnostics handler.

use std::time::Duration;

use thiserror::Error;

use super::newtypes::IncidentId;
use super::priority::Priority;

/// Errors surfaced by the ingestion core
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IngestionError {
    /// The record is malformed (e.g. an event without an event id)
    #[error("Invalid container: {0}")]
    InvalidContainer(String),

    /// The persistence store refused the record
    #[error("Storage full for {priority} partition")]
    StorageFull {
        /// Partition the record was submitted to
        priority: Priority,
    },

    /// The transport is paused (e.g. no connectivity)
    #[error("Connection paused")]
    ConnectionPaused,

    /// The collector answered with a non-success HTTP status
    #[error("Connection failed with HTTP status {code}")]
    ConnectionHttpError {
        /// Numeric HTTP status
        code: u16,
    },

    /// Attachment association on an unknown or discarded crash report
    #[error("Unknown crash report: {0}")]
    UnknownReport(IncidentId),

    /// Invalid module or pipeline configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Unexpected storage backend failure
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Errors returned by an [`ILogStore`](crate::ports::ILogStore) implementation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The record does not fit, even after evicting every evictable `Normal` record
    #[error("Storage full: {requested_bytes} bytes requested for {priority} partition")]
    StorageFull {
        /// Partition the record was destined for
        priority: Priority,
        /// Serialized size of the rejected record
        requested_bytes: u64,
    },

    /// The storage backend failed
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// A record could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<StoreError> for IngestionError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::StorageFull { priority, .. } => IngestionError::StorageFull { priority },
            other => IngestionError::Storage(other.to_string()),
        }
    }
}

/// Errors reported by an [`ISender`](crate::ports::ISender) implementation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The transport refuses to send right now (offline, paused)
    #[error("Connection paused")]
    ConnectionPaused,

    /// The collector answered with a non-success status
    #[error("HTTP error {code}")]
    ConnectionHttpError {
        /// Numeric HTTP status
        code: u16,
        /// Server-provided `Retry-After` hint, if any
        retry_after: Option<Duration>,
    },

    /// Network-level failure (DNS, connect, reset, timeout)
    #[error("Network error: {0}")]
    Network(String),

    /// The send was cancelled by `pause()` or shutdown
    #[error("Send cancelled")]
    Cancelled,

    /// The collector response could not be understood
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl TransportError {
    /// Creates an HTTP error without a retry hint
    pub fn http(code: u16) -> Self {
        TransportError::ConnectionHttpError {
            code,
            retry_after: None,
        }
    }

    /// Whether a batch failing with this error should be retried.
    ///
    /// Status 5xx and 429 are recoverable, any other 4xx is fatal. Network
    /// failures, pauses and cancellations are always recoverable.
    pub fn is_recoverable(&self) -> bool {
        match self {
            TransportError::ConnectionPaused
            | TransportError::Network(_)
            | TransportError::Cancelled => true,
            TransportError::ConnectionHttpError { code, .. } => is_recoverable_status(*code),
            TransportError::InvalidResponse(_) => false,
        }
    }

    /// The server-provided retry delay, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            TransportError::ConnectionHttpError { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl From<TransportError> for IngestionError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::ConnectionPaused => IngestionError::ConnectionPaused,
            TransportError::ConnectionHttpError { code, .. } => {
                IngestionError::ConnectionHttpError { code }
            }
            other => IngestionError::Storage(other.to_string()),
        }
    }
}

/// Classifies an HTTP status code for retry purposes
pub fn is_recoverable_status(code: u16) -> bool {
    code >= 500 || code == 429
}
