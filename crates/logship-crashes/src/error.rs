//! Crash module error types

use thiserror::Error;

use logship_core::domain::IngestionError;

/// Errors raised while reading or writing crash records
#[derive(Debug, Error)]
pub enum CrashError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Ingestion(#[from] IngestionError),
}

pub type Result<T> = std::result::Result<T, CrashError>;
