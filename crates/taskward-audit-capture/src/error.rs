//! Error types for the audit bus and its writers.

use crate::sinks::ObjectStoreError;
use taskward_audit_types::FormatError;
use thiserror::Error;

/// Errors returned to producers by the audit logger.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit logger is closed")]
    Closed,

    #[error("audit queue is full")]
    Full,

    #[error("invalid audit event: {0}")]
    Format(#[from] FormatError),
}

/// Errors raised by an [`EventWriter`](crate::EventWriter).
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to encode audit event: {0}")]
    Encode(#[from] FormatError),

    #[error("failed to store audit event: {0}")]
    Store(#[from] ObjectStoreError),

    #[error("{0}")]
    Other(String),
}

/// Errors raised while constructing a writer.
#[derive(Debug, Error)]
pub enum WriterConfigError {
    #[error("missing required config value: {0}")]
    MissingValue(&'static str),
}
