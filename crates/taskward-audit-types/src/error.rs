//! Event codec errors.

use thiserror::Error;

/// Errors raised while encoding or decoding audit events.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("metadata attempts to overwrite reserved key: {0}")]
    ReservedKey(String),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("field {field} has unexpected type, expected {expected}")]
    UnexpectedType {
        field: String,
        expected: &'static str,
    },

    #[error("invalid event timestamp: {0}")]
    InvalidTimestamp(#[from] chrono::ParseError),

    #[error("metadata must contain exactly one field, found {0}")]
    MetadataShape(usize),

    #[error("invalid event json: {0}")]
    Json(#[from] serde_json::Error),
}
