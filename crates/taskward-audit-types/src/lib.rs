//! Audit event types for Taskward.
//!
//! An [`Event`] is the immutable unit handed to the audit pipeline. On the
//! wire it is a single flat JSON object: the reserved `identifier` and
//! `event_timestamp` fields plus one top-level field per [`Metadata`] entry.

mod error;
mod event;
mod metadata;

pub use error::FormatError;
pub use event::{Event, EVENT_TIMESTAMP_KEY, IDENTIFIER_KEY, RESERVED_KEYS};
pub use metadata::Metadata;

/// Metadata values are plain JSON values.
pub use serde_json::Value;
