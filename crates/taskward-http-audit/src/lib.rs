//! HTTP audit capture for Taskward.
//!
//! [`AuditLayer`] wraps an axum/tower service and reports each exchange to an
//! [`HttpAuditLogger`] as a request event and a response event. Bodies are
//! mirrored while they stream ([`TeeBody`]) and redacted
//! ([`RedactionOptions`]) before anything is queued.
//!
//! Identifiers look like `in/users/~/GET/request`; see [`PathTemplates`].

mod body;
mod error;
mod layer;
mod logger;
mod metrics;
mod path;
mod redaction;
mod snapshot;

pub use body::{Capture, TeeBody};
pub use error::{BoxError, RedactionError};
pub use layer::{AuditLayer, AuditMiddleware, REQUEST_ID_HEADER};
pub use logger::{HttpAuditLogOptions, HttpAuditLogger, SUBMISSION_DRAIN_TIMEOUT};
pub use metrics::{AuditMetrics, CountingMetrics, NoopMetrics};
pub use path::{Direction, PathTemplates, Phase, WILDCARD};
pub use redaction::{RedactionOptions, REDACTED};
pub use snapshot::{read_body, RequestSnapshot, ResponseSnapshot};
