//! The persistence seam of the audit bus.

use crate::SinkError;
use async_trait::async_trait;
use serde_json::{Map, Value};
use taskward_audit_types::Event;

/// Result fields a writer reports after persisting an event
/// (for example the object location). Handed to the `on_write` hook.
pub type WriteReceipt = Map<String, Value>;

/// Controls what happens to an audit event once a worker dequeues it.
///
/// Workers call `receive_event` concurrently for different events, so
/// implementations must be safe to share across tasks.
#[async_trait]
pub trait EventWriter: Send + Sync {
    /// Persist one event.
    async fn receive_event(&self, event: &Event) -> Result<WriteReceipt, SinkError>;

    /// Called exactly once when the audit logger closes, to flush clients,
    /// sync files and the like.
    async fn close(&self) {}
}
