//! Event writer backed by `tracing`.

use crate::{EventWriter, SinkError, WriteReceipt};
use async_trait::async_trait;
use serde_json::Value;
use taskward_audit_types::{Event, FormatError};
use tracing::{debug, info, Dispatch};

const MESSAGE: &str = "Audit event.";

/// Writes each audit event as an INFO record.
///
/// Mostly useful in tests and local development where an
/// [`AuditLogger`](crate::AuditLogger) is required but nothing should leave
/// the process. The event timestamp is deliberately left out so output is
/// deterministic.
#[derive(Clone, Default)]
pub struct LogWriter {
    dispatch: Option<Dispatch>,
}

impl LogWriter {
    /// Log through whatever subscriber is current when the event is written.
    pub fn new() -> Self {
        Self::default()
    }

    /// Log through a specific subscriber.
    pub fn with_dispatch(dispatch: Dispatch) -> Self {
        Self {
            dispatch: Some(dispatch),
        }
    }

    fn emit(&self, f: impl FnOnce()) {
        match &self.dispatch {
            Some(dispatch) => tracing::dispatcher::with_default(dispatch, f),
            None => f(),
        }
    }
}

#[async_trait]
impl EventWriter for LogWriter {
    async fn receive_event(&self, event: &Event) -> Result<WriteReceipt, SinkError> {
        let metadata = serde_json::to_string(event.metadata()).map_err(FormatError::from)?;

        self.emit(|| {
            info!(
                identifier = %event.identifier(),
                metadata = %metadata,
                "{MESSAGE}"
            )
        });

        let mut receipt = WriteReceipt::new();
        receipt.insert("message".to_string(), Value::String(MESSAGE.to_string()));
        Ok(receipt)
    }

    async fn close(&self) {
        self.emit(|| debug!("audit log writer closed"));
    }
}
