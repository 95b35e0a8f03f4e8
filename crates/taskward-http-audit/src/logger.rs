//! HTTP-aware front end to the audit bus.

use crate::path::{Direction, PathTemplates, Phase};
use crate::snapshot::{RequestSnapshot, ResponseSnapshot};
use crate::RedactionOptions;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use taskward_audit_capture::{
    AuditConfig, AuditError, AuditLogger, CloseReport, CorrelationContext, EventWriter,
};
use tokio::sync::OnceCell;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// How long `close` waits for fire-and-forget submissions.
pub const SUBMISSION_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Options for [`HttpAuditLogger`].
#[derive(Debug, Clone, Default)]
pub struct HttpAuditLogOptions {
    /// Bus settings.
    pub audit: AuditConfig,
    /// Path templates used to normalize identifiers, e.g. `/users/{id}`.
    pub audit_path_params: Vec<String>,
    pub disable_request_audit_logs: bool,
    pub disable_response_audit_logs: bool,
    /// Applied to both requests and responses.
    pub redaction: RedactionOptions,
}

/// Turns HTTP exchanges into audit events.
///
/// Wraps an [`AuditLogger`] and tracks submissions spawned on behalf of the
/// capture layer so that [`close`](Self::close) can wait for them.
pub struct HttpAuditLogger {
    bus: AuditLogger,
    options: HttpAuditLogOptions,
    templates: PathTemplates,
    tracker: TaskTracker,
    closed: OnceCell<CloseReport>,
}

impl HttpAuditLogger {
    /// Open the bus with `writer` and install the default logging hooks.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(options: HttpAuditLogOptions, writer: Arc<dyn EventWriter>) -> Self {
        let bus = AuditLogger::open(options.audit.clone(), writer);

        bus.set_on_write(|ctx, receipt| {
            let receipt = Value::Object(receipt.clone());
            ctx.in_scope(|| {
                info!(
                    request_id = ctx.request_id(),
                    receipt = %receipt,
                    "Wrote audit log."
                )
            })
        });
        bus.set_on_error(|ctx, err| {
            ctx.in_scope(|| {
                info!(request_id = ctx.request_id(), error = %err, "Failed to write audit log.")
            })
        });

        Self {
            templates: PathTemplates::new(&options.audit_path_params),
            bus,
            options,
            tracker: TaskTracker::new(),
            closed: OnceCell::new(),
        }
    }

    pub fn options(&self) -> &HttpAuditLogOptions {
        &self.options
    }

    /// The underlying bus, e.g. to replace its hooks.
    pub fn bus(&self) -> &AuditLogger {
        &self.bus
    }

    /// Audit identifier for an exchange.
    pub fn identifier(&self, direction: &Direction, request: &RequestSnapshot, phase: Phase) -> String {
        self.templates
            .identifier(direction, &request.method, request.path(), phase)
    }

    /// Redact and write the request side of an exchange.
    pub async fn log_request(
        &self,
        context: CorrelationContext,
        direction: &Direction,
        request: &RequestSnapshot,
    ) -> Result<(), AuditError> {
        let id = self.identifier(direction, request, Phase::Request);
        let (body, headers) = self
            .options
            .redaction
            .redact(request.body.clone(), &request.headers);
        let metadata = request.metadata(&headers, &body);
        self.bus.write(context, id, metadata).await
    }

    /// Redact and write the response side of an exchange.
    pub async fn log_response(
        &self,
        context: CorrelationContext,
        direction: &Direction,
        response: &ResponseSnapshot,
    ) -> Result<(), AuditError> {
        let id = self.identifier(direction, &response.request, Phase::Response);
        let (body, headers) = self
            .options
            .redaction
            .redact(response.body.clone(), &response.headers);
        let metadata = response.metadata(&headers, &body);
        self.bus.write(context, id, metadata).await
    }

    /// Write the request side in the background.
    pub fn submit_request(
        self: &Arc<Self>,
        context: CorrelationContext,
        direction: Direction,
        request: RequestSnapshot,
    ) {
        let this = Arc::clone(self);
        self.track(async move {
            if let Err(err) = this.log_request(context, &direction, &request).await {
                debug!(error = %err, "Audit request event not submitted.");
            }
        });
    }

    /// Write the response side in the background.
    pub fn submit_response(
        self: &Arc<Self>,
        context: CorrelationContext,
        direction: Direction,
        response: ResponseSnapshot,
    ) {
        let this = Arc::clone(self);
        self.track(async move {
            if let Err(err) = this.log_response(context, &direction, &response).await {
                debug!(error = %err, "Audit response event not submitted.");
            }
        });
    }

    /// Spawn a submission the logger waits for on close.
    pub(crate) fn track<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                self.tracker.spawn_on(task, &handle);
            }
            Err(_) => warn!("No Tokio runtime available, dropping audit submission."),
        }
    }

    /// Submissions spawned but not yet finished.
    pub fn outstanding(&self) -> usize {
        self.tracker.len()
    }

    /// Close the logger.
    ///
    /// Waits up to two seconds for outstanding submissions, then closes the
    /// bus. Safe to call more than once.
    pub async fn close(&self) -> CloseReport {
        *self
            .closed
            .get_or_init(|| async {
                self.tracker.close();
                if tokio::time::timeout(SUBMISSION_DRAIN_TIMEOUT, self.tracker.wait())
                    .await
                    .is_err()
                {
                    warn!(
                        outstanding = self.tracker.len(),
                        "Audit submissions still running at close."
                    );
                }
                self.bus.close().await
            })
            .await
    }
}
