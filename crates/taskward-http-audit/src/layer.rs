//! Tower middleware capturing inbound exchanges for audit.

use crate::body::{Capture, TeeBody};
use crate::metrics::{AuditMetrics, NoopMetrics};
use crate::path::{Direction, Phase};
use crate::snapshot::{RequestSnapshot, ResponseSnapshot};
use crate::HttpAuditLogger;
use axum::body::Body;
use axum::extract::Request;
use axum::http::Response;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use taskward_audit_capture::CorrelationContext;
use tower::{Layer, Service};
use tracing::{debug, info_span, Instrument};

/// Header carrying the caller's request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Layer producing up to two audit events per exchange: one for the request,
/// one for the response.
///
/// Bodies are teed as they stream, so neither the handler nor the client
/// sees any difference.
#[derive(Clone)]
pub struct AuditLayer {
    logger: Arc<HttpAuditLogger>,
    metrics: Arc<dyn AuditMetrics>,
}

impl AuditLayer {
    pub fn new(logger: Arc<HttpAuditLogger>) -> Self {
        Self {
            logger,
            metrics: Arc::new(NoopMetrics),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn AuditMetrics>) -> Self {
        self.metrics = metrics;
        self
    }
}

impl<S> Layer<S> for AuditLayer {
    type Service = AuditMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuditMiddleware {
            inner,
            logger: Arc::clone(&self.logger),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

#[derive(Clone)]
pub struct AuditMiddleware<S> {
    inner: S,
    logger: Arc<HttpAuditLogger>,
    metrics: Arc<dyn AuditMetrics>,
}

impl<S> Service<Request> for AuditMiddleware<S>
where
    S: Service<Request, Response = Response<Body>, Error = std::convert::Infallible>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        // Take the instance that was driven to readiness.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let logger = Arc::clone(&self.logger);
        let metrics = Arc::clone(&self.metrics);

        let request_id = req
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let span = info_span!(
            "audit",
            request_id = %request_id,
            method = %req.method(),
            path = %req.uri().path(),
        );
        let context = CorrelationContext::from_span(span.clone()).with_request_id(request_id);

        let (parts, body) = req.into_parts();
        let request = RequestSnapshot::from_parts(&parts, bytes::Bytes::new());
        let (body, request_capture) = if logger.options().disable_request_audit_logs {
            (body, None)
        } else {
            let capture = Capture::new();
            (Body::new(TeeBody::new(body, capture.clone())), Some(capture))
        };
        let req = Request::from_parts(parts, body);

        Box::pin(
            async move {
                let response = inner.call(req).await?;

                if let Some(capture) = request_capture {
                    match capture.bytes() {
                        Some(body) => submit(
                            &logger,
                            &metrics,
                            Phase::Request,
                            context.clone(),
                            Audited::Request(RequestSnapshot {
                                body,
                                ..request.clone()
                            }),
                        ),
                        None => {
                            debug!("Request body failed, skipping request audit.");
                            metrics.capture_failed(Phase::Request);
                        }
                    }
                }

                if logger.options().disable_response_audit_logs {
                    return Ok(response);
                }

                let (parts, body) = response.into_parts();
                let head = ResponseSnapshot::from_parts(request, &parts, bytes::Bytes::new());
                let tee = TeeBody::new(body, Capture::new()).on_finish(move |captured| {
                    match captured {
                        Some(body) => submit(
                            &logger,
                            &metrics,
                            Phase::Response,
                            context,
                            Audited::Response(ResponseSnapshot { body, ..head }),
                        ),
                        None => {
                            debug!("Response body failed, skipping response audit.");
                            metrics.capture_failed(Phase::Response);
                        }
                    }
                });
                Ok(Response::from_parts(parts, Body::new(tee)))
            }
            .instrument(span),
        )
    }
}

enum Audited {
    Request(RequestSnapshot),
    Response(ResponseSnapshot),
}

fn submit(
    logger: &Arc<HttpAuditLogger>,
    metrics: &Arc<dyn AuditMetrics>,
    phase: Phase,
    context: CorrelationContext,
    audited: Audited,
) {
    let logger_ref = Arc::clone(logger);
    let metrics = Arc::clone(metrics);
    logger.track(async move {
        let direction = Direction::Inbound;
        let result = match &audited {
            Audited::Request(request) => logger_ref.log_request(context, &direction, request).await,
            Audited::Response(response) => {
                logger_ref.log_response(context, &direction, response).await
            }
        };
        match result {
            Ok(()) => metrics.event_submitted(phase),
            Err(err) => {
                debug!(error = %err, phase = %phase, "Audit event rejected.");
                metrics.event_rejected(phase);
            }
        }
    });
}
