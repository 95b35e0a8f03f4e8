//! Taskward demo server.
//!
//! A small axum service with the audit capture layer mounted, wired from
//! [`ServiceConfig`]. Useful for trying sinks and redaction rules end to end.

pub mod routes;

use anyhow::Context as _;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use taskward_audit_capture::{
    AuditConfig, EventWriter, LogWriter, ObjectStorageConfig, ObjectStorageWriter,
};
use taskward_common_config::{AuditSettings, ServiceConfig, SinkKind};
use taskward_http_audit::{AuditLayer, HttpAuditLogOptions, HttpAuditLogger, RedactionOptions};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

pub use taskward_common_config::ServiceConfig as Config;

/// Server with an attached HTTP audit logger.
pub struct Server {
    config: ServiceConfig,
    audit: Arc<HttpAuditLogger>,
}

impl Server {
    /// Build the configured writer and open the audit logger.
    pub async fn new(config: ServiceConfig) -> anyhow::Result<Self> {
        let writer = build_writer(&config.audit).await?;
        Ok(Self::with_writer(config, writer))
    }

    /// Use an explicit writer instead of the configured sink.
    pub fn with_writer(config: ServiceConfig, writer: Arc<dyn EventWriter>) -> Self {
        let audit = Arc::new(HttpAuditLogger::new(http_audit_options(&config.audit), writer));
        Self { config, audit }
    }

    pub fn audit(&self) -> &Arc<HttpAuditLogger> {
        &self.audit
    }

    /// Routes with the audit and trace layers applied.
    pub fn router(&self) -> Router {
        routes::create_router()
            .layer(AuditLayer::new(Arc::clone(&self.audit)))
            .layer(TraceLayer::new_for_http())
    }

    /// Serve until Ctrl+C or SIGTERM, then flush the audit logger.
    pub async fn run(self) -> anyhow::Result<()> {
        let addr: SocketAddr = self
            .config
            .server
            .bind
            .parse()
            .with_context(|| format!("invalid bind address {:?}", self.config.server.bind))?;
        let listener = TcpListener::bind(addr).await?;
        info!(%addr, "Server listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        let report = self.audit.close().await;
        if report.timed_out {
            warn!(abandoned = report.abandoned, "Audit logger closed with events still queued");
        } else {
            info!("Audit logger flushed");
        }
        Ok(())
    }
}

/// Map audit settings onto capture options.
pub fn http_audit_options(settings: &AuditSettings) -> HttpAuditLogOptions {
    HttpAuditLogOptions {
        audit: AuditConfig {
            buffer_size: settings.buffer_size,
            workers: settings.workers,
            close_timeout: std::time::Duration::from_secs(settings.close_timeout_secs),
        },
        audit_path_params: settings.audit_path_params.clone(),
        disable_request_audit_logs: settings.disable_request_audit_logs,
        disable_response_audit_logs: settings.disable_response_audit_logs,
        redaction: RedactionOptions {
            redact_headers: settings.redact_headers.clone(),
            redact_body_keys: settings.redact_body_keys.clone(),
        },
    }
}

/// Build the writer selected by `settings.sink`.
pub async fn build_writer(settings: &AuditSettings) -> anyhow::Result<Arc<dyn EventWriter>> {
    match settings.sink {
        SinkKind::Log => Ok(Arc::new(LogWriter::new())),
        SinkKind::S3 => {
            let s3 = &settings.s3;
            let writer = ObjectStorageWriter::s3(ObjectStorageConfig {
                endpoint: s3.endpoint.clone(),
                region: s3.region.clone(),
                bucket: s3.bucket.clone(),
                directory: s3.directory.clone(),
            })
            .await
            .context("failed to create S3 audit writer")?;
            info!(bucket = %s3.bucket, region = %s3.region, "Writing audit events to S3");
            Ok(Arc::new(writer))
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}
