use thiserror::Error;

/// Boxed error from an HTTP body stream.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised while collecting a body for audit.
///
/// Parse failures are never errors; unparseable bodies pass through
/// redaction unchanged. A broken stream is.
#[derive(Debug, Error)]
pub enum RedactionError {
    #[error("failed to read body: {0}")]
    BodyRead(#[source] BoxError),
}
