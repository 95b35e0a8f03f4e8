//! Correlation context threaded from the producer to the write hooks.

use tracing::Span;

/// Opaque context captured when an event is written.
///
/// The bus never inspects it; it hands it back to the `on_write` and
/// `on_error` hooks so they can log against the originating request.
#[derive(Debug, Clone)]
pub struct CorrelationContext {
    span: Span,
    request_id: Option<String>,
}

impl CorrelationContext {
    /// Capture the currently entered span.
    pub fn current() -> Self {
        Self::from_span(Span::current())
    }

    /// Context for a specific span.
    pub fn from_span(span: Span) -> Self {
        Self {
            span,
            request_id: None,
        }
    }

    /// Context with no span attached.
    pub fn none() -> Self {
        Self::from_span(Span::none())
    }

    /// Attach a request id.
    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    /// The captured span.
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// The request id, if one was attached.
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// Run `f` inside the captured span.
    pub fn in_scope<F: FnOnce() -> T, T>(&self, f: F) -> T {
        self.span.in_scope(f)
    }
}

impl Default for CorrelationContext {
    fn default() -> Self {
        Self::none()
    }
}
