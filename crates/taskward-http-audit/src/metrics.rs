//! Metrics hooks for the capture layer.

use crate::Phase;
use std::sync::atomic::{AtomicU64, Ordering};

/// Receives capture-layer measurements.
///
/// Injected into [`AuditLayer`](crate::AuditLayer); every method has a no-op
/// default so implementors only override what they record.
pub trait AuditMetrics: Send + Sync {
    /// An event for `phase` was handed to the audit logger.
    fn event_submitted(&self, _phase: Phase) {}

    /// The body stream for `phase` failed, so that side was not audited.
    fn capture_failed(&self, _phase: Phase) {}

    /// The audit logger refused an event (closed, or invalid metadata).
    fn event_rejected(&self, _phase: Phase) {}
}

/// Metrics sink that records nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl AuditMetrics for NoopMetrics {}

#[derive(Debug, Default)]
struct PhaseCounters {
    submitted: AtomicU64,
    capture_failed: AtomicU64,
    rejected: AtomicU64,
}

/// In-memory counters, one set per phase.
#[derive(Debug, Default)]
pub struct CountingMetrics {
    request: PhaseCounters,
    response: PhaseCounters,
}

impl CountingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn phase(&self, phase: Phase) -> &PhaseCounters {
        match phase {
            Phase::Request => &self.request,
            Phase::Response => &self.response,
        }
    }

    pub fn submitted(&self, phase: Phase) -> u64 {
        self.phase(phase).submitted.load(Ordering::Relaxed)
    }

    pub fn capture_failures(&self, phase: Phase) -> u64 {
        self.phase(phase).capture_failed.load(Ordering::Relaxed)
    }

    pub fn rejected(&self, phase: Phase) -> u64 {
        self.phase(phase).rejected.load(Ordering::Relaxed)
    }
}

impl AuditMetrics for CountingMetrics {
    fn event_submitted(&self, phase: Phase) {
        self.phase(phase).submitted.fetch_add(1, Ordering::Relaxed);
    }

    fn capture_failed(&self, phase: Phase) {
        self.phase(phase).capture_failed.fetch_add(1, Ordering::Relaxed);
    }

    fn event_rejected(&self, phase: Phase) {
        self.phase(phase).rejected.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counting_metrics_tracks_phases_separately() {
        let metrics = CountingMetrics::new();
        metrics.event_submitted(Phase::Request);
        metrics.event_submitted(Phase::Request);
        metrics.capture_failed(Phase::Response);
        metrics.event_rejected(Phase::Response);

        assert_eq!(metrics.submitted(Phase::Request), 2);
        assert_eq!(metrics.submitted(Phase::Response), 0);
        assert_eq!(metrics.capture_failures(Phase::Response), 1);
        assert_eq!(metrics.rejected(Phase::Response), 1);
        assert_eq!(metrics.rejected(Phase::Request), 0);
    }
}
