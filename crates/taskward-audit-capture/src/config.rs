//! Audit logger configuration.

use std::time::Duration;

/// Default queue capacity.
pub const DEFAULT_BUFFER_SIZE: usize = 100;

/// Default number of workers draining the queue.
pub const DEFAULT_WORKERS: usize = 4;

/// Default ceiling on how long `close` waits for the queue to drain.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for an [`AuditLogger`](crate::AuditLogger).
#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// Maximum queued events before writers block. Zero means the default (100).
    pub buffer_size: usize,
    /// Worker count. Zero means the default (4).
    pub workers: usize,
    /// How long `close` waits for queued events to be written.
    pub close_timeout: Duration,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            workers: DEFAULT_WORKERS,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }
}

impl AuditConfig {
    /// Config with the given buffer size and defaults otherwise.
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            buffer_size,
            ..Self::default()
        }
    }

    pub(crate) fn effective_buffer_size(&self) -> usize {
        if self.buffer_size == 0 {
            DEFAULT_BUFFER_SIZE
        } else {
            self.buffer_size
        }
    }

    pub(crate) fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            DEFAULT_WORKERS
        } else {
            self.workers
        }
    }
}
