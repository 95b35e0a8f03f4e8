//! Audit event bus for Taskward.
//!
//! This crate decouples producing audit events from persisting them:
//!
//! - [`AuditLogger`] owns a bounded queue and a fixed pool of workers
//! - [`EventWriter`] is the pluggable persistence strategy workers call
//! - [`LogWriter`] writes events to `tracing`, mostly useful in tests
//! - [`ObjectStorageWriter`] uploads events to an object store (S3)
//!
//! Callers must [`close`](AuditLogger::close) the logger before exiting so
//! queued events are flushed and the writer gets to clean up.

mod config;
mod context;
mod error;
mod logger;
pub mod sinks;
mod writer;

pub use config::AuditConfig;
pub use context::CorrelationContext;
pub use error::{AuditError, SinkError, WriterConfigError};
pub use logger::{AuditLogger, CloseReport, OnError, OnWrite};
pub use sinks::{
    LogWriter, MemoryObjectStore, ObjectStorageConfig, ObjectStorageWriter, ObjectStore,
    ObjectStoreError, PutObject, PutReceipt,
};
#[cfg(feature = "s3")]
pub use sinks::S3ObjectStore;
pub use writer::{EventWriter, WriteReceipt};

// Re-export types for convenience
pub use taskward_audit_types::{Event, FormatError, Metadata};
