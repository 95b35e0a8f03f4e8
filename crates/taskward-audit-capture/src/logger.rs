//! Bounded audit queue drained by a fixed worker pool.

use crate::{AuditConfig, AuditError, CorrelationContext, EventWriter, SinkError, WriteReceipt};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use taskward_audit_types::{Event, Metadata};
use tokio::sync::{mpsc, OnceCell};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Hook called after an event was persisted.
pub type OnWrite = Arc<dyn Fn(&CorrelationContext, &WriteReceipt) + Send + Sync>;

/// Hook called after a writer failed to persist an event.
pub type OnError = Arc<dyn Fn(&CorrelationContext, &SinkError) + Send + Sync>;

/// What happened when the logger was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CloseReport {
    /// The drain ceiling elapsed before the workers finished.
    pub timed_out: bool,
    /// Events still queued when the logger gave up on them.
    pub abandoned: usize,
}

struct Envelope {
    event: Event,
    context: CorrelationContext,
}

#[derive(Default)]
struct Hooks {
    on_write: RwLock<Option<OnWrite>>,
    on_error: RwLock<Option<OnError>>,
}

impl Hooks {
    fn wrote(&self, context: &CorrelationContext, receipt: &WriteReceipt) {
        let hook = self.on_write.read().clone();
        if let Some(hook) = hook {
            hook(context, receipt);
        }
    }

    fn failed(&self, context: &CorrelationContext, err: &SinkError) {
        let hook = self.on_error.read().clone();
        if let Some(hook) = hook {
            hook(context, err);
        }
    }
}

/// State shared between the logger handle and its workers.
struct Shared {
    writer: Arc<dyn EventWriter>,
    hooks: Hooks,
    queued: AtomicUsize,
    abandon: AtomicBool,
}

/// Asynchronous audit logger.
///
/// Events written to the logger land on a bounded queue. A fixed pool of
/// workers drains the queue and hands each event to the configured
/// [`EventWriter`]. Writers block only while the queue is full.
///
/// Lifecycle is `open -> closing -> closed`. Once [`close`](Self::close) has
/// started, further writes are rejected with [`AuditError::Closed`].
pub struct AuditLogger {
    sender: Mutex<Option<mpsc::Sender<Envelope>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shared: Arc<Shared>,
    config: AuditConfig,
    closed: OnceCell<CloseReport>,
}

impl AuditLogger {
    /// Open a logger and start its workers.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn open(config: AuditConfig, writer: Arc<dyn EventWriter>) -> Self {
        let (sender, receiver) = mpsc::channel(config.effective_buffer_size());
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let shared = Arc::new(Shared {
            writer,
            hooks: Hooks::default(),
            queued: AtomicUsize::new(0),
            abandon: AtomicBool::new(false),
        });

        let workers = (0..config.effective_workers())
            .map(|id| {
                tokio::spawn(process_audit_events(
                    id,
                    Arc::clone(&receiver),
                    Arc::clone(&shared),
                ))
            })
            .collect();

        debug!(
            buffer_size = config.effective_buffer_size(),
            workers = config.effective_workers(),
            "audit logger opened"
        );

        Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            shared,
            config,
            closed: OnceCell::new(),
        }
    }

    /// Queue an audit event, waiting while the queue is full.
    ///
    /// The timestamp is taken now. Metadata using a reserved field name is
    /// rejected here rather than failing later inside a writer.
    pub async fn write(
        &self,
        context: CorrelationContext,
        identifier: impl Into<String>,
        metadata: Vec<Metadata>,
    ) -> Result<(), AuditError> {
        let sender = self.sender()?;
        let envelope = self.envelope(context, identifier, metadata)?;

        self.shared.queued.fetch_add(1, Ordering::SeqCst);
        if sender.send(envelope).await.is_err() {
            self.shared.queued.fetch_sub(1, Ordering::SeqCst);
            return Err(AuditError::Closed);
        }
        Ok(())
    }

    /// Queue an audit event without waiting.
    ///
    /// Returns [`AuditError::Full`] when the queue has no free slot.
    pub fn try_write(
        &self,
        context: CorrelationContext,
        identifier: impl Into<String>,
        metadata: Vec<Metadata>,
    ) -> Result<(), AuditError> {
        let sender = self.sender()?;
        let envelope = self.envelope(context, identifier, metadata)?;

        self.shared.queued.fetch_add(1, Ordering::SeqCst);
        match sender.try_send(envelope) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.shared.queued.fetch_sub(1, Ordering::SeqCst);
                match err {
                    mpsc::error::TrySendError::Full(_) => Err(AuditError::Full),
                    mpsc::error::TrySendError::Closed(_) => Err(AuditError::Closed),
                }
            }
        }
    }

    /// Install the hook called after each successful write.
    pub fn set_on_write<F>(&self, f: F)
    where
        F: Fn(&CorrelationContext, &WriteReceipt) + Send + Sync + 'static,
    {
        *self.shared.hooks.on_write.write() = Some(Arc::new(f));
    }

    /// Install the hook called after each failed write.
    pub fn set_on_error<F>(&self, f: F)
    where
        F: Fn(&CorrelationContext, &SinkError) + Send + Sync + 'static,
    {
        *self.shared.hooks.on_error.write() = Some(Arc::new(f));
    }

    /// Events currently waiting in the queue.
    pub fn queued(&self) -> usize {
        self.shared.queued.load(Ordering::SeqCst)
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.sender.lock().is_none()
    }

    /// Close the logger.
    ///
    /// Stops intake, waits up to the configured timeout for the workers to
    /// drain the queue, then closes the writer. Events still queued after the
    /// timeout are abandoned; the report says how many. A sink call already
    /// in progress is never interrupted.
    ///
    /// Calling `close` again returns the first report without doing anything.
    pub async fn close(&self) -> CloseReport {
        *self.closed.get_or_init(|| self.shutdown()).await
    }

    async fn shutdown(&self) -> CloseReport {
        // Dropping our sender closes the channel once in-flight writes finish.
        self.sender.lock().take();

        let workers = std::mem::take(&mut *self.workers.lock());
        let drained =
            tokio::time::timeout(self.config.close_timeout, futures::future::join_all(workers))
                .await
                .is_ok();

        let report = if drained {
            CloseReport::default()
        } else {
            self.shared.abandon.store(true, Ordering::SeqCst);
            let abandoned = self.shared.queued.load(Ordering::SeqCst);
            warn!(
                abandoned,
                timeout_ms = self.config.close_timeout.as_millis() as u64,
                "audit logger closed before the queue drained"
            );
            CloseReport {
                timed_out: true,
                abandoned,
            }
        };

        self.shared.writer.close().await;
        debug!("audit logger closed");
        report
    }

    fn sender(&self) -> Result<mpsc::Sender<Envelope>, AuditError> {
        self.sender.lock().clone().ok_or(AuditError::Closed)
    }

    fn envelope(
        &self,
        context: CorrelationContext,
        identifier: impl Into<String>,
        metadata: Vec<Metadata>,
    ) -> Result<Envelope, AuditError> {
        let event = Event::new(identifier, Utc::now(), metadata);
        event.validate()?;
        Ok(Envelope { event, context })
    }
}

async fn process_audit_events(
    worker: usize,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<Envelope>>>,
    shared: Arc<Shared>,
) {
    loop {
        let next = receiver.lock().await.recv().await;
        let Some(envelope) = next else {
            break;
        };
        shared.queued.fetch_sub(1, Ordering::SeqCst);

        if shared.abandon.load(Ordering::SeqCst) {
            break;
        }

        match shared.writer.receive_event(&envelope.event).await {
            Ok(receipt) => shared.hooks.wrote(&envelope.context, &receipt),
            Err(err) => shared.hooks.failed(&envelope.context, &err),
        }
    }
    debug!(worker, "audit worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingWriter {
        events: Mutex<Vec<Event>>,
        closes: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl EventWriter for RecordingWriter {
        async fn receive_event(&self, event: &Event) -> Result<WriteReceipt, SinkError> {
            assert!(event.timestamp().timestamp() > 0, "timestamp shouldn't be zero");
            self.events.lock().push(event.clone());
            if self.fail {
                return Err(SinkError::Other("test".to_string()));
            }
            let mut receipt = WriteReceipt::new();
            receipt.insert("baz".to_string(), json!("qux"));
            Ok(receipt)
        }

        async fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Writer that blocks until released.
    struct GatedWriter {
        gate: tokio::sync::Semaphore,
    }

    #[async_trait]
    impl EventWriter for GatedWriter {
        async fn receive_event(&self, _event: &Event) -> Result<WriteReceipt, SinkError> {
            let _permit = self.gate.acquire().await;
            Ok(WriteReceipt::new())
        }
    }

    #[tokio::test]
    async fn test_write_handler() {
        let writer = Arc::new(RecordingWriter::default());
        let logger = AuditLogger::open(AuditConfig::with_buffer_size(1), writer.clone());

        let receipts = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&receipts);
        logger.set_on_write(move |_ctx, out| seen.lock().push(out.clone()));

        logger
            .write(
                CorrelationContext::none(),
                "id",
                vec![Metadata::new("foo", "bar")],
            )
            .await
            .unwrap();
        logger.close().await;

        let events = writer.events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].identifier(), "id");
        assert_eq!(events[0].metadata(), &[Metadata::new("foo", "bar")]);

        let receipts = receipts.lock();
        assert_eq!(receipts.len(), 1);
        assert_eq!(receipts[0].get("baz"), Some(&json!("qux")));
    }

    #[tokio::test]
    async fn test_error_handler() {
        let writer = Arc::new(RecordingWriter {
            fail: true,
            ..Default::default()
        });
        let logger = AuditLogger::open(AuditConfig::with_buffer_size(1), writer.clone());

        let errors = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&errors);
        logger.set_on_error(move |_ctx, err| seen.lock().push(err.to_string()));
        let wrote = Arc::new(AtomicUsize::new(0));
        let wrote_hook = Arc::clone(&wrote);
        logger.set_on_write(move |_, _| {
            wrote_hook.fetch_add(1, Ordering::SeqCst);
        });

        logger
            .write(CorrelationContext::none(), "id", vec![Metadata::new("foo", "bar")])
            .await
            .unwrap();
        logger.close().await;

        assert_eq!(*errors.lock(), vec!["test".to_string()]);
        assert_eq!(wrote.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_all_events_written_before_close_returns() {
        let writer = Arc::new(RecordingWriter::default());
        let logger = AuditLogger::open(AuditConfig::with_buffer_size(64), writer.clone());

        let wrote = Arc::new(AtomicUsize::new(0));
        let hook = Arc::clone(&wrote);
        logger.set_on_write(move |_, _| {
            hook.fetch_add(1, Ordering::SeqCst);
        });

        for i in 0..50 {
            logger
                .write(CorrelationContext::none(), format!("event-{i}"), vec![])
                .await
                .unwrap();
        }
        let report = logger.close().await;

        assert_eq!(report, CloseReport::default());
        assert_eq!(wrote.load(Ordering::SeqCst), 50);
        assert_eq!(writer.events.lock().len(), 50);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let writer = Arc::new(RecordingWriter::default());
        let logger = AuditLogger::open(AuditConfig::default(), writer.clone());

        logger.close().await;
        logger.close().await;

        assert!(logger.is_closed());
        assert_eq!(writer.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_write_after_close_is_rejected() {
        let writer = Arc::new(RecordingWriter::default());
        let logger = AuditLogger::open(AuditConfig::default(), writer.clone());
        logger.close().await;

        let result = logger
            .write(CorrelationContext::none(), "late", vec![])
            .await;
        assert!(matches!(result, Err(AuditError::Closed)));
        assert!(matches!(
            logger.try_write(CorrelationContext::none(), "late", vec![]),
            Err(AuditError::Closed)
        ));
        assert!(writer.events.lock().is_empty());
    }

    #[tokio::test]
    async fn test_reserved_metadata_rejected_at_write() {
        let writer = Arc::new(RecordingWriter::default());
        let logger = AuditLogger::open(AuditConfig::default(), writer.clone());

        let result = logger
            .write(
                CorrelationContext::none(),
                "id",
                vec![Metadata::new("identifier", "spoofed")],
            )
            .await;
        assert!(matches!(result, Err(AuditError::Format(_))));

        logger.close().await;
        assert!(writer.events.lock().is_empty());
    }

    #[tokio::test]
    async fn test_try_write_reports_full_queue() {
        let writer = Arc::new(GatedWriter {
            gate: tokio::sync::Semaphore::new(0),
        });
        let config = AuditConfig {
            buffer_size: 1,
            workers: 1,
            close_timeout: Duration::from_millis(50),
        };
        let logger = AuditLogger::open(config, writer.clone());

        // The single worker takes the first event and blocks on the gate,
        // the second fills the queue.
        logger.try_write(CorrelationContext::none(), "a", vec![]).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        logger.try_write(CorrelationContext::none(), "b", vec![]).unwrap();

        assert!(matches!(
            logger.try_write(CorrelationContext::none(), "c", vec![]),
            Err(AuditError::Full)
        ));

        writer.gate.add_permits(10);
        let report = logger.close().await;
        assert!(!report.timed_out);
    }

    #[tokio::test]
    async fn test_close_times_out_and_reports_abandoned() {
        let writer = Arc::new(GatedWriter {
            gate: tokio::sync::Semaphore::new(0),
        });
        let config = AuditConfig {
            buffer_size: 10,
            workers: 1,
            close_timeout: Duration::from_millis(50),
        };
        let logger = AuditLogger::open(config, writer.clone());

        for i in 0..4 {
            logger
                .write(CorrelationContext::none(), format!("e{i}"), vec![])
                .await
                .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        let report = logger.close().await;
        assert!(report.timed_out);
        assert_eq!(report.abandoned, 3);

        writer.gate.add_permits(10);
    }

    #[tokio::test]
    async fn test_hooks_receive_write_time_context() {
        let writer = Arc::new(RecordingWriter::default());
        let logger = AuditLogger::open(AuditConfig::default(), writer);

        let ids = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&ids);
        logger.set_on_write(move |ctx, _| {
            seen.lock().push(ctx.request_id().map(str::to_string));
        });

        logger
            .write(
                CorrelationContext::none().with_request_id("req-1"),
                "id",
                vec![],
            )
            .await
            .unwrap();
        logger.close().await;

        assert_eq!(*ids.lock(), vec![Some("req-1".to_string())]);
    }
}
