//! Streaming tee for HTTP bodies.

use bytes::{Bytes, BytesMut};
use http_body::{Body, Frame, SizeHint};
use parking_lot::Mutex;
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

#[derive(Debug, Default)]
struct CaptureState {
    buf: BytesMut,
    failed: bool,
}

/// Bytes mirrored out of a [`TeeBody`].
///
/// Cheap to clone; all clones see the same buffer.
#[derive(Debug, Clone, Default)]
pub struct Capture {
    state: Arc<Mutex<CaptureState>>,
}

impl Capture {
    pub fn new() -> Self {
        Self::default()
    }

    fn extend(&self, data: &[u8]) {
        let mut state = self.state.lock();
        if !state.failed {
            state.buf.extend_from_slice(data);
        }
    }

    fn fail(&self) {
        let mut state = self.state.lock();
        state.failed = true;
        state.buf.clear();
    }

    /// Whether the underlying stream reported an error.
    pub fn failed(&self) -> bool {
        self.state.lock().failed
    }

    /// Bytes seen so far, or `None` if the stream failed.
    pub fn bytes(&self) -> Option<Bytes> {
        let state = self.state.lock();
        if state.failed {
            None
        } else {
            Some(Bytes::copy_from_slice(&state.buf))
        }
    }
}

type OnFinish = Box<dyn FnOnce(Option<Bytes>) + Send>;

/// Fires the finish callback once, at end of stream or on drop.
struct Completion {
    capture: Capture,
    callback: Option<OnFinish>,
}

impl Completion {
    fn fire(&mut self) {
        if let Some(callback) = self.callback.take() {
            callback(self.capture.bytes());
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        self.fire();
    }
}

pin_project! {
    /// Body wrapper that copies every data frame into a [`Capture`] while
    /// passing it through unchanged.
    pub struct TeeBody<B> {
        #[pin]
        inner: B,
        capture: Capture,
        completion: Option<Completion>,
    }
}

impl<B> TeeBody<B> {
    pub fn new(inner: B, capture: Capture) -> Self {
        Self {
            inner,
            capture,
            completion: None,
        }
    }

    /// Call `f` once the body has been fully read, or dropped early.
    ///
    /// `f` receives `None` when the stream failed.
    pub fn on_finish<F>(mut self, f: F) -> Self
    where
        F: FnOnce(Option<Bytes>) + Send + 'static,
    {
        self.completion = Some(Completion {
            capture: self.capture.clone(),
            callback: Some(Box::new(f)),
        });
        self
    }
}

impl<B> Body for TeeBody<B>
where
    B: Body<Data = Bytes>,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.project();
        match ready!(this.inner.poll_frame(cx)) {
            Some(Ok(frame)) => {
                if let Some(data) = frame.data_ref() {
                    this.capture.extend(data);
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Some(Err(err)) => {
                this.capture.fail();
                if let Some(completion) = this.completion {
                    completion.fire();
                }
                Poll::Ready(Some(Err(err)))
            }
            None => {
                if let Some(completion) = this.completion {
                    completion.fire();
                }
                Poll::Ready(None)
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::{BodyExt, Full, StreamBody};
    use std::convert::Infallible;

    #[tokio::test]
    async fn test_tee_passes_bytes_through_and_captures() {
        let capture = Capture::new();
        let body = TeeBody::new(Full::new(Bytes::from_static(b"hello world")), capture.clone());

        let collected = body.collect().await.unwrap().to_bytes();

        assert_eq!(&collected[..], b"hello world");
        assert_eq!(capture.bytes().unwrap(), Bytes::from_static(b"hello world"));
    }

    #[tokio::test]
    async fn test_on_finish_fires_once_at_end() {
        let (tx, rx) = std::sync::mpsc::channel();
        let chunks = futures::stream::iter(vec![
            Ok::<_, Infallible>(Frame::data(Bytes::from_static(b"a"))),
            Ok(Frame::data(Bytes::from_static(b"b"))),
        ]);
        let body = TeeBody::new(StreamBody::new(chunks), Capture::new())
            .on_finish(move |bytes| tx.send(bytes).unwrap());

        let collected = body.collect().await.unwrap().to_bytes();

        assert_eq!(&collected[..], b"ab");
        assert_eq!(rx.recv().unwrap(), Some(Bytes::from_static(b"ab")));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_on_finish_fires_on_drop() {
        let (tx, rx) = std::sync::mpsc::channel();
        let body = TeeBody::new(Full::new(Bytes::from_static(b"unread")), Capture::new())
            .on_finish(move |bytes| tx.send(bytes).unwrap());
        drop(body);

        assert_eq!(rx.recv().unwrap(), Some(Bytes::new()));
    }

    #[tokio::test]
    async fn test_stream_error_marks_capture_failed() {
        let (tx, rx) = std::sync::mpsc::channel();
        let chunks = futures::stream::iter(vec![
            Ok(Frame::data(Bytes::from_static(b"partial"))),
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "reset")),
        ]);
        let capture = Capture::new();
        let body = TeeBody::new(StreamBody::new(chunks), capture.clone())
            .on_finish(move |bytes| tx.send(bytes).unwrap());

        assert!(body.collect().await.is_err());
        assert!(capture.failed());
        assert_eq!(rx.recv().unwrap(), None);
    }
}
