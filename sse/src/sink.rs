//! The response abstraction the multiplexer writes to.
//!
//! A [`ResponseSink`] is handed over by the framework layer once the request
//! has been accepted. It is owned by exactly one [`SinkWriter`](crate::writer::SinkWriter)
//! for the lifetime of a session.

use crate::error::{Error, ErrorKind, Result};
use crate::frame::{self, Parsed};
use async_stream::stream;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::convert::Infallible;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::{CancellationToken, DropGuard};

pub type Header = (&'static str, &'static str);

/// Headers that must reach the client before the first frame.
pub const SSE_HEADERS: [Header; 3] = [
    ("Content-Type", "text/event-stream"),
    ("Cache-Control", "no-cache"),
    ("Connection", "keep-alive"),
];

/// Writable side of one SSE HTTP response.
#[async_trait]
pub trait ResponseSink: Send + 'static {
    /// Write the response headers. May only succeed once.
    fn write_headers(&mut self, headers: &[Header]) -> Result<()>;

    /// Append one encoded frame to the response body.
    async fn append(&mut self, bytes: Bytes) -> Result<()>;

    /// Finish the response body.
    async fn end(&mut self);

    /// Token cancelled by the transport when the client goes away.
    fn disconnected(&self) -> CancellationToken;
}

/// Sink feeding a body stream, for frameworks that take a `Stream` of bytes
/// as a response body (axum's `Body::from_stream`).
pub struct ChannelSink {
    headers: Option<oneshot::Sender<Vec<Header>>>,
    body: Option<mpsc::Sender<Bytes>>,
    disconnected: CancellationToken,
}

/// The framework side of a [`ChannelSink`].
pub struct PendingResponse {
    headers: oneshot::Receiver<Vec<Header>>,
    body: mpsc::Receiver<Bytes>,
    guard: DropGuard,
}

/// Create a connected sink/response pair. `buffer` bounds how many frames may
/// be queued ahead of the transport.
pub fn channel_sink(buffer: usize) -> (ChannelSink, PendingResponse) {
    let (headers_tx, headers_rx) = oneshot::channel();
    let (body_tx, body_rx) = mpsc::channel(buffer.max(1));
    let disconnected = CancellationToken::new();

    let sink = ChannelSink {
        headers: Some(headers_tx),
        body: Some(body_tx),
        disconnected: disconnected.clone(),
    };
    let pending = PendingResponse {
        headers: headers_rx,
        body: body_rx,
        guard: disconnected.drop_guard(),
    };

    (sink, pending)
}

impl PendingResponse {
    /// Wait for the headers and return them with the body stream.
    ///
    /// Dropping the returned stream (the client went away) signals disconnect
    /// to the sink.
    pub async fn into_parts(
        self,
    ) -> Result<(
        Vec<Header>,
        impl Stream<Item = core::result::Result<Bytes, Infallible>> + Send + 'static,
    )> {
        let PendingResponse {
            headers,
            mut body,
            guard,
        } = self;

        let headers = headers
            .await
            .map_err(|e| Error::with_source(ErrorKind::SinkClosed, e))?;

        let body = stream! {
            let _guard = guard;
            while let Some(bytes) = body.recv().await {
                yield Ok::<_, Infallible>(bytes);
            }
        };

        Ok((headers, body))
    }
}

#[async_trait]
impl ResponseSink for ChannelSink {
    fn write_headers(&mut self, headers: &[Header]) -> Result<()> {
        if self.disconnected.is_cancelled() {
            return Err(Error::new(ErrorKind::SinkClosed));
        }
        let sender = self
            .headers
            .take()
            .ok_or_else(|| Error::new(ErrorKind::HeadersAlreadySent))?;
        sender
            .send(headers.to_vec())
            .map_err(|_| Error::new(ErrorKind::SinkClosed))
    }

    async fn append(&mut self, bytes: Bytes) -> Result<()> {
        let body = self
            .body
            .as_ref()
            .ok_or_else(|| Error::new(ErrorKind::SinkClosed))?;
        body.send(bytes)
            .await
            .map_err(|e| Error::with_source(ErrorKind::SinkClosed, e))
    }

    async fn end(&mut self) {
        // Dropping the sender ends the body stream once it is drained
        self.body.take();
    }

    fn disconnected(&self) -> CancellationToken {
        self.disconnected.clone()
    }
}

#[derive(Default)]
struct RecordingState {
    headers: Vec<Header>,
    header_writes: usize,
    bytes: Vec<u8>,
    end_calls: usize,
}

/// In-memory sink recording everything written to it.
pub struct RecordingSink {
    recording: Recording,
}

/// Observer side of a [`RecordingSink`]; also lets a test play the client
/// hanging up.
#[derive(Clone, Default)]
pub struct Recording {
    state: Arc<Mutex<RecordingState>>,
    disconnected: CancellationToken,
}

impl RecordingSink {
    pub fn new() -> (Self, Recording) {
        let recording = Recording::default();
        (
            Self {
                recording: recording.clone(),
            },
            recording,
        )
    }
}

impl Recording {
    fn state(&self) -> MutexGuard<'_, RecordingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Simulate the client disconnecting.
    pub fn disconnect(&self) {
        self.disconnected.cancel();
    }

    pub fn headers(&self) -> Vec<Header> {
        self.state().headers.clone()
    }

    pub fn header_writes(&self) -> usize {
        self.state().header_writes
    }

    pub fn end_calls(&self) -> usize {
        self.state().end_calls
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.state().bytes).into_owned()
    }

    pub fn parsed(&self) -> Vec<Parsed> {
        frame::parse(&self.text())
    }

    /// Recorded frames as `(event, data)` pairs, comments excluded.
    pub fn frames(&self) -> Vec<(String, Option<String>)> {
        self.parsed()
            .into_iter()
            .filter_map(|item| match item {
                Parsed::Event { event, data } => Some((event, data)),
                Parsed::Comment(_) => None,
            })
            .collect()
    }

    pub fn comment_count(&self) -> usize {
        self.parsed()
            .iter()
            .filter(|item| matches!(item, Parsed::Comment(_)))
            .count()
    }
}

#[async_trait]
impl ResponseSink for RecordingSink {
    fn write_headers(&mut self, headers: &[Header]) -> Result<()> {
        if self.recording.disconnected.is_cancelled() {
            return Err(Error::new(ErrorKind::SinkClosed));
        }
        let mut state = self.recording.state();
        if state.header_writes > 0 {
            return Err(Error::new(ErrorKind::HeadersAlreadySent));
        }
        state.header_writes += 1;
        state.headers = headers.to_vec();
        Ok(())
    }

    async fn append(&mut self, bytes: Bytes) -> Result<()> {
        if self.recording.disconnected.is_cancelled() {
            return Err(Error::new(ErrorKind::SinkClosed));
        }
        self.recording.state().bytes.extend_from_slice(&bytes);
        Ok(())
    }

    async fn end(&mut self) {
        self.recording.state().end_calls += 1;
    }

    fn disconnected(&self) -> CancellationToken {
        self.recording.disconnected.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_channel_sink_delivers_headers_then_body() {
        let (mut sink, pending) = channel_sink(4);

        sink.write_headers(&SSE_HEADERS).unwrap();
        sink.append(Bytes::from(":\n\n")).await.unwrap();
        sink.end().await;

        let (headers, body) = pending.into_parts().await.unwrap();
        assert_eq!(headers, SSE_HEADERS.to_vec());

        let chunks: Vec<_> = body.map(|chunk| chunk.unwrap()).collect().await;
        assert_eq!(chunks, vec![Bytes::from(":\n\n")]);
    }

    #[tokio::test]
    async fn test_channel_sink_headers_only_once() {
        let (mut sink, _pending) = channel_sink(4);
        sink.write_headers(&SSE_HEADERS).unwrap();
        assert_eq!(
            sink.write_headers(&SSE_HEADERS).unwrap_err().error_kind,
            ErrorKind::HeadersAlreadySent
        );
    }

    #[tokio::test]
    async fn test_dropping_body_signals_disconnect() {
        let (mut sink, pending) = channel_sink(4);
        let disconnected = sink.disconnected();
        sink.write_headers(&SSE_HEADERS).unwrap();

        let (_, body) = pending.into_parts().await.unwrap();
        assert!(!disconnected.is_cancelled());
        drop(body);

        assert!(disconnected.is_cancelled());
        assert!(sink.append(Bytes::from(":\n\n")).await.is_err());
    }

    #[tokio::test]
    async fn test_recording_sink_refuses_writes_after_disconnect() {
        let (mut sink, recording) = RecordingSink::new();
        sink.write_headers(&SSE_HEADERS).unwrap();
        sink.append(Bytes::from("event: a\ndata\n\n")).await.unwrap();

        recording.disconnect();
        assert!(sink.append(Bytes::from("event: b\ndata\n\n")).await.is_err());
        assert_eq!(recording.frames(), vec![("a".to_string(), None)]);
    }
}
