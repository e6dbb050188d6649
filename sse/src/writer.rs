//! Single-writer ownership of a response sink.
//!
//! Every frame producer in a session (heartbeat, operation completions, event
//! listeners) holds a cheap [`FrameSender`]. Encoded frames travel over one
//! channel to the task owning the sink, which appends them one at a time, so
//! frames never interleave and no lock is held across I/O.
//!
//! The channel is bounded. Producers that can wait ([`FrameSender::send`])
//! are held back by a slow client; synchronous producers
//! ([`FrameSender::try_send`]) drop the frame instead.

use crate::error::{Error, ErrorKind, Result};
use crate::frame::{self, Frame};
use crate::sink::{ResponseSink, SSE_HEADERS};
use bytes::Bytes;
use log::*;
use std::fmt;
use tokio::sync::mpsc::{self, error::TrySendError, Receiver, Sender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Frames that may wait for the writer before producers are held back.
pub const FRAME_QUEUE_CAPACITY: usize = 256;

/// Unique identifier for a streaming session (server-generated)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of a non-blocking send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    /// The queue was full and the frame was discarded.
    Dropped,
    /// The session has ended.
    Closed,
}

/// Producer handle for one session's sink.
#[derive(Clone)]
pub struct FrameSender {
    tx: Sender<Bytes>,
    session_id: SessionId,
}

impl FrameSender {
    /// Queue a frame, waiting for room if the client is slow. Returns false
    /// once the session has ended, in which case the frame is dropped.
    pub async fn send(&self, frame: &Frame) -> bool {
        self.tx.send(frame.encode()).await.is_ok()
    }

    /// Queue a frame without waiting.
    pub fn try_send(&self, frame: &Frame) -> Delivery {
        let delivery = self.offer(frame.encode());
        if delivery == Delivery::Dropped {
            warn!(
                "SSE stream {} is backed up, dropped {} event",
                self.session_id, frame.event
            );
        }
        delivery
    }

    /// Queue a keep-alive comment without waiting.
    pub fn send_comment(&self) -> Delivery {
        self.offer(frame::comment())
    }

    fn offer(&self, bytes: Bytes) -> Delivery {
        match self.tx.try_send(bytes) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(_)) => Delivery::Dropped,
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }
}

/// What the writer observed over the life of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriterReport {
    pub frames_written: usize,
    pub client_disconnected: bool,
}

/// Owner of a session's sink.
pub struct SinkWriter {
    sender: FrameSender,
    session: CancellationToken,
    task: JoinHandle<WriterReport>,
}

impl SinkWriter {
    /// Write the SSE headers and start the writer task.
    ///
    /// Fails if the client is already gone or headers were already written.
    pub fn start<S: ResponseSink>(sink: S, session_id: SessionId) -> Result<Self> {
        Self::with_capacity(sink, session_id, FRAME_QUEUE_CAPACITY)
    }

    /// Like [`SinkWriter::start`] with a frame queue of `capacity` (at least 1).
    pub fn with_capacity<S: ResponseSink>(
        mut sink: S,
        session_id: SessionId,
        capacity: usize,
    ) -> Result<Self> {
        let disconnected = sink.disconnected();
        if disconnected.is_cancelled() {
            return Err(Error::new(ErrorKind::SinkClosed));
        }
        sink.write_headers(&SSE_HEADERS)?;

        let (tx, rx) = mpsc::channel(capacity.max(1));
        let session = CancellationToken::new();
        let task = tokio::spawn(write_frames(
            sink,
            rx,
            disconnected,
            session.clone(),
            session_id.clone(),
        ));

        Ok(Self {
            sender: FrameSender { tx, session_id },
            session,
            task,
        })
    }

    pub fn sender(&self) -> FrameSender {
        self.sender.clone()
    }

    pub fn session_id(&self) -> &SessionId {
        &self.sender.session_id
    }

    /// Token cancelled when the writer stops, for whatever reason.
    pub fn session(&self) -> CancellationToken {
        self.session.clone()
    }

    /// Release this writer's own sender and wait for the sink to be ended.
    ///
    /// The sink ends once every outstanding [`FrameSender`] is dropped, or
    /// immediately if the client already disconnected.
    pub async fn finish(self) -> Result<WriterReport> {
        let SinkWriter { sender, task, .. } = self;
        drop(sender);
        Ok(task.await?)
    }
}

async fn write_frames<S: ResponseSink>(
    mut sink: S,
    mut rx: Receiver<Bytes>,
    disconnected: CancellationToken,
    session: CancellationToken,
    session_id: SessionId,
) -> WriterReport {
    let mut report = WriterReport::default();

    loop {
        tokio::select! {
            biased;
            _ = disconnected.cancelled() => {
                info!("Client disconnected from SSE stream {session_id}");
                report.client_disconnected = true;
                break;
            }
            next = rx.recv() => match next {
                Some(bytes) => {
                    if let Err(e) = sink.append(bytes).await {
                        warn!("Failed to write to SSE stream {session_id}: {e}. Stream will be torn down.");
                        report.client_disconnected = true;
                        break;
                    }
                    report.frames_written += 1;
                }
                None => break,
            }
        }
    }

    // Later sends fail and their frames are dropped
    rx.close();
    session.cancel();
    sink.end().await;

    debug!(
        "SSE stream {session_id} ended after {} frame(s)",
        report.frames_written
    );
    report
}
