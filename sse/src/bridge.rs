//! Forwards a live event source to an SSE client for the life of a connection.
//!
//! Listeners are installed for every mapped source event and stay installed
//! until the client disconnects. At that point every subscription is handed
//! back to the source and the heartbeat is stopped.

use crate::error::{Error, ErrorKind, Result};
use crate::frame::{Data, EventName, Frame};
use crate::heartbeat::{self, Heartbeat};
use crate::sink::ResponseSink;
use crate::writer::{Delivery, FrameSender, SessionId, SinkWriter, FRAME_QUEUE_CAPACITY};
use events::{EventListener, EventSource, Subscription};
use log::*;
use serde_json::Value;
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Immutable renaming table from source event names to SSE event names.
#[derive(Debug, Clone, PartialEq)]
pub struct EventMapping {
    pairs: Vec<(String, EventName)>,
}

impl EventMapping {
    /// Build a mapping. It must name at least one event, and each source event
    /// may appear only once.
    pub fn new<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut validated = Vec::new();

        for (from, to) in pairs {
            let from = from.into();
            if from.is_empty() || from.contains(['\n', '\r']) {
                return Err(Error::new(ErrorKind::InvalidEventName(from)));
            }
            if !seen.insert(from.clone()) {
                return Err(Error::new(ErrorKind::InvalidMapping(from)));
            }
            validated.push((from, EventName::new(to)?));
        }

        if validated.is_empty() {
            return Err(Error::new(ErrorKind::EmptyMapping));
        }

        Ok(Self { pairs: validated })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &EventName)> {
        self.pairs.iter().map(|(from, to)| (from.as_str(), to))
    }

    pub fn destination(&self, from: &str) -> Option<&EventName> {
        self.iter().find(|(f, _)| *f == from).map(|(_, to)| to)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Always false for a constructed mapping.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Parses `from:to` pairs separated by commas, e.g. `progress:update,done:finished`.
impl FromStr for EventMapping {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let pairs = s
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                entry
                    .split_once(':')
                    .map(|(from, to)| (from.trim(), to.trim()))
                    .ok_or_else(|| Error::new(ErrorKind::InvalidMapping(entry.to_string())))
            })
            .collect::<Result<Vec<_>>>()?;

        Self::new(pairs)
    }
}

/// Counts reported once a bridge has been torn down.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BridgeSummary {
    pub frames_written: usize,
    pub heartbeats: usize,
    pub unsubscribed: usize,
}

/// Handle to an attached bridge. Dropping it does not detach the bridge;
/// only the client disconnecting does.
pub struct BridgeHandle {
    session_id: SessionId,
    task: JoinHandle<BridgeSummary>,
}

impl BridgeHandle {
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Wait until the client disconnected and every listener was removed.
    pub async fn closed(self) -> Result<BridgeSummary> {
        Ok(self.task.await?)
    }
}

/// Subscriptions released back to their source when dropped.
struct Subscriptions {
    source: Arc<dyn EventSource>,
    active: Vec<Subscription>,
}

impl Subscriptions {
    /// Remove every listener, returning how many were still installed.
    fn release(&mut self) -> usize {
        let source = &self.source;
        self.active
            .drain(..)
            .map(|subscription| source.unsubscribe(subscription))
            .filter(|removed| *removed)
            .count()
    }
}

impl Drop for Subscriptions {
    fn drop(&mut self) {
        self.release();
    }
}

#[derive(Debug, Clone)]
pub struct EventBridge {
    heartbeat_interval: Duration,
    queue_capacity: usize,
}

impl Default for EventBridge {
    fn default() -> Self {
        Self::new(heartbeat::EVENTS_INTERVAL)
    }
}

impl EventBridge {
    pub fn new(heartbeat_interval: Duration) -> Self {
        Self {
            heartbeat_interval,
            queue_capacity: FRAME_QUEUE_CAPACITY,
        }
    }

    /// Frames allowed to wait for a slow client. Events emitted while the
    /// queue is full are dropped.
    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    /// Open an SSE session on `sink` forwarding `source` events per `mapping`.
    ///
    /// Fails immediately if the sink is already closed; nothing is subscribed
    /// in that case.
    pub fn attach<S: ResponseSink>(
        &self,
        sink: S,
        source: Arc<dyn EventSource>,
        mapping: EventMapping,
    ) -> Result<BridgeHandle> {
        let session_id = SessionId::new();
        let writer = SinkWriter::with_capacity(sink, session_id.clone(), self.queue_capacity)?;

        info!(
            "Started SSE stream {session_id} bridging {} event(s)",
            mapping.len()
        );

        let heartbeat = Heartbeat::start(
            writer.sender(),
            self.heartbeat_interval,
            writer.session().child_token(),
        );

        let mut subscriptions = Subscriptions {
            source: Arc::clone(&source),
            active: Vec::with_capacity(mapping.len()),
        };
        for (from, to) in mapping.iter() {
            let listener = forwarder(writer.sender(), to.clone());
            subscriptions.active.push(source.subscribe(from, listener));
        }

        let session = writer.session();
        let cleanup_id = session_id.clone();
        let task = tokio::spawn(async move {
            session.cancelled().await;

            let unsubscribed = subscriptions.release();
            let heartbeats = heartbeat.shutdown().await;
            let frames_written = match writer.finish().await {
                Ok(report) => report.frames_written,
                Err(e) => {
                    error!("SSE writer for stream {cleanup_id} failed: {e}");
                    0
                }
            };

            info!("Cleaned up SSE stream {cleanup_id}, removed {unsubscribed} listener(s)");
            BridgeSummary {
                frames_written,
                heartbeats,
                unsubscribed,
            }
        });

        Ok(BridgeHandle { session_id, task })
    }
}

/// Listener writing each payload as a frame named `destination`.
/// A null payload is sent as a frame without data.
fn forwarder(sender: FrameSender, destination: EventName) -> Arc<dyn EventListener> {
    Arc::new(move |payload: &Value| {
        let data = Data::payload(payload.clone());
        let frame = Frame::new(destination.clone(), data);
        if sender.try_send(&frame) == Delivery::Queued {
            debug!(
                "Sending {destination} event on SSE stream {}",
                sender.session_id()
            );
        }
    })
}
