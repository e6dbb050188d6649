use anyhow::Result;
use eventsource_client::{self as es, Client};
use futures_util::stream::StreamExt;
use log::*;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub struct Event {
    pub event_type: String,
    pub data: String,
}

pub struct Connection {
    pub label: String,
    pub comments: usize,
    event_rx: mpsc::UnboundedReceiver<Received>,
    handle: tokio::task::JoinHandle<()>,
}

enum Received {
    Event(Event),
    Comment,
}

impl Connection {
    pub async fn establish(url: &str, label: String) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();

        // Result streams end on purpose; reconnecting would replay them
        let client = es::ClientBuilder::for_url(url)?
            .reconnect(es::ReconnectOptions::reconnect(false).build())
            .build();

        let stream_label = label.clone();
        let handle = tokio::spawn(async move {
            let mut stream = client.stream();

            loop {
                let received = match stream.next().await {
                    Some(Ok(es::SSE::Event(event))) => Received::Event(Event {
                        event_type: event.event_type,
                        data: event.data,
                    }),
                    Some(Ok(es::SSE::Comment(_))) => Received::Comment,
                    Some(Err(e)) => {
                        warn!("SSE error for {}: {}", stream_label, e);
                        break;
                    }
                    None => {
                        debug!("SSE stream ended for {}", stream_label);
                        break;
                    }
                };

                if tx.send(received).is_err() {
                    debug!("SSE receiver dropped for {}", stream_label);
                    break;
                }
            }
        });

        Ok(Self {
            label,
            comments: 0,
            event_rx: rx,
            handle,
        })
    }

    async fn next_event(&mut self, deadline: Instant) -> Result<Event> {
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                anyhow::bail!("Timeout waiting for events on {}", self.label);
            }

            match tokio::time::timeout(remaining, self.event_rx.recv()).await {
                Ok(Some(Received::Event(event))) => return Ok(event),
                Ok(Some(Received::Comment)) => {
                    // Keep-alive
                    self.comments += 1;
                }
                Ok(None) => anyhow::bail!("SSE connection closed"),
                Err(_) => anyhow::bail!("Timeout waiting for events on {}", self.label),
            }
        }
    }

    pub async fn wait_for_event(&mut self, event_type: &str, timeout: Duration) -> Result<Event> {
        let deadline = Instant::now() + timeout;

        loop {
            let event = self.next_event(deadline).await?;
            if event.event_type == event_type {
                return Ok(event);
            }
        }
    }

    /// Collect every event up to and including the first `event_type` event.
    pub async fn collect_until(
        &mut self,
        event_type: &str,
        timeout: Duration,
    ) -> Result<Vec<Event>> {
        let deadline = Instant::now() + timeout;
        let mut events = Vec::new();

        loop {
            let event = self.next_event(deadline).await?;
            let done = event.event_type == event_type;
            events.push(event);
            if done {
                return Ok(events);
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
