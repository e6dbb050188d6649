//! Keep-alive comments for idle SSE connections.

use crate::writer::{Delivery, FrameSender};
use log::*;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Default interval for result streams, which are short-lived.
pub const RESULTS_INTERVAL: Duration = Duration::from_millis(3000);
/// Default interval for event bridges, which stay open indefinitely.
pub const EVENTS_INTERVAL: Duration = Duration::from_millis(10_000);

/// A running heartbeat. Dropping the handle stops it.
pub struct Heartbeat {
    token: CancellationToken,
    task: Option<JoinHandle<usize>>,
}

impl Heartbeat {
    /// Write a `:` comment through `sender` every `interval`, starting one
    /// interval from now, until `token` is cancelled.
    pub fn start(sender: FrameSender, interval: Duration, token: CancellationToken) -> Self {
        let interval = interval.max(Duration::from_millis(1));
        let task = tokio::spawn(beat(sender, interval, token.clone()));
        Self {
            token,
            task: Some(task),
        }
    }

    /// Cancel future beats. Safe to call any number of times.
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Stop and wait for the beat task to exit, returning how many beats it
    /// sent. No beat is queued after this returns.
    pub async fn shutdown(mut self) -> usize {
        self.stop();
        match self.task.take() {
            Some(task) => task.await.unwrap_or_else(|e| {
                warn!("Heartbeat task failed: {e}");
                0
            }),
            None => 0,
        }
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn beat(sender: FrameSender, interval: Duration, token: CancellationToken) -> usize {
    let mut ticker = interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut beats = 0;

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                match sender.send_comment() {
                    Delivery::Queued => {
                        beats += 1;
                        debug!("Sent keep-alive message on SSE stream {}", sender.session_id());
                    }
                    // Frames are already waiting, the client is not idle
                    Delivery::Dropped => {}
                    Delivery::Closed => break,
                }
            }
        }
    }

    beats
}
