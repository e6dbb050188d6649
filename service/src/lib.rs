use config::Config;
use events::EventEmitter;
use sse::{EventBridge, ResultStreamer};
use std::sync::Arc;

pub mod config;
pub mod logging;

// Service-level state containing only infrastructure concerns
// Needs to implement Clone to be able to be passed into Router as State
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub event_emitter: Arc<EventEmitter>,
}

impl AppState {
    pub fn new(app_config: Config) -> Self {
        Self {
            config: app_config,
            event_emitter: Arc::new(EventEmitter::new()),
        }
    }

    /// Result streamer configured with this service's heartbeat and error payload settings.
    pub fn result_streamer(&self) -> ResultStreamer {
        ResultStreamer::new(self.config.results_heartbeat())
            .with_failure_payload(self.config.failure_payload)
            .with_queue_capacity(self.config.frame_queue)
    }

    pub fn event_bridge(&self) -> EventBridge {
        EventBridge::new(self.config.events_heartbeat())
            .with_queue_capacity(self.config.frame_queue)
    }
}
