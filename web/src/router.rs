use crate::{controller::event_controller, controller::health_check_controller, sse, AppState};
use axum::{
    routing::{get, post},
    Router,
};

pub fn define_routes(app_state: AppState) -> Router {
    Router::new()
        .merge(health_routes())
        .merge(stream_routes(app_state.clone()))
        .merge(event_routes(app_state))
}

fn health_routes() -> Router {
    Router::new().route("/health", get(health_check_controller::health_check))
}

fn stream_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/stream/results", get(sse::handler::results_handler))
        .route("/stream/events", get(sse::handler::events_handler))
        .with_state(app_state)
}

fn event_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/events/:name", post(event_controller::emit))
        .with_state(app_state)
}
