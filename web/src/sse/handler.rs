use crate::error::{Error, Result};
use crate::params::stream::{EventsParams, ResultsParams};
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use events::EventSource;
use log::*;
use serde_json::{json, Value};
use service::AppState;
use sse::sink::{channel_sink, PendingResponse};
use sse::EventMapping;
use std::sync::Arc;
use std::time::Duration;

/// SSE handler reporting a batch of simulated operations as each one settles.
/// The stream closes with a `close` event after the last operation.
pub(crate) async fn results_handler(
    State(app_state): State<AppState>,
    Query(params): Query<ResultsParams>,
) -> Result<Response> {
    let delays = params.delays()?;
    let failing = params.failing()?;

    let operations: Vec<_> = delays
        .into_iter()
        .enumerate()
        .map(|(index, delay_ms)| simulated_operation(index, delay_ms, failing.contains(&index)))
        .collect();

    let (sink, pending) = channel_sink(app_state.config.body_buffer);
    let handle = app_state.result_streamer().start(sink, operations)?;
    debug!("Establishing result stream {}", handle.session_id());

    into_sse_response(pending).await
}

/// SSE handler forwarding app-wide events under the requested mapping.
/// Stays open until the client disconnects.
pub(crate) async fn events_handler(
    State(app_state): State<AppState>,
    Query(params): Query<EventsParams>,
) -> Result<Response> {
    let mapping: EventMapping = params.map.parse()?;

    let (sink, pending) = channel_sink(app_state.config.body_buffer);
    let source: Arc<dyn EventSource> = app_state.event_emitter.clone();
    let handle = app_state.event_bridge().attach(sink, source, mapping)?;
    debug!("Establishing event bridge {}", handle.session_id());

    into_sse_response(pending).await
}

async fn simulated_operation(
    index: usize,
    delay_ms: u64,
    fails: bool,
) -> core::result::Result<Value, String> {
    tokio::time::sleep(Duration::from_millis(delay_ms)).await;

    if fails {
        Err(format!("operation {index} failed"))
    } else {
        Ok(json!({ "operation": index, "delay_ms": delay_ms }))
    }
}

async fn into_sse_response(pending: PendingResponse) -> Result<Response> {
    let (headers, body) = pending.into_parts().await?;

    let mut builder = Response::builder().status(StatusCode::OK);
    for (name, value) in headers {
        builder = builder.header(name, value);
    }

    builder
        .body(Body::from_stream(body))
        .map_err(|e| Error::Response(e.to_string()))
}
