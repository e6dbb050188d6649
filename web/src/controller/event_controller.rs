use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use log::*;
use serde_json::{json, Value};
use service::AppState;

/// POST emit `payload` as event `name` on the app-wide event source.
/// Responds with how many listeners received it.
pub async fn emit(
    State(app_state): State<AppState>,
    Path(name): Path<String>,
    Json(payload): Json<Value>,
) -> impl IntoResponse {
    let listeners = app_state.event_emitter.emit(&name, &payload);
    debug!("Emitted {name} event to {listeners} listener(s)");

    (StatusCode::ACCEPTED, Json(json!({ "listeners": listeners })))
}
