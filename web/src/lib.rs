//! HTTP surface for the push multiplexer.
//!
//! Exposes result streams and event bridges over SSE, plus an endpoint for
//! emitting events onto the app-wide event source.

use log::*;
use service::AppState;

pub(crate) mod controller;
mod error;
pub(crate) mod params;
mod router;
pub(crate) mod sse;

pub use router::define_routes;

pub async fn init_server(app_state: AppState) -> std::io::Result<()> {
    let listen_addr = format!(
        "{}:{}",
        app_state.config.interface(),
        app_state.config.port
    );

    info!("Server starting... listening for connections on http://{listen_addr}");

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    axum::serve(listener, define_routes(app_state)).await
}
