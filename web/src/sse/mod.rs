//! SSE HTTP handlers for the web layer.
//!
//! This module contains only the Axum handlers for SSE endpoints and the
//! glue turning a `PendingResponse` into an HTTP response. The multiplexing
//! itself (writer, heartbeat, result streams, event bridges) lives in the
//! `sse` crate.

pub mod handler;
