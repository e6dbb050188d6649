//! Server-Sent Events (SSE) multiplexing for long-lived HTTP responses.
//!
//! This crate turns many concurrent producers into one well-formed SSE stream
//! per client connection, keeps the connection alive, and releases every
//! timer and listener when the client goes away.
//!
//! # Architecture
//!
//! - **Single writer per connection**: The response sink is owned by one
//!   `SinkWriter` task. Heartbeats, operation completions and event listeners
//!   send encoded frames to it over a channel, so frames never interleave.
//! - **Result streams**: `ResultStreamer` reports a fixed set of operations in
//!   completion order and closes the stream after the last one settles.
//! - **Event bridges**: `EventBridge` forwards a named-event source under a
//!   renaming table until the client disconnects.
//! - **Scoped cleanup**: Heartbeats and subscriptions are released through
//!   cancellation tokens and drop guards on every exit path.
//! - **Best effort**: If a client disconnects its remaining frames are
//!   dropped; nothing is retried or persisted.
//!
//! # Message Flow
//!
//! 1. The web layer creates a sink (`sink::channel_sink`) for the response
//! 2. `ResultStreamer::start` or `EventBridge::attach` writes the SSE headers
//!    and spawns the writer
//! 3. Producers encode frames and queue them through a `FrameSender`
//! 4. The writer appends frames to the response body in arrival order
//! 5. On completion or disconnect the writer ends the body and cancels the
//!    session token, which stops the heartbeat and releases listeners
//!
//! # Example: Streaming results
//!
//! ```rust,ignore
//! use sse::{sink::channel_sink, ResultStreamer};
//!
//! let (sink, pending) = channel_sink(64);
//! ResultStreamer::default().start(sink, vec![fetch_a(), fetch_b()])?;
//! let (headers, body) = pending.into_parts().await?;
//! ```
//!
//! # Modules
//!
//! - `frame`: SSE wire format encoder and parser
//! - `sink`: Response sink abstraction and its channel/in-memory implementations
//! - `writer`: Single-writer task owning a sink
//! - `heartbeat`: Keep-alive comments
//! - `streamer`: Fixed-count result streams
//! - `bridge`: Event source forwarding
//! - `error`: Error types

pub mod bridge;
pub mod error;
pub mod frame;
pub mod heartbeat;
pub mod sink;
pub mod streamer;
pub mod writer;

pub use bridge::{EventBridge, EventMapping};
pub use error::Error;
pub use streamer::{FailurePayload, ResultStreamer};
