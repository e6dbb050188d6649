//! Query parameters accepted by the streaming endpoints.

pub(crate) mod stream;
