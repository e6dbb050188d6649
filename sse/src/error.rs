//! Error types for the `sse` crate.
//!
//! Follows the same pattern as the other layers: a root `Error` struct holding
//! an `ErrorKind` and an optional source for error chaining.
//!
//! Only programmer misuse is reported through these types. Operation failures
//! are sent to the client as `error` frames, and client disconnects are
//! observed through the sink's disconnect signal, so neither ever shows up
//! here once a session has started.
use std::error::Error as StdError;
use std::fmt;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

/// Categories of errors that can occur when starting or driving a session.
#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    /// The sink was already closed (client gone) before the session started.
    SinkClosed,
    /// Response headers may only be written once per sink.
    HeadersAlreadySent,
    /// An event bridge mapping must contain at least one pair.
    EmptyMapping,
    /// Event names must be non-empty and contain no line breaks.
    InvalidEventName(String),
    /// A textual mapping entry could not be parsed as `from:to`.
    InvalidMapping(String),
    /// The session task panicked or was aborted.
    Task,
}

impl Error {
    pub fn new(error_kind: ErrorKind) -> Self {
        Self {
            source: None,
            error_kind,
        }
    }

    pub fn with_source(
        error_kind: ErrorKind,
        source: impl Into<Box<dyn StdError + Send + Sync>>,
    ) -> Self {
        Self {
            source: Some(source.into()),
            error_kind,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.error_kind {
            ErrorKind::SinkClosed => write!(f, "SSE sink is already closed"),
            ErrorKind::HeadersAlreadySent => write!(f, "SSE response headers were already sent"),
            ErrorKind::EmptyMapping => write!(f, "event mapping references no events"),
            ErrorKind::InvalidEventName(name) => write!(f, "invalid SSE event name: {name:?}"),
            ErrorKind::InvalidMapping(entry) => write!(f, "invalid event mapping entry: {entry:?}"),
            ErrorKind::Task => write!(f, "SSE session task failed"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<ErrorKind> for Error {
    fn from(error_kind: ErrorKind) -> Self {
        Self::new(error_kind)
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::with_source(ErrorKind::Task, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_offending_name() {
        let err = Error::new(ErrorKind::InvalidEventName("bad\nname".to_string()));
        assert_eq!(err.to_string(), "invalid SSE event name: \"bad\\nname\"");
    }

    #[test]
    fn test_source_is_exposed_for_chaining() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        let err = Error::with_source(ErrorKind::SinkClosed, io);
        assert!(StdError::source(&err).is_some());
        assert!(StdError::source(&Error::new(ErrorKind::Task)).is_none());
    }
}
