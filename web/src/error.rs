use std::error::Error as StdError;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use log::*;

use sse::error::{Error as SseError, ErrorKind as SseErrorKind};

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// Errors raised while opening a stream.
    Stream(SseError),
    /// A query parameter could not be interpreted.
    InvalidParam(String),
    /// The HTTP response could not be assembled.
    Response(String),
}

impl StdError for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> core::result::Result<(), std::fmt::Error> {
        write!(fmt, "{self:?}")
    }
}

// List of possible StatusCode variants https://docs.rs/http/latest/http/status/struct.StatusCode.html#associatedconstant.UNPROCESSABLE_ENTITY
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self {
            Error::Stream(err) => match err.error_kind {
                SseErrorKind::EmptyMapping
                | SseErrorKind::InvalidEventName(_)
                | SseErrorKind::InvalidMapping(_) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, err.to_string()).into_response()
                }
                SseErrorKind::SinkClosed | SseErrorKind::HeadersAlreadySent | SseErrorKind::Task => {
                    error!("Failed to open SSE stream: {err}");
                    (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL SERVER ERROR").into_response()
                }
            },
            Error::InvalidParam(message) => (StatusCode::BAD_REQUEST, message).into_response(),
            Error::Response(message) => {
                error!("Failed to build SSE response: {message}");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL SERVER ERROR").into_response()
            }
        }
    }
}

impl From<SseError> for Error {
    fn from(err: SseError) -> Self {
        Error::Stream(err)
    }
}
