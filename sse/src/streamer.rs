//! Streams the outcomes of a fixed set of operations as they complete.
//!
//! Each operation yields exactly one `success` or `error` frame, in completion
//! order. Once every operation has settled a single `close` frame is written
//! and the response is ended.

use crate::error::Result;
use crate::frame::{Data, Frame};
use crate::heartbeat::{self, Heartbeat};
use crate::sink::ResponseSink;
use crate::writer::{SessionId, SinkWriter, FRAME_QUEUE_CAPACITY};
use futures::stream::{FuturesUnordered, StreamExt};
use log::*;
use serde::Serialize;
use serde_json::json;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Shape of the payload of an `error` frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePayload {
    /// The failure message as plain text.
    #[default]
    Message,
    /// `{"message": "<failure message>"}`
    Structured,
}

impl FailurePayload {
    fn data(self, failure: &dyn fmt::Display) -> Data {
        let message = failure.to_string();
        match self {
            FailurePayload::Message => Data::Text(message),
            FailurePayload::Structured => Data::Json(json!({ "message": message })),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct FailurePayloadParseError(String);

impl fmt::Display for FailurePayloadParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "unknown failure payload {:?}, expected message or structured", self.0)
    }
}

impl std::error::Error for FailurePayloadParseError {}

impl FromStr for FailurePayload {
    type Err = FailurePayloadParseError;

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "message" => Ok(FailurePayload::Message),
            "structured" => Ok(FailurePayload::Structured),
            _ => Err(FailurePayloadParseError(s.to_string())),
        }
    }
}

impl fmt::Display for FailurePayload {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FailurePayload::Message => write!(f, "message"),
            FailurePayload::Structured => write!(f, "structured"),
        }
    }
}

/// Lifecycle of one result stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open { remaining: usize },
    Closing,
    Closed,
}

impl SessionState {
    pub fn new(operations: usize) -> Self {
        if operations == 0 {
            SessionState::Closing
        } else {
            SessionState::Open {
                remaining: operations,
            }
        }
    }

    /// Record one settled operation. The last one moves the session to `Closing`.
    pub fn settle(self) -> Self {
        match self {
            SessionState::Open { remaining } if remaining > 1 => SessionState::Open {
                remaining: remaining - 1,
            },
            SessionState::Open { .. } => SessionState::Closing,
            other => other,
        }
    }

    /// The `close` frame has been queued.
    pub fn close(self) -> Self {
        SessionState::Closed
    }
}

/// Counts reported once a result stream has ended.
///
/// `succeeded` and `failed` count settled operations, including those that
/// settled after the client went away and whose frames were dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub heartbeat_started: bool,
    pub heartbeats: usize,
    pub client_disconnected: bool,
}

/// Handle to a running result stream.
pub struct StreamHandle {
    session_id: SessionId,
    task: JoinHandle<StreamSummary>,
}

impl StreamHandle {
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Wait until every operation settled and the response was ended.
    pub async fn finished(self) -> Result<StreamSummary> {
        Ok(self.task.await?)
    }
}

#[derive(Debug, Clone)]
pub struct ResultStreamer {
    heartbeat_interval: Duration,
    failure_payload: FailurePayload,
    queue_capacity: usize,
}

impl Default for ResultStreamer {
    fn default() -> Self {
        Self::new(heartbeat::RESULTS_INTERVAL)
    }
}

impl ResultStreamer {
    pub fn new(heartbeat_interval: Duration) -> Self {
        Self {
            heartbeat_interval,
            failure_payload: FailurePayload::default(),
            queue_capacity: FRAME_QUEUE_CAPACITY,
        }
    }

    /// Frames allowed to wait for a slow client before settling operations
    /// are held back.
    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    pub fn with_failure_payload(mut self, failure_payload: FailurePayload) -> Self {
        self.failure_payload = failure_payload;
        self
    }

    /// Open an SSE session on `sink` and report every operation as it settles.
    ///
    /// Only fails when the sink cannot be started (client already gone,
    /// headers already written). After that the stream never fails: operation
    /// errors become `error` frames and a disconnect silently drops the rest.
    pub fn start<S, I, F, T, E>(&self, sink: S, operations: I) -> Result<StreamHandle>
    where
        S: ResponseSink,
        I: IntoIterator<Item = F>,
        F: Future<Output = core::result::Result<T, E>> + Send + 'static,
        T: Serialize + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let pending: FuturesUnordered<F> = operations.into_iter().collect();
        let session_id = SessionId::new();
        let writer = SinkWriter::with_capacity(sink, session_id.clone(), self.queue_capacity)?;

        info!(
            "Started SSE stream {session_id} for {} operation(s)",
            pending.len()
        );

        let task = tokio::spawn(stream_results(writer, pending, self.clone()));
        Ok(StreamHandle { session_id, task })
    }
}

async fn stream_results<F, T, E>(
    writer: SinkWriter,
    mut pending: FuturesUnordered<F>,
    config: ResultStreamer,
) -> StreamSummary
where
    F: Future<Output = core::result::Result<T, E>>,
    T: Serialize,
    E: fmt::Display,
{
    let sender = writer.sender();
    let session_id = writer.session_id().clone();
    let mut summary = StreamSummary::default();
    let mut state = SessionState::new(pending.len());

    // An empty batch closes straight away without a heartbeat
    let heartbeat = match state {
        SessionState::Open { .. } => {
            summary.heartbeat_started = true;
            Some(Heartbeat::start(
                sender.clone(),
                config.heartbeat_interval,
                writer.session().child_token(),
            ))
        }
        _ => None,
    };

    while let SessionState::Open { .. } = state {
        let Some(outcome) = pending.next().await else {
            break;
        };

        let frame = match outcome.map(|value| Data::from_serialize(&value)) {
            Ok(Ok(data)) => {
                summary.succeeded += 1;
                Frame::success(data)
            }
            Ok(Err(e)) => {
                summary.failed += 1;
                Frame::error(config.failure_payload.data(&e))
            }
            Err(e) => {
                summary.failed += 1;
                Frame::error(config.failure_payload.data(&e))
            }
        };

        if sender.send(&frame).await {
            debug!("Sending {} event on SSE stream {session_id}", frame.event);
        } else {
            trace!(
                "Dropped {} event for disconnected SSE stream {session_id}",
                frame.event
            );
        }
        state = state.settle();
    }

    if let Some(heartbeat) = heartbeat {
        summary.heartbeats = heartbeat.shutdown().await;
    }

    sender.send(&Frame::close()).await;
    state = state.close();
    drop(sender);

    match writer.finish().await {
        Ok(report) => summary.client_disconnected = report.client_disconnected,
        Err(e) => error!("SSE writer for stream {session_id} failed: {e}"),
    }

    info!("Closed SSE stream {session_id} ({state:?})");
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::sink::RecordingSink;
    use futures::future::{BoxFuture, FutureExt};
    use tokio::time::sleep;

    type Outcome = core::result::Result<String, String>;

    fn op(
        delay_ms: u64,
        outcome: core::result::Result<&'static str, &'static str>,
    ) -> BoxFuture<'static, Outcome> {
        async move {
            sleep(Duration::from_millis(delay_ms)).await;
            outcome.map(str::to_string).map_err(str::to_string)
        }
        .boxed()
    }

    fn frame(event: &str, data: Option<&str>) -> (String, Option<String>) {
        (event.to_string(), data.map(str::to_string))
    }

    #[test]
    fn test_state_machine_counts_down_to_closing() {
        let state = SessionState::new(2);
        assert_eq!(state, SessionState::Open { remaining: 2 });

        let state = state.settle();
        assert_eq!(state, SessionState::Open { remaining: 1 });

        let state = state.settle();
        assert_eq!(state, SessionState::Closing);
        assert_eq!(state.settle(), SessionState::Closing);
        assert_eq!(state.close(), SessionState::Closed);
    }

    #[test]
    fn test_empty_batch_starts_closing() {
        assert_eq!(SessionState::new(0), SessionState::Closing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_frames_follow_completion_order() {
        let (sink, recording) = RecordingSink::new();
        let handle = ResultStreamer::default()
            .start(sink, vec![op(10, Ok("x")), op(5, Err("boom"))])
            .unwrap();

        let summary = handle.finished().await.unwrap();

        assert_eq!(
            recording.frames(),
            vec![
                frame("error", Some("boom")),
                frame("success", Some("x")),
                frame("close", None),
            ]
        );
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert!(!summary.client_disconnected);
        assert_eq!(recording.end_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_batch_closes_without_heartbeat() {
        let (sink, recording) = RecordingSink::new();
        let handle = ResultStreamer::new(Duration::from_millis(1))
            .start(sink, Vec::<BoxFuture<'static, Outcome>>::new())
            .unwrap();

        let summary = handle.finished().await.unwrap();

        assert!(!summary.heartbeat_started);
        assert_eq!(summary.heartbeats, 0);
        assert_eq!(recording.frames(), vec![frame("close", None)]);
        assert_eq!(recording.comment_count(), 0);
        assert_eq!(recording.end_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_frame_per_operation_and_single_trailing_close() {
        let (sink, recording) = RecordingSink::new();
        let operations = vec![
            op(30, Ok("first")),
            op(10, Err("second failed")),
            op(20, Ok("third")),
            op(0, Ok("fourth")),
        ];
        let summary = ResultStreamer::default()
            .start(sink, operations)
            .unwrap()
            .finished()
            .await
            .unwrap();

        let frames = recording.frames();
        assert_eq!(frames.len(), 5);
        assert_eq!(frames.last(), Some(&frame("close", None)));
        assert_eq!(frames.iter().filter(|(e, _)| e == "close").count(), 1);
        assert_eq!(
            &frames[..4],
            &[
                frame("success", Some("fourth")),
                frame("error", Some("second failed")),
                frame("success", Some("third")),
                frame("success", Some("first")),
            ]
        );
        assert_eq!((summary.succeeded, summary.failed), (3, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeats_never_follow_close() {
        let (sink, recording) = RecordingSink::new();
        let summary = ResultStreamer::new(Duration::from_millis(1))
            .start(sink, vec![op(10, Ok("done"))])
            .unwrap()
            .finished()
            .await
            .unwrap();

        assert!(summary.heartbeat_started);
        assert!(summary.heartbeats > 0);
        assert_eq!(recording.comment_count(), summary.heartbeats);

        let parsed = recording.parsed();
        assert_eq!(
            parsed.last(),
            Some(&crate::frame::Parsed::Event {
                event: "close".into(),
                data: None,
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_structured_values_are_sent_as_json() {
        #[derive(Serialize)]
        struct Report {
            total: u32,
        }

        let (sink, recording) = RecordingSink::new();
        let operation = async { Ok::<_, String>(Report { total: 3 }) };
        ResultStreamer::default()
            .start(sink, vec![operation])
            .unwrap()
            .finished()
            .await
            .unwrap();

        assert_eq!(recording.frames()[0], frame("success", Some("{\"total\":3}")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unit_results_carry_no_payload() {
        let (sink, recording) = RecordingSink::new();
        ResultStreamer::default()
            .start(sink, vec![async { Ok::<(), String>(()) }])
            .unwrap()
            .finished()
            .await
            .unwrap();

        assert_eq!(recording.text(), "event: success\ndata\n\nevent: close\ndata\n\n");
    }

    #[tokio::test(start_paused = true)]
    async fn test_structured_failure_payload() {
        let (sink, recording) = RecordingSink::new();
        ResultStreamer::default()
            .with_failure_payload(FailurePayload::Structured)
            .start(sink, vec![op(1, Err("boom"))])
            .unwrap()
            .finished()
            .await
            .unwrap();

        assert_eq!(
            recording.frames()[0],
            frame("error", Some("{\"message\":\"boom\"}"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_drops_remaining_frames_but_settles_everything() {
        let (sink, recording) = RecordingSink::new();
        let handle = ResultStreamer::new(Duration::from_millis(2))
            .start(sink, vec![op(5, Ok("early")), op(50, Ok("late"))])
            .unwrap();

        sleep(Duration::from_millis(10)).await;
        recording.disconnect();

        let summary = handle.finished().await.unwrap();

        assert!(summary.client_disconnected);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(recording.frames(), vec![frame("success", Some("early"))]);
        assert_eq!(recording.end_calls(), 1);
    }

    #[tokio::test]
    async fn test_start_on_closed_sink_fails_immediately() {
        let (sink, recording) = RecordingSink::new();
        recording.disconnect();

        let err = ResultStreamer::default()
            .start(sink, vec![op(1, Ok("never"))])
            .err()
            .unwrap();
        assert_eq!(err.error_kind, ErrorKind::SinkClosed);
    }

    #[test]
    fn test_failure_payload_parses_case_insensitively() {
        assert_eq!(
            "Structured".parse::<FailurePayload>().unwrap(),
            FailurePayload::Structured
        );
        assert_eq!(
            "message".parse::<FailurePayload>().unwrap(),
            FailurePayload::Message
        );
        assert!("object".parse::<FailurePayload>().is_err());
    }
}
