//! SSE wire format: frame encoding and a small parser for the same grammar.
//!
//! ```text
//! event: <name>\n
//! data: <payload>\n
//! \n
//! ```
//!
//! A frame without payload is written as `event: <name>\ndata\n\n`. Keep-alive
//! comments are written as `:\n\n` and ignored by conforming clients.

use crate::error::{Error, ErrorKind, Result};
use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Reserved event name marking the end of a result stream.
pub const CLOSE: &str = "close";
/// Reserved event name for a resolved operation.
pub const SUCCESS: &str = "success";
/// Reserved event name for a failed operation.
pub const ERROR: &str = "error";

const COMMENT: &[u8] = b":\n\n";

/// A validated SSE event name: non-empty and free of line breaks.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventName(String);

impl EventName {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() || name.contains(['\n', '\r']) {
            return Err(Error::new(ErrorKind::InvalidEventName(name)));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn reserved(name: &'static str) -> Self {
        Self(name.to_string())
    }
}

impl FromStr for EventName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Frame payload. Text is written verbatim, structured values as compact JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum Data {
    Text(String),
    Json(Value),
}

impl Data {
    /// Serialize any value, keeping plain strings as verbatim text. Values
    /// serializing to `null` (including `()`) carry no payload.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<Option<Self>> {
        serde_json::to_value(value).map(Self::payload)
    }

    /// `None` for `null`, otherwise the value as frame data.
    pub fn payload(value: Value) -> Option<Self> {
        (!value.is_null()).then(|| Self::from(value))
    }

    fn to_text(&self) -> String {
        match self {
            Data::Text(text) => text.clone(),
            Data::Json(value) => value.to_string(),
        }
    }
}

impl From<String> for Data {
    fn from(text: String) -> Self {
        Data::Text(text)
    }
}

impl From<&str> for Data {
    fn from(text: &str) -> Self {
        Data::Text(text.to_string())
    }
}

impl From<Value> for Data {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) => Data::Text(text),
            other => Data::Json(other),
        }
    }
}

/// One `event`/`data` unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub event: EventName,
    pub data: Option<Data>,
}

impl Frame {
    pub fn new(event: EventName, data: Option<Data>) -> Self {
        Self { event, data }
    }

    pub fn close() -> Self {
        Self::new(EventName::reserved(CLOSE), None)
    }

    pub fn success(data: Option<Data>) -> Self {
        Self::new(EventName::reserved(SUCCESS), data)
    }

    pub fn error(data: Data) -> Self {
        Self::new(EventName::reserved(ERROR), Some(data))
    }

    pub fn encode(&self) -> Bytes {
        encode(&self.event, self.data.as_ref())
    }
}

/// Encode a frame. Total over its input: line breaks inside the payload are
/// split across several `data:` lines, which SSE clients join back with `\n`.
pub fn encode(event: &EventName, data: Option<&Data>) -> Bytes {
    let mut out = String::with_capacity(event.as_str().len() + 16);
    out.push_str("event: ");
    out.push_str(event.as_str());
    out.push('\n');

    match data {
        None => out.push_str("data\n"),
        Some(data) => {
            let text = data.to_text().replace("\r\n", "\n").replace('\r', "\n");
            for line in text.split('\n') {
                out.push_str("data: ");
                out.push_str(line);
                out.push('\n');
            }
        }
    }

    out.push('\n');
    Bytes::from(out)
}

/// The keep-alive comment frame.
pub fn comment() -> Bytes {
    Bytes::from_static(COMMENT)
}

/// One dispatched item from an SSE byte stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Parsed {
    Event { event: String, data: Option<String> },
    Comment(String),
}

/// Parse SSE text into events and comments.
///
/// Fields other than `event` and `data` are ignored, as is a trailing frame
/// with no terminating blank line. A `data` field without a colon carries no
/// payload, mirroring how [`encode`] writes absent data.
pub fn parse(input: &str) -> Vec<Parsed> {
    let normalized = input.replace("\r\n", "\n").replace('\r', "\n");
    let mut parsed = Vec::new();
    let mut event: Option<String> = None;
    let mut data: Option<String> = None;
    let mut pending = false;

    for line in normalized.split('\n') {
        if line.is_empty() {
            if pending {
                parsed.push(Parsed::Event {
                    event: event.take().unwrap_or_else(|| "message".to_string()),
                    data: data.take(),
                });
                pending = false;
            }
            continue;
        }

        if let Some(text) = line.strip_prefix(':') {
            parsed.push(Parsed::Comment(text.to_string()));
            continue;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, Some(value.strip_prefix(' ').unwrap_or(value))),
            None => (line, None),
        };

        match (field, value) {
            ("event", value) => {
                event = Some(value.unwrap_or_default().to_string());
                pending = true;
            }
            ("data", Some(value)) => {
                match data.as_mut() {
                    Some(existing) => {
                        existing.push('\n');
                        existing.push_str(value);
                    }
                    None => data = Some(value.to_string()),
                }
                pending = true;
            }
            ("data", None) => pending = true,
            _ => {}
        }
    }

    parsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn name(s: &str) -> EventName {
        EventName::new(s).unwrap()
    }

    #[test]
    fn test_encode_without_data_writes_bare_data_line() {
        assert_eq!(Frame::close().encode(), Bytes::from("event: close\ndata\n\n"));
    }

    #[test]
    fn test_encode_text_is_verbatim() {
        let bytes = encode(&name("success"), Some(&Data::from("x")));
        assert_eq!(bytes, Bytes::from("event: success\ndata: x\n\n"));
    }

    #[test]
    fn test_encode_structured_value_is_compact_json() {
        let bytes = encode(&name("update"), Some(&Data::from(json!({"pct": 50}))));
        assert_eq!(bytes, Bytes::from("event: update\ndata: {\"pct\":50}\n\n"));
    }

    #[test]
    fn test_serialized_strings_stay_verbatim() {
        assert_eq!(
            Data::from_serialize("hello").unwrap(),
            Some(Data::Text("hello".into()))
        );
        assert_eq!(
            Data::from_serialize(&vec![1, 2]).unwrap(),
            Some(Data::Json(json!([1, 2])))
        );
    }

    #[test]
    fn test_null_values_carry_no_payload() {
        assert_eq!(Data::from_serialize(&()).unwrap(), None);
        assert_eq!(Data::payload(Value::Null), None);
        assert_eq!(Data::payload(json!(0)), Some(Data::Json(json!(0))));
        assert_eq!(
            Frame::success(Data::from_serialize(&()).unwrap()).encode(),
            Bytes::from("event: success\ndata\n\n")
        );
    }

    #[test]
    fn test_embedded_newlines_cannot_terminate_the_frame() {
        let bytes = encode(&name("note"), Some(&Data::from("line one\n\nline three")));
        let text = std::str::from_utf8(&bytes).unwrap();
        assert_eq!(text.matches("\n\n").count(), 1);
        assert!(text.ends_with("\n\n"));

        assert_eq!(
            parse(text),
            vec![Parsed::Event {
                event: "note".into(),
                data: Some("line one\n\nline three".into()),
            }]
        );
    }

    #[test]
    fn test_round_trip_recovers_event_and_data() {
        let frames = [
            Frame::new(name("update"), Some(Data::from(json!({"pct": 50})))),
            Frame::new(name("error"), Some(Data::from("boom"))),
            Frame::new(name("empty"), Some(Data::from(""))),
            Frame::close(),
        ];

        for frame in frames {
            let bytes = frame.encode();
            let parsed = parse(std::str::from_utf8(&bytes).unwrap());
            let expected_data = frame.data.as_ref().map(Data::to_text);
            assert_eq!(
                parsed,
                vec![Parsed::Event {
                    event: frame.event.to_string(),
                    data: expected_data,
                }]
            );
        }
    }

    #[test]
    fn test_parse_reports_comments_and_skips_unknown_fields() {
        let parsed = parse(":\n\nid: 7\nevent: a\ndata: 1\n\n: ping\n\nevent: b\ndata: 2");
        assert_eq!(
            parsed,
            vec![
                Parsed::Comment(String::new()),
                Parsed::Event {
                    event: "a".into(),
                    data: Some("1".into()),
                },
                Parsed::Comment(" ping".into()),
            ]
        );
    }

    #[test]
    fn test_event_name_rejects_empty_and_multiline() {
        assert!(EventName::new("").is_err());
        assert_eq!(
            EventName::new("a\nb").unwrap_err().error_kind,
            ErrorKind::InvalidEventName("a\nb".to_string())
        );
        assert!(EventName::new("a\rb").is_err());
        assert_eq!("update".parse::<EventName>().unwrap().as_str(), "update");
    }

    #[test]
    fn test_comment_frame() {
        assert_eq!(comment(), Bytes::from(":\n\n"));
    }
}
