//! Stream Events and Wire Framing
//!
//! Each event is one `data: {json}\n\n` frame. A well-formed stream has at
//! most one leading `sessionToken`, then any number of `status` and
//! `content` frames, then exactly one `done` or `error`.

use serde_json::{Map, Value, json};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    SessionToken(String),
    Status {
        status: String,
        query: Option<String>,
    },
    Content(String),
    Error(String),
    Done,
}

impl StreamEvent {
    pub fn status(status: impl Into<String>, query: Option<String>) -> Self {
        StreamEvent::Status {
            status: status.into(),
            query,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Error(_) | StreamEvent::Done)
    }

    pub fn to_json(&self) -> Value {
        match self {
            StreamEvent::SessionToken(token) => json!({ "sessionToken": token }),
            StreamEvent::Status { status, query } => {
                let mut object = Map::new();
                object.insert("status".to_string(), Value::from(status.as_str()));
                if let Some(query) = query {
                    object.insert("query".to_string(), Value::from(query.as_str()));
                }
                Value::Object(object)
            }
            StreamEvent::Content(text) => json!({ "content": text }),
            StreamEvent::Error(message) => json!({ "error": message }),
            StreamEvent::Done => json!({ "done": true }),
        }
    }

    /// One complete frame
    pub fn encode(&self) -> String {
        format!("data: {}\n\n", self.to_json())
    }

    pub fn from_json(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        if let Some(token) = object.get("sessionToken").and_then(Value::as_str) {
            return Some(StreamEvent::SessionToken(token.to_string()));
        }
        if let Some(status) = object.get("status").and_then(Value::as_str) {
            let query = object
                .get("query")
                .and_then(Value::as_str)
                .map(str::to_string);
            return Some(StreamEvent::status(status, query));
        }
        if let Some(text) = object.get("content").and_then(Value::as_str) {
            return Some(StreamEvent::Content(text.to_string()));
        }
        if let Some(message) = object.get("error").and_then(Value::as_str) {
            return Some(StreamEvent::Error(message.to_string()));
        }
        if object.get("done").and_then(Value::as_bool) == Some(true) {
            return Some(StreamEvent::Done);
        }
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("frame is not valid UTF-8")]
    Utf8,
    #[error("frame has no data line")]
    NoData,
    #[error("frame data is not JSON: {0}")]
    Json(String),
    #[error("unrecognized event: {0}")]
    Unknown(String),
}

/// Incremental frame parser.
///
/// Bytes are buffered until a blank line completes a frame, so chunks may
/// split anywhere, including inside a multi-byte character.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns every frame it completed, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<StreamEvent, DecodeError>> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some((end, separator_len)) = find_frame_end(&self.buffer) {
            let frame: Vec<u8> = self.buffer.drain(..end + separator_len).take(end).collect();
            if is_blank_or_comment(&frame) {
                continue;
            }
            events.push(parse_frame(&frame));
        }
        events
    }

    /// Bytes received after the last complete frame
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

/// Position and length of the first blank-line separator
fn find_frame_end(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = buffer.windows(2).position(|w| w == b"\n\n").map(|i| (i, 2));
    let crlf = buffer
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|i| (i, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn is_blank_or_comment(frame: &[u8]) -> bool {
    frame
        .split(|b| *b == b'\n')
        .map(|line| line.trim_ascii())
        .all(|line| line.is_empty() || line.starts_with(b":"))
}

fn parse_frame(frame: &[u8]) -> Result<StreamEvent, DecodeError> {
    let text = std::str::from_utf8(frame).map_err(|_| DecodeError::Utf8)?;

    // multiple data lines are joined with newlines
    let data: Vec<&str> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
        .collect();
    if data.is_empty() {
        return Err(DecodeError::NoData);
    }
    let data = data.join("\n");

    let value: Value = serde_json::from_str(&data).map_err(|e| DecodeError::Json(e.to_string()))?;
    StreamEvent::from_json(&value).ok_or(DecodeError::Unknown(data))
}
