//! Lifecycle frames and their text event-stream encoding.
//!
//! ```text
//! event: chunk
//! data: {"chunk":"hello"}
//!
//! ```

use serde_json::{json, Value};

use crate::chunk::Chunk;
use crate::key::SessionKey;

/// One discrete message emitted over a long-lived connection.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Open { session_key: SessionKey },
    Chunk(Chunk),
    End,
    Error { message: String },
}

impl Frame {
    pub fn event_name(&self) -> &'static str {
        match self {
            Frame::Open { .. } => "open",
            Frame::Chunk(_) => "chunk",
            Frame::End => "end",
            Frame::Error { .. } => "error",
        }
    }

    pub fn payload(&self) -> Value {
        match self {
            Frame::Open { session_key } => json!({ "session_key": session_key }),
            Frame::Chunk(chunk) => chunk.payload(),
            Frame::End => json!({ "ok": true }),
            Frame::Error { message } => json!({ "message": message }),
        }
    }

    /// True for `end` and `error`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Frame::End | Frame::Error { .. })
    }

    /// Encode as a text event-stream block, including the blank-line terminator.
    pub fn encode(&self) -> String {
        let data = self.payload().to_string();
        let mut out = format!("event: {}\n", self.event_name());
        for line in data.lines() {
            out.push_str("data: ");
            out.push_str(line);
            out.push('\n');
        }
        out.push('\n');
        out
    }

    /// Parse an event-stream body back into `(event, payload)` pairs.
    ///
    /// Comment lines (keep-alives) are skipped. Blocks without an `event:` line
    /// are reported as `message`. Payloads that are not JSON come back as strings.
    pub fn decode_stream(body: &str) -> Vec<(String, Value)> {
        let normalized = body.replace("\r\n", "\n");
        let mut frames = Vec::new();

        for block in normalized.split("\n\n") {
            let mut event: Option<&str> = None;
            let mut data: Vec<&str> = Vec::new();

            for line in block.lines() {
                if line.starts_with(':') {
                    continue;
                }
                if let Some(name) = line.strip_prefix("event:") {
                    event = Some(name.trim());
                } else if let Some(payload) = line.strip_prefix("data:") {
                    data.push(payload.strip_prefix(' ').unwrap_or(payload));
                }
            }

            if event.is_none() && data.is_empty() {
                continue;
            }

            let raw = data.join("\n");
            let payload = serde_json::from_str(&raw).unwrap_or(Value::String(raw));
            frames.push((event.unwrap_or("message").to_string(), payload));
        }

        frames
    }
}
