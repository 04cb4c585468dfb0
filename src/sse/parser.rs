//! SSE line parsing.
//!
//! The Hermes backend streams newline-delimited `data: <payload>` lines.
//! Four literal payloads are sentinels recognized before any JSON decoding;
//! everything else is parsed as a JSON object whose `event` field names the
//! event type. Lines that do not carry a data marker, and payloads that are
//! not valid JSON objects, are dropped without an error so a single garbled
//! line can never abort an exchange.

use serde_json::Value;

use crate::sse::events::{EventKind, StreamEvent};

/// Prefix marking a data line in the SSE stream.
pub const DATA_PREFIX: &str = "data:";

/// Literal payload signalling the end of the stream.
pub const DONE_MARKER: &str = "[DONE]";

/// Literal payload signalling a backend error.
pub const ERROR_MARKER: &str = "[ERROR]";

/// Literal payload signalling withheld sensitive content.
pub const SENSITIVE_MARKER: &str = "[SENSITIVE]";

/// Literal keepalive payload sent between events.
pub const HEARTBEAT_PAYLOAD: &str = r#"{"event": "heartbeat"}"#;

/// Parse one raw line from the stream into an event.
///
/// Returns `None` for non-data lines and for malformed payloads; the caller
/// skips those and keeps reading.
pub fn parse_data_line(line: &str) -> Option<StreamEvent> {
    let line = line.trim();
    let payload = line.strip_prefix(DATA_PREFIX)?.trim_start();

    match payload {
        DONE_MARKER => return Some(StreamEvent::sentinel(EventKind::Done)),
        ERROR_MARKER => return Some(StreamEvent::sentinel(EventKind::Error)),
        SENSITIVE_MARKER => return Some(StreamEvent::sentinel(EventKind::Sensitive)),
        HEARTBEAT_PAYLOAD => return Some(StreamEvent::sentinel(EventKind::Heartbeat)),
        _ => {}
    }

    match serde_json::from_str::<Value>(payload) {
        Ok(Value::Object(raw)) => {
            let kind = raw
                .get("event")
                .and_then(Value::as_str)
                .map(EventKind::parse)
                .unwrap_or_else(|| EventKind::Unknown("unknown".to_string()));
            Some(StreamEvent::new(kind, raw))
        }
        Ok(other) => {
            tracing::warn!(payload = %other, "dropping non-object SSE payload");
            None
        }
        Err(err) => {
            tracing::warn!(error = %err, "dropping malformed SSE payload");
            None
        }
    }
}
