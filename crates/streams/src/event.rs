//! Subscriber-visible stream events

use serde_json::{Value, json};

/// One event on a subscriber stream
///
/// The SSE framing is `event: <name>` / `data: <json>`; `data()` renders
/// the dialect-specific payload.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    /// Full state snapshot; payload shape depends on the dialect
    Put { data: Value },

    /// One item changed
    Patch { path: String, data: Value },

    /// One item was deleted at the given version
    Delete { path: String, version: u64 },

    /// Payload-free change notification; the subscriber polls
    Ping,
}

impl StreamEvent {
    /// SSE event name
    pub fn name(&self) -> &'static str {
        match self {
            StreamEvent::Put { .. } => "put",
            StreamEvent::Patch { .. } => "patch",
            StreamEvent::Delete { .. } => "delete",
            StreamEvent::Ping => "ping",
        }
    }

    /// SSE data line
    pub fn data(&self) -> String {
        match self {
            StreamEvent::Put { data } => data.to_string(),
            StreamEvent::Patch { path, data } => {
                json!({"path": path, "data": data}).to_string()
            }
            StreamEvent::Delete { path, version } => {
                json!({"path": path, "version": version}).to_string()
            }
            StreamEvent::Ping => " ".to_string(),
        }
    }
}

#[cfg(test)]
#[path = "event_test.rs"]
mod tests;
