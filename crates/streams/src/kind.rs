//! Stream dialects

use serde_json::{Map, Value, json};

use flagrelay_store::{AllData, Update};

use crate::event::StreamEvent;

/// The four provider variants and their wire dialects
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// Full flag and segment data for server-side SDKs
    ServerSideAll,

    /// Flags only, for older server-side SDKs
    ServerSideFlagsOnly,

    /// Change notifications for mobile SDKs
    MobilePing,

    /// Change notifications for browser SDKs, filtered to visible flags
    JsClientPing,
}

impl StreamKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StreamKind::ServerSideAll => "server-side",
            StreamKind::ServerSideFlagsOnly => "server-side-flags-only",
            StreamKind::MobilePing => "mobile-ping",
            StreamKind::JsClientPing => "js-client-ping",
        }
    }

    /// The event a new subscriber receives, derived from the current
    /// store snapshot
    pub fn initial_event(self, data: &AllData) -> StreamEvent {
        match self {
            StreamKind::ServerSideAll => StreamEvent::Put {
                data: json!({
                    "path": "/",
                    "data": {
                        "flags": to_object(&data.flags),
                        "segments": to_object(&data.segments),
                    },
                }),
            },
            StreamKind::ServerSideFlagsOnly => StreamEvent::Put {
                data: Value::Object(to_object(&data.flags)),
            },
            StreamKind::MobilePing | StreamKind::JsClientPing => StreamEvent::Ping,
        }
    }

    /// The event an accepted store update produces on this dialect, if
    /// any
    pub fn update_event(self, update: &Update) -> Option<StreamEvent> {
        match self {
            StreamKind::ServerSideAll => {
                let path = match update {
                    Update::Flag(f) => format!("/flags/{}", f.key),
                    Update::Segment(s) => format!("/segments/{}", s.key),
                };
                Some(item_event(update, path))
            }
            StreamKind::ServerSideFlagsOnly => match update {
                Update::Flag(f) => Some(item_event(update, format!("/{}", f.key))),
                Update::Segment(_) => None,
            },
            StreamKind::MobilePing => Some(StreamEvent::Ping),
            StreamKind::JsClientPing => match update {
                // deletions ping unconditionally: a tombstone no longer
                // carries visibility
                Update::Flag(f) if !f.deleted && !f.client_side => None,
                _ => Some(StreamEvent::Ping),
            },
        }
    }
}

fn item_event(update: &Update, path: String) -> StreamEvent {
    if update.is_deletion() {
        return StreamEvent::Delete {
            path,
            version: update.version(),
        };
    }
    let data = match update {
        Update::Flag(f) => serde_json::to_value(f),
        Update::Segment(s) => serde_json::to_value(s),
    }
    .unwrap_or(Value::Null);
    StreamEvent::Patch { path, data }
}

fn to_object<T: serde::Serialize>(
    items: &std::collections::BTreeMap<String, T>,
) -> Map<String, Value> {
    items
        .iter()
        .map(|(k, v)| (k.clone(), serde_json::to_value(v).unwrap_or(Value::Null)))
        .collect()
}
