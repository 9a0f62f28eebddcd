//! Tests for stream event framing and dialect payloads

use super::*;
use crate::kind::StreamKind;

use flagrelay_store::{AllData, FlagDesc, SegmentDesc, Update};
use serde_json::json;

fn flag(key: &str, version: u64, client_side: bool) -> FlagDesc {
    FlagDesc {
        key: key.into(),
        version,
        client_side,
        deleted: false,
        body: Default::default(),
    }
}

fn segment(key: &str, version: u64) -> SegmentDesc {
    SegmentDesc {
        key: key.into(),
        version,
        deleted: false,
        body: Default::default(),
    }
}

fn snapshot() -> AllData {
    let mut data = AllData::default();
    data.flags.insert("f1".into(), flag("f1", 2, true));
    data.segments.insert("s1".into(), segment("s1", 1));
    data
}

// ============================================================================
// Event framing
// ============================================================================

#[test]
fn event_names_match_sse_dialect() {
    assert_eq!(StreamEvent::Ping.name(), "ping");
    assert_eq!(StreamEvent::Put { data: json!({}) }.name(), "put");
    assert_eq!(
        StreamEvent::Delete {
            path: "/flags/x".into(),
            version: 3
        }
        .name(),
        "delete"
    );
}

#[test]
fn patch_data_wraps_path_and_item() {
    let event = StreamEvent::Patch {
        path: "/flags/f1".into(),
        data: json!({"key": "f1"}),
    };
    let data: serde_json::Value = serde_json::from_str(&event.data()).unwrap();
    assert_eq!(data["path"], "/flags/f1");
    assert_eq!(data["data"]["key"], "f1");
}

#[test]
fn delete_data_carries_deleting_version() {
    let event = StreamEvent::Delete {
        path: "/segments/s1".into(),
        version: 9,
    };
    let data: serde_json::Value = serde_json::from_str(&event.data()).unwrap();
    assert_eq!(data["version"], 9);
}

// ============================================================================
// Dialect: server-side all
// ============================================================================

#[test]
fn all_stream_initial_put_has_flags_and_segments() {
    let event = StreamKind::ServerSideAll.initial_event(&snapshot());
    let StreamEvent::Put { data } = event else {
        panic!("expected put");
    };
    assert_eq!(data["path"], "/");
    assert_eq!(data["data"]["flags"]["f1"]["version"], 2);
    assert_eq!(data["data"]["segments"]["s1"]["version"], 1);
}

#[test]
fn all_stream_patches_flags_and_segments() {
    let kind = StreamKind::ServerSideAll;

    let event = kind.update_event(&Update::Flag(flag("f1", 3, false))).unwrap();
    assert!(matches!(event, StreamEvent::Patch { ref path, .. } if path == "/flags/f1"));

    let event = kind.update_event(&Update::Segment(segment("s1", 2))).unwrap();
    assert!(matches!(event, StreamEvent::Patch { ref path, .. } if path == "/segments/s1"));
}

#[test]
fn all_stream_deletion_becomes_delete_event() {
    let event = StreamKind::ServerSideAll
        .update_event(&Update::Flag(FlagDesc::tombstone("f1", 4)))
        .unwrap();
    assert!(
        matches!(event, StreamEvent::Delete { ref path, version } if path == "/flags/f1" && version == 4)
    );
}

// ============================================================================
// Dialect: server-side flags only
// ============================================================================

#[test]
fn flags_only_initial_put_is_bare_flags_map() {
    let event = StreamKind::ServerSideFlagsOnly.initial_event(&snapshot());
    let StreamEvent::Put { data } = event else {
        panic!("expected put");
    };
    assert_eq!(data["f1"]["version"], 2);
    assert!(data.get("segments").is_none());
}

#[test]
fn flags_only_ignores_segments_and_uses_bare_paths() {
    let kind = StreamKind::ServerSideFlagsOnly;
    assert!(kind.update_event(&Update::Segment(segment("s1", 2))).is_none());

    let event = kind.update_event(&Update::Flag(flag("f1", 3, false))).unwrap();
    assert!(matches!(event, StreamEvent::Patch { ref path, .. } if path == "/f1"));
}

// ============================================================================
// Dialects: ping streams
// ============================================================================

#[test]
fn ping_streams_start_with_ping() {
    assert_eq!(
        StreamKind::MobilePing.initial_event(&snapshot()),
        StreamEvent::Ping
    );
    assert_eq!(
        StreamKind::JsClientPing.initial_event(&snapshot()),
        StreamEvent::Ping
    );
}

#[test]
fn mobile_ping_fires_on_any_change() {
    let kind = StreamKind::MobilePing;
    assert_eq!(
        kind.update_event(&Update::Flag(flag("f1", 3, false))),
        Some(StreamEvent::Ping)
    );
    assert_eq!(
        kind.update_event(&Update::Segment(segment("s1", 2))),
        Some(StreamEvent::Ping)
    );
}

#[test]
fn js_ping_filters_server_only_flags() {
    let kind = StreamKind::JsClientPing;
    assert!(kind.update_event(&Update::Flag(flag("f1", 3, false))).is_none());
    assert_eq!(
        kind.update_event(&Update::Flag(flag("f1", 3, true))),
        Some(StreamEvent::Ping)
    );
    // deletions and segment changes always ping
    assert_eq!(
        kind.update_event(&Update::Flag(FlagDesc::tombstone("f1", 4))),
        Some(StreamEvent::Ping)
    );
    assert_eq!(
        kind.update_event(&Update::Segment(segment("s1", 2))),
        Some(StreamEvent::Ping)
    );
}
