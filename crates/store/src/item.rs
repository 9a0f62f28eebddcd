//! Flag and segment descriptors
//!
//! The relay does not evaluate flags, so descriptors only lift out the
//! fields the core needs (key, version, visibility, deletion) and carry
//! everything else as an opaque passthrough map that round-trips to the
//! exact upstream JSON.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A feature flag as received from the upstream service
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagDesc {
    pub key: String,

    #[serde(default)]
    pub version: u64,

    /// Whether browser SDKs may see this flag
    #[serde(default)]
    pub client_side: bool,

    /// Tombstone marker; deleted items keep their slot so version
    /// comparison still works
    #[serde(default, skip_serializing_if = "is_false")]
    pub deleted: bool,

    /// All remaining upstream fields, preserved verbatim
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

impl FlagDesc {
    /// A tombstone for a deleted flag
    pub fn tombstone(key: impl Into<String>, version: u64) -> Self {
        Self {
            key: key.into(),
            version,
            client_side: false,
            deleted: true,
            body: Map::new(),
        }
    }
}

/// A user segment as received from the upstream service
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentDesc {
    pub key: String,

    #[serde(default)]
    pub version: u64,

    #[serde(default, skip_serializing_if = "is_false")]
    pub deleted: bool,

    #[serde(flatten)]
    pub body: Map<String, Value>,
}

impl SegmentDesc {
    /// A tombstone for a deleted segment
    pub fn tombstone(key: impl Into<String>, version: u64) -> Self {
        Self {
            key: key.into(),
            version,
            deleted: true,
            body: Map::new(),
        }
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// A full flag-state snapshot, as returned by the upstream poll endpoint
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AllData {
    #[serde(default)]
    pub flags: std::collections::BTreeMap<String, FlagDesc>,

    #[serde(default)]
    pub segments: std::collections::BTreeMap<String, SegmentDesc>,
}

/// One incremental change to the flag state
///
/// Deletions are modeled as tombstone upserts so that the change carries
/// the deleting version.
#[derive(Clone, Debug, PartialEq)]
pub enum Update {
    Flag(FlagDesc),
    Segment(SegmentDesc),
}

impl Update {
    pub fn key(&self) -> &str {
        match self {
            Update::Flag(f) => &f.key,
            Update::Segment(s) => &s.key,
        }
    }

    pub fn version(&self) -> u64 {
        match self {
            Update::Flag(f) => f.version,
            Update::Segment(s) => s.version,
        }
    }

    pub fn is_deletion(&self) -> bool {
        match self {
            Update::Flag(f) => f.deleted,
            Update::Segment(s) => s.deleted,
        }
    }
}
