//! In-memory data store

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use crate::item::{AllData, FlagDesc, SegmentDesc, Update};
use crate::store::DataStore;

/// Versioned in-memory flag state
///
/// Writes are version-gated: an upsert whose version does not exceed the
/// stored item's version is rejected. Tombstones stay in the maps so a
/// late update for a deleted item is still recognized as stale; `all()`
/// filters them out of snapshots.
#[derive(Debug, Default)]
pub struct MemoryDataStore {
    state: RwLock<State>,
    initialized: AtomicBool,
    closed: AtomicBool,
}

#[derive(Debug, Default)]
struct State {
    flags: BTreeMap<String, FlagDesc>,
    segments: BTreeMap<String, SegmentDesc>,
}

impl MemoryDataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DataStore for MemoryDataStore {
    fn init(&self, data: AllData) {
        if self.closed.load(Ordering::Relaxed) {
            return;
        }
        let mut state = self.state.write();
        state.flags = data.flags;
        state.segments = data.segments;
        self.initialized.store(true, Ordering::Release);
    }

    fn upsert(&self, update: Update) -> bool {
        if self.closed.load(Ordering::Relaxed) {
            return false;
        }
        let mut state = self.state.write();
        match update {
            Update::Flag(flag) => {
                if let Some(existing) = state.flags.get(&flag.key)
                    && existing.version >= flag.version
                {
                    return false;
                }
                state.flags.insert(flag.key.clone(), flag);
            }
            Update::Segment(segment) => {
                if let Some(existing) = state.segments.get(&segment.key)
                    && existing.version >= segment.version
                {
                    return false;
                }
                state.segments.insert(segment.key.clone(), segment);
            }
        }
        true
    }

    fn initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    fn all(&self) -> AllData {
        let state = self.state.read();
        AllData {
            flags: state
                .flags
                .iter()
                .filter(|(_, f)| !f.deleted)
                .map(|(k, f)| (k.clone(), f.clone()))
                .collect(),
            segments: state
                .segments
                .iter()
                .filter(|(_, s)| !s.deleted)
                .map(|(k, s)| (k.clone(), s.clone()))
                .collect(),
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod tests;
