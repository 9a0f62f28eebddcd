//! Data store and update-sink traits
//!
//! The store holds one environment's flag state. Persistent backends
//! (Redis, DynamoDB, ...) plug in through `DataStoreFactory`; only the
//! in-memory store ships with the core.

use std::sync::Arc;

use crate::error::StoreError;
use crate::item::{AllData, Update};
use crate::memory::MemoryDataStore;

/// One environment's flag state
pub trait DataStore: Send + Sync {
    /// Replace the entire state with a fresh snapshot
    fn init(&self, data: AllData);

    /// Apply one incremental change; returns false if the change is stale
    /// (its version does not advance the stored item's version)
    fn upsert(&self, update: Update) -> bool;

    /// Whether `init` has been called at least once
    fn initialized(&self) -> bool;

    /// Snapshot of the current state, excluding tombstones
    fn all(&self) -> AllData;

    /// Release backend resources; further writes are ignored
    fn close(&self);
}

/// Constructs the data store for one environment
pub trait DataStoreFactory: Send + Sync {
    fn create(&self, env_name: &str) -> Result<Arc<dyn DataStore>, StoreError>;
}

/// Factory for the in-memory store
#[derive(Debug, Default)]
pub struct MemoryDataStoreFactory;

impl DataStoreFactory for MemoryDataStoreFactory {
    fn create(&self, _env_name: &str) -> Result<Arc<dyn DataStore>, StoreError> {
        Ok(Arc::new(MemoryDataStore::new()))
    }
}

/// Where a flag client delivers upstream data
///
/// Implementations apply the data to the environment's store and notify
/// downstream subscribers of accepted changes. All calls for one
/// environment come from a single client task, which is what gives every
/// subscriber the same total order of updates.
pub trait UpdateSink: Send + Sync {
    /// Deliver a full snapshot
    fn init(&self, data: AllData);

    /// Deliver one incremental change; returns false if it was stale
    fn upsert(&self, update: Update) -> bool;
}
