//! Flagrelay - Flag state
//!
//! The authoritative flag state for one environment: versioned flag and
//! segment descriptors, the data store that holds them, and the upstream
//! flag client that populates the store.
//!
//! # Architecture
//!
//! ```text
//! upstream flag service
//!         │
//!         ▼
//!    FlagClient ──► UpdateSink ──► DataStore (+ change notification)
//!                                      │
//!                                      ▼
//!                               stream providers
//! ```
//!
//! Descriptors keep their upstream JSON body verbatim (`#[serde(flatten)]`
//! passthrough); the relay changes wire framing, never flag semantics.
//! Every store write is version-gated: an upsert that does not advance the
//! per-item version is rejected as stale.

mod client;
mod error;
mod item;
mod memory;
mod polling;
mod store;

pub use client::{ClientConfig, ClientFactory, FlagClient, default_client_factory};
pub use error::StoreError;
pub use item::{AllData, FlagDesc, SegmentDesc, Update};
pub use memory::MemoryDataStore;
pub use polling::PollingFlagClient;
pub use store::{DataStore, DataStoreFactory, MemoryDataStoreFactory, UpdateSink};
