//! Flagrelay - Event relay
//!
//! Accepts analytics event batches from SDKs and forwards them to the
//! upstream event service. Modern SDKs (event schema >= 3) send
//! pre-summarized payloads that are relayed verbatim; legacy SDKs send
//! per-evaluation events that are reduced to summary counts first.
//!
//! # Architecture
//!
//! ```text
//! POST /bulk | /mobile | /events/bulk/{envId}
//!     │ 202 Accepted (before processing)
//!     ▼
//! EndpointDispatcher ── schema >= 3 ──► verbatim relay ──► EventPublisher
//!     │                                                        │
//!     └── schema < 3 ──► EventSummarizer ──► summarizing relay ┘
//!                                                              │
//!                                              POST {events_uri}{path}
//! ```
//!
//! Delivery is at-most-once by design: a batch that fails upstream is
//! dropped and logged, and the SDKs resend on their own schedule.

mod dispatcher;
mod error;
mod publisher;
mod summarizer;

#[cfg(test)]
mod test_support;

pub use dispatcher::{EndpointDispatcher, EndpointKind, EventDispatcher};
pub use error::EventError;
pub use publisher::{EventPublisher, PublisherConfig};
pub use summarizer::summarize;

use serde_json::value::RawValue;

/// HTTP header carrying the event schema version of a payload
pub const EVENT_SCHEMA_HEADER: &str = "X-LaunchDarkly-Event-Schema";

/// Minimum event schema that carries pre-summarized events
pub const SUMMARY_SCHEMA_VERSION: i64 = 3;

/// Event records are opaque JSON; raw slices are kept so the verbatim
/// path re-serializes exactly the bytes that were parsed
pub type EventRecords = Vec<Box<RawValue>>;
