//! Flagrelay - Stream fan-out
//!
//! Multiplexes one environment's flag state into many long-lived
//! subscriber streams. Four providers define four wire dialects over the
//! same state:
//!
//! | Provider              | Initial event        | Incremental events        |
//! |-----------------------|----------------------|---------------------------|
//! | server-side all       | `put` (flags+segments) | `patch` / `delete`      |
//! | server-side flags     | `put` (flags only)   | `patch` / `delete` (flags) |
//! | mobile ping           | `ping`               | `ping` on any change      |
//! | JS client ping        | `ping`               | `ping` on visible change  |
//!
//! # Fan-out
//!
//! ```text
//! flag client ──► update sink ──► EnvStream.notify(update)
//!                                     │ snapshot subscribers under lock
//!                                     ▼ try_send outside the lock
//!                         ┌───────────┼───────────┐
//!                         ▼           ▼           ▼
//!                    subscriber  subscriber  subscriber
//!                    (bounded buffer each; a full buffer closes only
//!                     that subscriber)
//! ```
//!
//! All subscribers of one environment observe updates in the same total
//! order because every update arrives through the environment's single
//! client task.

mod event;
mod kind;
mod provider;
mod subscriber;

pub use event::StreamEvent;
pub use kind::StreamKind;
pub use provider::{EnvStream, StreamOptions, StreamProvider};
pub use subscriber::Subscription;

use thiserror::Error;

/// Stream registration errors
#[derive(Debug, Error)]
pub enum StreamError {
    /// The provider (or this environment's stream state) has been closed
    #[error("stream provider is closed")]
    ProviderClosed,
}
