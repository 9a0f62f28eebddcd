//! Flagrelay - Relay core
//!
//! The coordinator that ties the crates together: it owns one
//! `EnvContext` per configured environment, indexes their credentials for
//! O(1) request routing, owns the four stream providers, and exposes the
//! whole inbound HTTP surface.
//!
//! # Lifecycle
//!
//! ```text
//! RelayCore::new(config)
//!     │ per environment: store → flag client → stream registration
//!     │                  → metrics scope → init watcher
//!     ▼
//! wait_for_all_clients(timeout)      every env reports ready or failed
//!     ▼
//! serve (axum router)                streams, events, status
//!     ▼
//! close()                            idempotent, tears down everything
//! ```

mod cleanup;
mod envcontext;
mod error;
mod index;
mod relay_core;
mod routes;

pub use cleanup::CleanupStack;
pub use envcontext::{EnvContext, InitState};
pub use error::RelayError;
pub use index::CredentialIndex;
pub use relay_core::RelayCore;
pub use routes::build_router;
