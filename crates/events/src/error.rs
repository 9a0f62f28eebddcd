//! Event relay errors

use thiserror::Error;

/// Errors from the event relay
///
/// Delivery failures are not represented here: per the relay's
/// at-most-once contract they are logged and the batch is dropped.
#[derive(Debug, Error)]
pub enum EventError {
    /// The outbound HTTP client could not be constructed
    #[error("failed to construct event HTTP client: {0}")]
    ClientBuild(String),
}
