//! Store and flag-client errors

use thiserror::Error;

/// Errors from the data store and the upstream flag client
#[derive(Debug, Error)]
pub enum StoreError {
    /// The upstream rejected the SDK key; this is terminal for the client
    #[error("upstream rejected credentials (status {status})")]
    Unauthorized { status: u16 },

    /// The client could not be constructed
    #[error("failed to construct flag client: {0}")]
    ClientBuild(String),

    /// The client reported a terminal initialization failure
    #[error("flag client failed to initialize: {0}")]
    InitFailed(String),

    /// Upstream request failed; the client retries with backoff
    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    /// Upstream returned a payload the client could not decode
    #[error("failed to decode upstream payload: {0}")]
    Decode(#[from] serde_json::Error),

    /// Operation on a closed client or store
    #[error("flag client is closed")]
    Closed,
}
