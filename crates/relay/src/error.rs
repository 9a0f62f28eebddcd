//! Relay core errors

use thiserror::Error;

use flagrelay_config::ConfigError;

/// Errors from relay lifecycle operations
#[derive(Debug, Error)]
pub enum RelayError {
    /// Configuration rejected before any resource was acquired
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Operation on a relay that was already shut down
    #[error("this relay was already shut down")]
    AlreadyClosed,

    /// An added environment's credential is already in use
    #[error("credential is already in use by environment \"{env}\"")]
    DuplicateCredential { env: String },

    /// An environment could not be constructed
    #[error("unable to create environment \"{env}\": {reason}")]
    EnvSetup { env: String, reason: String },

    /// `wait_for_all_clients` hit its deadline
    #[error("timed out waiting for environments to initialize")]
    InitTimeout,

    /// At least one environment reported a terminal init failure
    #[error("one or more environments failed to initialize")]
    SomeEnvironmentsFailed,
}
