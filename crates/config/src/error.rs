//! Configuration errors

use thiserror::Error;

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file could not be read
    #[error("failed to read configuration file \"{path}\": {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed
    #[error("failed to parse configuration file \"{path}\": {message}")]
    Parse { path: String, message: String },

    /// No environments configured
    #[error("you must specify at least one environment in your configuration")]
    NoEnvironments,

    /// An environment is missing its SDK key
    #[error("environment \"{env}\" has no sdk_key")]
    MissingSdkKey { env: String },

    /// The same credential appears on more than one environment
    #[error("environments \"{first}\" and \"{second}\" share a credential")]
    DuplicateCredential { first: String, second: String },

    /// A URI field failed basic validation
    #[error("environment \"{env}\": invalid {field}: {value}")]
    InvalidUri {
        env: String,
        field: &'static str,
        value: String,
    },
}
