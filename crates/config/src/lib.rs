//! Flagrelay - Configuration
//!
//! Typed configuration for the relay proxy: the main relay section, the
//! event-relay section, and one section per environment. Configuration is
//! loaded from TOML and validated before any resource is acquired.
//!
//! # Example
//!
//! ```toml
//! [main]
//! base_uri = "https://app.launchdarkly.com"
//! max_client_connection_time = "30m"
//!
//! [events]
//! events_uri = "https://events.launchdarkly.com"
//! flush_interval = "5s"
//! capacity = 1000
//!
//! [environments.production]
//! sdk_key = "sdk-abc123"
//! mobile_key = "mob-abc123"
//! env_id = "5f0cd446"
//! allowed_origins = ["https://example.com"]
//! ```
//!
//! Credentials are newtypes with masked `Display`/`Debug`; SDK and mobile
//! keys never appear in logs or responses in full.

mod credentials;
mod env;
mod error;
mod events;
mod relay;
mod validation;

pub use credentials::{Credential, EnvironmentId, MobileKey, SdkKey};
pub use env::EnvConfig;
pub use error::ConfigError;
pub use events::EventsConfig;
pub use relay::MainConfig;
pub use validation::validate_config;

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

/// Root configuration for a relay process
///
/// Environments are keyed by their configured name. A `BTreeMap` keeps
/// startup ordering deterministic.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Main relay settings
    pub main: MainConfig,

    /// Event relay settings (shared by all environments)
    pub events: EventsConfig,

    /// Per-environment settings, keyed by environment name
    pub environments: BTreeMap<String, EnvConfig>,
}

impl Config {
    /// Load and validate a configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Config = toml::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        validate_config(&config)?;
        Ok(config)
    }
}
