//! Configuration validation
//!
//! Runs before any resource is acquired; a config that passes here is the
//! only kind the relay core will accept.

use std::collections::HashMap;

use crate::{Config, ConfigError};

/// Validate a full configuration
///
/// Checks that at least one environment exists, that every environment has
/// an SDK key, and that no credential of any kind is shared between two
/// environments.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.environments.is_empty() {
        return Err(ConfigError::NoEnvironments);
    }

    let mut seen_sdk: HashMap<&str, &str> = HashMap::new();
    let mut seen_mobile: HashMap<&str, &str> = HashMap::new();
    let mut seen_env_id: HashMap<&str, &str> = HashMap::new();

    for (name, env) in &config.environments {
        if env.sdk_key.is_empty() {
            return Err(ConfigError::MissingSdkKey { env: name.clone() });
        }

        if let Some(first) = seen_sdk.insert(env.sdk_key.expose(), name.as_str()) {
            return Err(ConfigError::DuplicateCredential {
                first: first.to_string(),
                second: name.clone(),
            });
        }
        if let Some(key) = &env.mobile_key
            && let Some(first) = seen_mobile.insert(key.expose(), name.as_str())
        {
            return Err(ConfigError::DuplicateCredential {
                first: first.to_string(),
                second: name.clone(),
            });
        }
        if let Some(id) = &env.env_id
            && let Some(first) = seen_env_id.insert(id.as_str(), name.as_str())
        {
            return Err(ConfigError::DuplicateCredential {
                first: first.to_string(),
                second: name.clone(),
            });
        }

        for (field, value) in [
            ("base_uri", &env.base_uri),
            ("events_uri", &env.events_uri),
        ] {
            if let Some(uri) = value
                && !is_valid_uri(uri)
            {
                return Err(ConfigError::InvalidUri {
                    env: name.clone(),
                    field,
                    value: uri.clone(),
                });
            }
        }
    }

    Ok(())
}

fn is_valid_uri(uri: &str) -> bool {
    uri.starts_with("http://") || uri.starts_with("https://")
}

#[cfg(test)]
#[path = "validation_test.rs"]
mod tests;
