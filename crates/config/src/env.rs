//! Per-environment configuration

use serde::Deserialize;

use crate::credentials::{EnvironmentId, MobileKey, SdkKey};

/// Settings for a single environment
///
/// Each environment has an independent upstream subscription identified by
/// its SDK key. The mobile key and environment ID are optional; without
/// them the corresponding endpoints reject requests for this environment.
///
/// # Example
///
/// ```toml
/// [environments.production]
/// sdk_key = "sdk-abc123"
/// mobile_key = "mob-abc123"
/// env_id = "5f0cd446"
/// allowed_origins = ["https://example.com"]
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    /// Server-side SDK key (required, unique across the process)
    pub sdk_key: SdkKey,

    /// Mobile SDK key
    pub mobile_key: Option<MobileKey>,

    /// Environment ID for browser SDKs
    pub env_id: Option<EnvironmentId>,

    /// Browser origins allowed to connect to the JS endpoints
    /// Default: empty (any origin)
    pub allowed_origins: Vec<String>,

    /// Per-environment override of the upstream base URI
    pub base_uri: Option<String>,

    /// Per-environment override of the upstream events URI
    pub events_uri: Option<String>,

    /// Skip TLS verification for this environment's upstream requests.
    /// Only honored for browser-facing proxying; off by default.
    pub insecure_skip_verify: bool,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            sdk_key: SdkKey::new(""),
            mobile_key: None,
            env_id: None,
            allowed_origins: Vec::new(),
            base_uri: None,
            events_uri: None,
            insecure_skip_verify: false,
        }
    }
}
