//! Main relay settings

use std::time::Duration;

use serde::Deserialize;

/// Default upstream base URI
pub const DEFAULT_BASE_URI: &str = "https://app.launchdarkly.com";

/// Settings shared by the whole relay process
///
/// # Example
///
/// ```toml
/// [main]
/// host = "0.0.0.0"
/// port = 8030
/// base_uri = "https://app.launchdarkly.com"
/// max_client_connection_time = "30m"
/// heartbeat_interval = "3m"
/// init_timeout = "10s"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MainConfig {
    /// Bind address for the HTTP listener
    /// Default: "0.0.0.0"
    pub host: String,

    /// Listen port
    /// Default: 8030
    pub port: u16,

    /// Upstream base URI for flag data
    pub base_uri: String,

    /// If set, every stream subscriber is disconnected after this long,
    /// forcing periodic reconnects and rebalancing
    #[serde(with = "humantime_serde")]
    pub max_client_connection_time: Option<Duration>,

    /// Cadence of SSE keepalive comments
    /// Default: 3m
    #[serde(with = "humantime_serde")]
    pub heartbeat_interval: Duration,

    /// How long startup waits for all environments to initialize
    /// Default: 10s
    #[serde(with = "humantime_serde")]
    pub init_timeout: Duration,
}

impl Default for MainConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8030,
            base_uri: DEFAULT_BASE_URI.into(),
            max_client_connection_time: None,
            heartbeat_interval: Duration::from_secs(180),
            init_timeout: Duration::from_secs(10),
        }
    }
}
