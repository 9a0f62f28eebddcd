//! Event relay settings

use std::time::Duration;

use serde::Deserialize;

/// Minimum allowed flush interval
pub const MIN_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Settings for forwarding analytics events upstream
///
/// # Example
///
/// ```toml
/// [events]
/// events_uri = "https://events.launchdarkly.com"
/// send_events = true
/// flush_interval = "5s"
/// capacity = 1000
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Upstream event service base URI
    pub events_uri: String,

    /// Master switch; when false, received events are accepted and dropped
    /// Default: true
    pub send_events: bool,

    /// How often queued events are posted upstream (floor 1s)
    /// Default: 5s
    #[serde(with = "humantime_serde")]
    pub flush_interval: Duration,

    /// If N > 0, each incoming batch is forwarded with probability 1/N
    /// Default: 0 (forward everything)
    pub sampling_interval: u32,

    /// Maximum queued batches per publisher before the oldest is dropped
    /// Default: 1000
    pub capacity: usize,

    /// Forward full user objects instead of keys in legacy events
    /// Default: false
    pub inline_users: bool,
}

impl EventsConfig {
    /// Flush interval clamped to the configured floor
    pub fn effective_flush_interval(&self) -> Duration {
        self.flush_interval.max(MIN_FLUSH_INTERVAL)
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            events_uri: "https://events.launchdarkly.com".into(),
            send_events: true,
            flush_interval: Duration::from_secs(5),
            sampling_interval: 0,
            capacity: 1000,
            inline_users: false,
        }
    }
}
