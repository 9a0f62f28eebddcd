//! Flag client interface
//!
//! The flag client owns one environment's upstream subscription and feeds
//! flag data into the environment's `UpdateSink`. The relay core only
//! depends on this trait; the polling client in this crate is the default
//! implementation, and streaming clients plug in through `ClientFactory`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use flagrelay_config::SdkKey;

use crate::error::StoreError;
use crate::polling::PollingFlagClient;
use crate::store::UpdateSink;

/// Connection settings handed to a client factory
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Upstream base URI
    pub base_uri: String,

    /// How often the default client polls for a fresh snapshot
    pub poll_interval: Duration,

    /// Per-request timeout
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_uri: flagrelay_config::MainConfig::default().base_uri,
            poll_interval: Duration::from_secs(30),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// One environment's upstream subscription
#[async_trait]
pub trait FlagClient: Send + Sync {
    /// Resolves once the client has delivered its first full snapshot, or
    /// with the terminal failure that prevented it. Transient upstream
    /// errors are retried internally and never resolve this.
    async fn wait_ready(&self) -> Result<(), StoreError>;

    /// Whether the first snapshot has been delivered
    fn initialized(&self) -> bool;

    /// Stop the subscription; idempotent
    fn close(&self);
}

/// Constructs the flag client for one environment
pub type ClientFactory = Arc<
    dyn Fn(SdkKey, ClientConfig, Arc<dyn UpdateSink>) -> Result<Arc<dyn FlagClient>, StoreError>
        + Send
        + Sync,
>;

/// The default factory: a polling client
pub fn default_client_factory() -> ClientFactory {
    Arc::new(|sdk_key, config, sink| {
        let client = PollingFlagClient::start(sdk_key, config, sink)?;
        Ok(Arc::new(client) as Arc<dyn FlagClient>)
    })
}
