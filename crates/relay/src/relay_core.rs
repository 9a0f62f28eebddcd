//! Relay core
//!
//! Top-level coordinator. Constructs and indexes every configured
//! environment, owns the four stream providers and the metrics manager,
//! and drives the init-wait and shutdown sequences.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use flagrelay_config::{Config, Credential, EnvConfig, SdkKey, validate_config};
use flagrelay_metrics::MetricsManager;
use flagrelay_store::{
    ClientFactory, DataStoreFactory, MemoryDataStoreFactory, default_client_factory,
};
use flagrelay_streams::{StreamKind, StreamOptions, StreamProvider};

use crate::cleanup::CleanupStack;
use crate::envcontext::{EnvContext, StreamProviders};
use crate::error::RelayError;
use crate::index::CredentialIndex;

/// Relay lifecycle; transitions are one-way
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Lifecycle {
    Configuring,
    Running,
    Closed,
}

/// Core logic shared by every variant of the relay
pub struct RelayCore {
    config: Config,
    index: CredentialIndex,
    lifecycle: Mutex<Lifecycle>,
    metrics: Arc<MetricsManager>,
    providers: Arc<StreamProviders>,
    client_factory: ClientFactory,
    store_factory: Arc<dyn DataStoreFactory>,
    init_tx: mpsc::Sender<Arc<EnvContext>>,
    init_rx: tokio::sync::Mutex<mpsc::Receiver<Arc<EnvContext>>>,
}

impl RelayCore {
    /// Create the core and immediately start initializing every
    /// configured environment
    ///
    /// Partial failures do not leak: everything constructed before the
    /// failing environment is torn down before the error returns.
    pub fn new(
        config: Config,
        client_factory: ClientFactory,
        store_factory: Arc<dyn DataStoreFactory>,
    ) -> Result<Arc<RelayCore>, RelayError> {
        validate_config(&config)?;

        let mut cleanup = CleanupStack::new();

        let metrics = Arc::new(MetricsManager::new());
        {
            let metrics = Arc::clone(&metrics);
            cleanup.push(move || metrics.close());
        }

        let stream_options = StreamOptions {
            max_connection_time: config.main.max_client_connection_time,
            heartbeat_interval: config.main.heartbeat_interval,
            ..StreamOptions::default()
        };
        let providers = Arc::new(StreamProviders::new(stream_options));
        {
            let providers = Arc::clone(&providers);
            cleanup.push(move || providers.close_all());
        }

        let (init_tx, init_rx) = mpsc::channel(config.environments.len().max(1));

        let core = Arc::new(RelayCore {
            config: config.clone(),
            index: CredentialIndex::new(),
            lifecycle: Mutex::new(Lifecycle::Configuring),
            metrics,
            providers,
            client_factory,
            store_factory,
            init_tx,
            init_rx: tokio::sync::Mutex::new(init_rx),
        });

        for (env_name, env_config) in &config.environments {
            let (env, mut result_rx) =
                core.add_environment(env_name.clone(), env_config.clone())?;
            {
                let env = Arc::clone(&env);
                cleanup.push(move || {
                    tokio::spawn(async move { env.close().await });
                });
            }
            // forward this environment's single-shot init result onto the
            // shared channel that wait_for_all_clients drains
            let init_tx = core.init_tx.clone();
            tokio::spawn(async move {
                if let Some(env) = result_rx.recv().await {
                    let _ = init_tx.send(env).await;
                }
            });
        }

        *core.lifecycle.lock() = Lifecycle::Running;
        cleanup.clear();

        tracing::info!(
            environments = core.index.len(),
            relay_id = core.metrics.relay_id(),
            "relay core configured"
        );
        Ok(core)
    }

    /// `new` with the default polling client and the in-memory store
    pub fn with_defaults(config: Config) -> Result<Arc<RelayCore>, RelayError> {
        Self::new(
            config,
            default_client_factory(),
            Arc::new(MemoryDataStoreFactory),
        )
    }

    /// Add one environment
    ///
    /// Returns the context plus a single-shot channel carrying it once
    /// its flag client reports ready or terminally failed. Fails after
    /// `close` with `AlreadyClosed`, and on an SDK-key collision with
    /// `DuplicateCredential` without acquiring anything.
    pub fn add_environment(
        &self,
        env_name: String,
        env_config: EnvConfig,
    ) -> Result<(Arc<EnvContext>, mpsc::Receiver<Arc<EnvContext>>), RelayError> {
        let lifecycle = self.lifecycle.lock();
        if *lifecycle == Lifecycle::Closed {
            return Err(RelayError::AlreadyClosed);
        }

        if let Some(existing) = self
            .index
            .lookup(&Credential::SdkKey(env_config.sdk_key.clone()))
        {
            return Err(RelayError::DuplicateCredential {
                env: existing.name().to_string(),
            });
        }

        let (env, result_rx) = EnvContext::new(
            env_name,
            env_config.clone(),
            &self.config.main,
            &self.config.events,
            &self.client_factory,
            &self.store_factory,
            &self.providers,
            &self.metrics,
        )?;
        if let Err(e) = self.index.insert(&env_config, Arc::clone(&env)) {
            let env = Arc::clone(&env);
            tokio::spawn(async move { env.close().await });
            return Err(e);
        }

        Ok((env, result_rx))
    }

    /// Shut down and remove one environment by its SDK key
    ///
    /// Index entries go first, so requests with this environment's
    /// credentials are rejected before its current clients disconnect.
    /// Returns false if no such environment exists.
    pub async fn remove_environment(&self, sdk_key: &SdkKey) -> bool {
        let Some(env) = self.index.remove(sdk_key) else {
            return false;
        };
        env.close().await;
        true
    }

    /// O(1) credential lookup
    pub fn environment(&self, credential: &Credential) -> Option<Arc<EnvContext>> {
        self.index.lookup(credential)
    }

    /// Every configured environment
    pub fn environments(&self) -> Vec<Arc<EnvContext>> {
        self.index.all()
    }

    pub fn metrics(&self) -> &Arc<MetricsManager> {
        &self.metrics
    }

    /// The provider for one stream dialect
    pub(crate) fn provider(&self, kind: StreamKind) -> &StreamProvider {
        self.providers.get(kind)
    }

    /// Block until every environment present right now has reported init
    /// success or failure
    ///
    /// A zero timeout waits indefinitely. Environments that fail stay
    /// registered in the `failed` state and keep rejecting requests; the
    /// relay itself keeps running.
    pub async fn wait_for_all_clients(&self, timeout: Duration) -> Result<(), RelayError> {
        let expected = self.index.len();
        let mut init_rx = self.init_rx.lock().await;

        let deadline = (!timeout.is_zero()).then(|| tokio::time::Instant::now() + timeout);
        let mut any_failed = false;
        let mut finished = 0;

        while finished < expected {
            let received = match deadline {
                Some(deadline) => {
                    match tokio::time::timeout_at(deadline, init_rx.recv()).await {
                        Ok(received) => received,
                        Err(_) => return Err(RelayError::InitTimeout),
                    }
                }
                None => init_rx.recv().await,
            };
            let Some(env) = received else {
                break;
            };
            finished += 1;
            if env.init_error().is_some() {
                any_failed = true;
            }
        }

        if any_failed {
            return Err(RelayError::SomeEnvironmentsFailed);
        }
        Ok(())
    }

    /// Whether `close` has run
    pub fn is_closed(&self) -> bool {
        *self.lifecycle.lock() == Lifecycle::Closed
    }

    /// Shut down every environment and release all resources; idempotent
    pub async fn close(&self) {
        {
            let mut lifecycle = self.lifecycle.lock();
            if *lifecycle == Lifecycle::Closed {
                return;
            }
            *lifecycle = Lifecycle::Closed;
        }

        self.metrics.close();
        let envs = self.index.clear();
        for env in envs {
            env.close().await;
        }
        self.providers.close_all();

        tracing::info!("relay core closed");
    }
}

#[cfg(test)]
#[path = "relay_core_test.rs"]
mod tests;
