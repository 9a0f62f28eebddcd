//! Environment context
//!
//! Runtime state for one configured environment: its data store, its
//! upstream flag client, its registration with the four stream
//! providers, its event dispatcher, and its metrics scope.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use tokio::sync::mpsc;

use flagrelay_config::{EnvConfig, EventsConfig, MainConfig};
use flagrelay_events::EventDispatcher;
use flagrelay_metrics::{EnvScope, MetricsManager};
use flagrelay_store::{
    AllData, ClientConfig, ClientFactory, DataStore, DataStoreFactory, FlagClient, Update,
    UpdateSink,
};
use flagrelay_streams::{EnvStream, StreamKind, StreamOptions, StreamProvider};

use crate::cleanup::CleanupStack;
use crate::error::RelayError;

/// The four providers the relay core owns, one per wire dialect
pub(crate) struct StreamProviders {
    pub server_all: StreamProvider,
    pub server_flags: StreamProvider,
    pub mobile_ping: StreamProvider,
    pub js_client_ping: StreamProvider,
}

impl StreamProviders {
    pub fn new(options: StreamOptions) -> Self {
        Self {
            server_all: StreamProvider::new(StreamKind::ServerSideAll, options.clone()),
            server_flags: StreamProvider::new(StreamKind::ServerSideFlagsOnly, options.clone()),
            mobile_ping: StreamProvider::new(StreamKind::MobilePing, options.clone()),
            js_client_ping: StreamProvider::new(StreamKind::JsClientPing, options),
        }
    }

    pub fn get(&self, kind: StreamKind) -> &StreamProvider {
        match kind {
            StreamKind::ServerSideAll => &self.server_all,
            StreamKind::ServerSideFlagsOnly => &self.server_flags,
            StreamKind::MobilePing => &self.mobile_ping,
            StreamKind::JsClientPing => &self.js_client_ping,
        }
    }

    pub fn close_all(&self) {
        self.server_all.close();
        self.server_flags.close();
        self.mobile_ping.close();
        self.js_client_ping.close();
    }
}

/// One environment's per-provider stream handles
#[derive(Clone)]
struct EnvStreamSet {
    server_all: Arc<EnvStream>,
    server_flags: Arc<EnvStream>,
    mobile_ping: Arc<EnvStream>,
    js_client_ping: Arc<EnvStream>,
}

impl EnvStreamSet {
    fn get(&self, kind: StreamKind) -> &Arc<EnvStream> {
        match kind {
            StreamKind::ServerSideAll => &self.server_all,
            StreamKind::ServerSideFlagsOnly => &self.server_flags,
            StreamKind::MobilePing => &self.mobile_ping,
            StreamKind::JsClientPing => &self.js_client_ping,
        }
    }

    fn all(&self) -> [&Arc<EnvStream>; 4] {
        [
            &self.server_all,
            &self.server_flags,
            &self.mobile_ping,
            &self.js_client_ping,
        ]
    }
}

/// Applies upstream data to the store and fans accepted changes out to
/// every dialect. All calls arrive from the environment's single client
/// task, which is what serializes the update order subscribers observe.
struct EnvUpdateSink {
    store: Arc<dyn DataStore>,
    streams: EnvStreamSet,
}

impl UpdateSink for EnvUpdateSink {
    fn init(&self, data: AllData) {
        self.store.init(data);
    }

    fn upsert(&self, update: Update) -> bool {
        if !self.store.upsert(update.clone()) {
            return false;
        }
        for stream in self.streams.all() {
            stream.notify(&update);
        }
        true
    }
}

/// Initialization state of an environment's upstream connection
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InitState {
    Initializing,
    Ready,
    Failed,
}

#[derive(Debug)]
struct InitStatus {
    state: InitState,
    error: Option<String>,
}

/// Runtime instance of one configured environment
pub struct EnvContext {
    name: String,
    config: EnvConfig,
    store: Arc<dyn DataStore>,
    client: Arc<dyn FlagClient>,
    dispatcher: EventDispatcher,
    streams: EnvStreamSet,
    providers: Arc<StreamProviders>,
    metrics: Arc<MetricsManager>,
    scope: EnvScope,
    init: RwLock<InitStatus>,
    closed: AtomicBool,
}

impl EnvContext {
    /// Construct the environment and start its upstream client
    ///
    /// Resources are acquired in order (store, dispatcher, stream
    /// registrations, metrics scope, client); a failure part-way unwinds
    /// everything acquired so far. Returns the context plus the
    /// single-shot channel that carries it once the client reports ready
    /// or terminally failed.
    pub(crate) fn new(
        name: String,
        config: EnvConfig,
        main: &MainConfig,
        events: &EventsConfig,
        client_factory: &ClientFactory,
        store_factory: &Arc<dyn DataStoreFactory>,
        providers: &Arc<StreamProviders>,
        metrics: &Arc<MetricsManager>,
    ) -> Result<(Arc<EnvContext>, mpsc::Receiver<Arc<EnvContext>>), RelayError> {
        let env_setup = |reason: String| RelayError::EnvSetup {
            env: name.clone(),
            reason,
        };
        let mut cleanup = CleanupStack::new();

        let store = store_factory
            .create(&name)
            .map_err(|e| env_setup(e.to_string()))?;
        {
            let store = Arc::clone(&store);
            cleanup.push(move || store.close());
        }

        // publishers are lazy, so there is nothing to tear down in the
        // dispatcher until the first event arrives
        let mut events_config = events.clone();
        if let Some(uri) = &config.events_uri {
            events_config.events_uri = uri.clone();
        }
        let dispatcher = EventDispatcher::new(
            &events_config,
            &config.sdk_key,
            config.mobile_key.as_ref(),
            config.env_id.as_ref(),
        )
        .map_err(|e| env_setup(e.to_string()))?;

        let mut register = |kind: StreamKind| -> Result<Arc<EnvStream>, RelayError> {
            let handle = providers
                .get(kind)
                .register_env(Arc::clone(&store))
                .map_err(|e| env_setup(e.to_string()))?;
            let providers = Arc::clone(providers);
            let cleanup_handle = Arc::clone(&handle);
            cleanup.push(move || providers.get(kind).remove_env(&cleanup_handle));
            Ok(handle)
        };
        let streams = EnvStreamSet {
            server_all: register(StreamKind::ServerSideAll)?,
            server_flags: register(StreamKind::ServerSideFlagsOnly)?,
            mobile_ping: register(StreamKind::MobilePing)?,
            js_client_ping: register(StreamKind::JsClientPing)?,
        };

        let scope = metrics
            .add_environment(&name, None)
            .map_err(|e| env_setup(e.to_string()))?;
        {
            let metrics = Arc::clone(metrics);
            let scope = scope.clone();
            cleanup.push(move || metrics.remove_environment(&scope));
        }

        let sink = Arc::new(EnvUpdateSink {
            store: Arc::clone(&store),
            streams: streams.clone(),
        });
        let client_config = ClientConfig {
            base_uri: config
                .base_uri
                .clone()
                .unwrap_or_else(|| main.base_uri.clone()),
            ..ClientConfig::default()
        };
        let client = (client_factory)(config.sdk_key.clone(), client_config, sink)
            .map_err(|e| env_setup(e.to_string()))?;

        let (result_tx, result_rx) = mpsc::channel(1);
        let ctx = Arc::new(EnvContext {
            name,
            config,
            store,
            client,
            dispatcher,
            streams,
            providers: Arc::clone(providers),
            metrics: Arc::clone(metrics),
            scope,
            init: RwLock::new(InitStatus {
                state: InitState::Initializing,
                error: None,
            }),
            closed: AtomicBool::new(false),
        });
        spawn_init_watcher(Arc::clone(&ctx), result_tx);

        cleanup.clear();
        Ok((ctx, result_rx))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn DataStore> {
        &self.store
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    pub fn scope(&self) -> &EnvScope {
        &self.scope
    }

    /// This environment's stream state for one dialect
    pub fn stream(&self, kind: StreamKind) -> &Arc<EnvStream> {
        self.streams.get(kind)
    }

    pub fn init_state(&self) -> InitState {
        self.init.read().state
    }

    /// The terminal failure reported by the flag client, if any
    pub fn init_error(&self) -> Option<String> {
        self.init.read().error.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Whether inbound requests for this environment should be served.
    /// Failed environments reject everything; initializing ones serve
    /// from whatever state the store has.
    pub fn accepts_requests(&self) -> bool {
        !self.is_closed() && self.init_state() != InitState::Failed
    }

    /// Subscribers across all four dialects
    pub fn subscriber_count(&self) -> usize {
        self.streams.all().iter().map(|s| s.subscriber_count()).sum()
    }

    /// Tear the environment down; idempotent
    ///
    /// Stops the flag client, disconnects every stream subscriber of
    /// this environment, drains the event publishers, closes the store,
    /// and releases the metrics scope.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.client.close();
        self.providers.server_all.remove_env(&self.streams.server_all);
        self.providers
            .server_flags
            .remove_env(&self.streams.server_flags);
        self.providers
            .mobile_ping
            .remove_env(&self.streams.mobile_ping);
        self.providers
            .js_client_ping
            .remove_env(&self.streams.js_client_ping);
        self.dispatcher.close().await;
        self.store.close();
        self.metrics.remove_environment(&self.scope);

        tracing::info!(env = %self.name, "environment closed");
    }
}

fn spawn_init_watcher(ctx: Arc<EnvContext>, result_tx: mpsc::Sender<Arc<EnvContext>>) {
    tokio::spawn(async move {
        match ctx.client.wait_ready().await {
            Ok(()) => {
                let mut init = ctx.init.write();
                init.state = InitState::Ready;
                drop(init);
                tracing::info!(env = %ctx.name, "environment initialized");
            }
            Err(e) => {
                let mut init = ctx.init.write();
                init.state = InitState::Failed;
                init.error = Some(e.to_string());
                drop(init);
                tracing::error!(env = %ctx.name, error = %e, "environment failed to initialize");
            }
        }
        let _ = result_tx.send(ctx).await;
    });
}
