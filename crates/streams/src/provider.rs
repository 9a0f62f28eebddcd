//! Stream providers and per-environment fan-out state

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::mpsc;

use flagrelay_store::{DataStore, Update};

use crate::StreamError;
use crate::event::StreamEvent;
use crate::kind::StreamKind;
use crate::subscriber::{SendOutcome, Subscriber, Subscription};

/// Default per-subscriber buffer, in events
const DEFAULT_SUBSCRIBER_BUFFER: usize = 256;

/// Behavior shared by every subscriber of one provider
#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// Disconnect every subscriber after this long, if set
    pub max_connection_time: Option<Duration>,

    /// Cadence of SSE keepalive comments
    pub heartbeat_interval: Duration,

    /// Bounded buffer per subscriber; a subscriber that falls this far
    /// behind is closed as a slow consumer
    pub subscriber_buffer: usize,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            max_connection_time: None,
            heartbeat_interval: Duration::from_secs(180),
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
        }
    }
}

/// One wire dialect's fan-out across all environments
///
/// The relay core owns one provider per dialect; environments register
/// here and get back their `EnvStream` handle.
pub struct StreamProvider {
    kind: StreamKind,
    options: StreamOptions,
    envs: RwLock<Vec<Arc<EnvStream>>>,
    closed: AtomicBool,
}

impl StreamProvider {
    pub fn new(kind: StreamKind, options: StreamOptions) -> Self {
        Self {
            kind,
            options,
            envs: RwLock::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    pub fn options(&self) -> &StreamOptions {
        &self.options
    }

    /// Register one environment; the returned handle pushes updates and
    /// accepts subscribers
    pub fn register_env(&self, store: Arc<dyn DataStore>) -> Result<Arc<EnvStream>, StreamError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StreamError::ProviderClosed);
        }
        let env = Arc::new(EnvStream {
            kind: self.kind,
            store,
            buffer: self.options.subscriber_buffer,
            subscribers: RwLock::new(Vec::new()),
            closed: AtomicBool::new(false),
        });
        self.envs.write().push(Arc::clone(&env));
        Ok(env)
    }

    /// Drop one environment's stream state, disconnecting its
    /// subscribers; unknown handles are ignored
    pub fn remove_env(&self, env: &Arc<EnvStream>) {
        self.envs.write().retain(|e| !Arc::ptr_eq(e, env));
        env.close();
    }

    /// Number of registered environments
    pub fn env_count(&self) -> usize {
        self.envs.read().len()
    }

    /// Close every environment's stream state; idempotent
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let envs: Vec<Arc<EnvStream>> = std::mem::take(&mut *self.envs.write());
        for env in envs {
            env.close();
        }
        tracing::debug!(kind = self.kind.as_str(), "stream provider closed");
    }
}

/// Fan-out state for one (provider, environment) pair
pub struct EnvStream {
    kind: StreamKind,
    store: Arc<dyn DataStore>,
    buffer: usize,
    subscribers: RwLock<Vec<Arc<Subscriber>>>,
    closed: AtomicBool,
}

impl EnvStream {
    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    /// Register a subscriber
    ///
    /// The initial event (snapshot `put` or `ping`) is seeded into the
    /// buffer while the registry lock is held, so no concurrent update
    /// can slip between the snapshot read and registration.
    pub fn subscribe(&self) -> Result<Subscription, StreamError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StreamError::ProviderClosed);
        }

        let (tx, rx) = mpsc::channel(self.buffer);
        let mut subscribers = self.subscribers.write();

        let initial = Arc::new(self.kind.initial_event(&self.store.all()));
        let subscriber = Subscriber::new(tx);
        let id = subscriber.id();
        // buffer is empty, the seed cannot fail
        subscriber.try_send(initial);
        subscribers.push(Arc::new(subscriber));

        tracing::debug!(
            kind = self.kind.as_str(),
            subscriber = id,
            total = subscribers.len(),
            "stream subscriber registered"
        );
        Ok(Subscription { id, rx })
    }

    /// Drop one subscriber (its SSE connection ended)
    pub fn unsubscribe(&self, id: u64) {
        self.subscribers.write().retain(|s| s.id() != id);
    }

    /// Broadcast the event for one accepted store update
    ///
    /// The subscriber set is snapshotted under the read lock and the
    /// sends happen outside it, so a stalled subscriber socket never
    /// blocks registration or its peers.
    pub fn notify(&self, update: &Update) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let Some(event) = self.kind.update_event(update) else {
            return;
        };
        let event = Arc::new(event);

        let targets: Vec<Arc<Subscriber>> = self.subscribers.read().clone();
        let mut stale: Vec<u64> = Vec::new();
        let mut slow: Vec<u64> = Vec::new();

        for subscriber in &targets {
            match subscriber.try_send(Arc::clone(&event)) {
                SendOutcome::Delivered => {}
                SendOutcome::Slow => slow.push(subscriber.id()),
                SendOutcome::Gone => stale.push(subscriber.id()),
            }
        }

        if !slow.is_empty() || !stale.is_empty() {
            let mut subscribers = self.subscribers.write();
            subscribers.retain(|s| !slow.contains(&s.id()) && !stale.contains(&s.id()));
        }
        for id in slow {
            tracing::warn!(
                kind = self.kind.as_str(),
                subscriber = id,
                "closing slow stream subscriber"
            );
        }
    }

    /// Current subscriber count
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Disconnect every subscriber; no event reaches them afterwards
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        // dropping the senders ends each subscriber's stream cleanly
        self.subscribers.write().clear();
    }
}

#[cfg(test)]
#[path = "fanout_test.rs"]
mod tests;
