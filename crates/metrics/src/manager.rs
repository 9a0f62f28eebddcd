//! Metrics manager

use std::sync::Arc;

use parking_lot::Mutex;
use rand::Rng;
use thiserror::Error;

use crate::scope::{EnvScope, EnvScopeSnapshot};

/// Returned by `add_environment` after the manager has been closed
#[derive(Debug, Error)]
#[error("metrics manager is closed")]
pub struct ManagerClosed;

/// Optional receiver for periodic metrics snapshots
pub trait MetricsEventSink: Send + Sync {
    fn record(&self, snapshot: &EnvScopeSnapshot);
}

struct Registered {
    scope: EnvScope,
    event_sink: Option<Arc<dyn MetricsEventSink>>,
}

/// Owns the process relay id and every environment's tag scope
pub struct MetricsManager {
    relay_id: String,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    environments: Vec<Registered>,
    closed: bool,
}

impl MetricsManager {
    /// Create a manager with a fresh random relay id
    pub fn new() -> Self {
        let mut rng = rand::rng();
        let relay_id: String = (0..16)
            .map(|_| format!("{:x}", rng.random_range(0..16u8)))
            .collect();
        Self {
            relay_id,
            state: Mutex::new(State::default()),
        }
    }

    pub fn relay_id(&self) -> &str {
        &self.relay_id
    }

    /// Create the tag scope for one environment
    pub fn add_environment(
        &self,
        env_name: &str,
        event_sink: Option<Arc<dyn MetricsEventSink>>,
    ) -> Result<EnvScope, ManagerClosed> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(ManagerClosed);
        }
        let scope = EnvScope::new(env_name.to_string(), self.relay_id.clone());
        state.environments.push(Registered {
            scope: scope.clone(),
            event_sink,
        });
        tracing::debug!(env = env_name, "metrics scope created");
        Ok(scope)
    }

    /// Drop one environment's scope; unknown scopes are ignored
    pub fn remove_environment(&self, scope: &EnvScope) {
        let mut state = self.state.lock();
        state.environments.retain(|r| !r.scope.ptr_eq(scope));
    }

    /// Number of registered environment scopes
    pub fn environment_count(&self) -> usize {
        self.state.lock().environments.len()
    }

    /// Push a snapshot of every scope to its event sink, if any
    pub fn flush_events(&self) {
        let state = self.state.lock();
        for registered in &state.environments {
            if let Some(sink) = &registered.event_sink {
                sink.record(&registered.scope.snapshot());
            }
        }
    }

    /// Close the manager; idempotent. Scopes handed out earlier keep
    /// working as plain counters, but no new environment can be added.
    pub fn close(&self) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        state.environments.clear();
        tracing::debug!(relay_id = %self.relay_id, "metrics manager closed");
    }
}

impl Default for MetricsManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "manager_test.rs"]
mod tests;
