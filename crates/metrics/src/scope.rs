//! Per-environment tag scope

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use crate::{Counter, Gauge};

/// Platform category of a connection or request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Platform {
    Server,
    Mobile,
    Browser,
}

impl Platform {
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Server => "server",
            Platform::Mobile => "mobile",
            Platform::Browser => "browser",
        }
    }

    const ALL: [Platform; 3] = [Platform::Server, Platform::Mobile, Platform::Browser];

    fn index(self) -> usize {
        match self {
            Platform::Server => 0,
            Platform::Mobile => 1,
            Platform::Browser => 2,
        }
    }
}

#[derive(Debug, Default)]
struct PlatformConns {
    /// Current connections, env + platform tags
    public_current: Gauge,
    /// Current connections, additionally tagged with the relay id
    private_current: Gauge,
    /// Total connections ever opened
    new_conns: Counter,
}

#[derive(Debug)]
pub(crate) struct ScopeInner {
    env_name: String,
    relay_id: String,
    conns: [PlatformConns; 3],
    routes: RwLock<HashMap<RouteKey, RouteCounters>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct RouteKey {
    method: String,
    route: String,
    status: u16,
}

#[derive(Debug, Default)]
struct RouteCounters {
    count: u64,
    total: Duration,
}

/// Metrics tag scope for one environment
///
/// Cheap to clone; all clones share the same counters. Dropping every
/// clone does not reset anything - removal is explicit via the manager.
#[derive(Clone, Debug)]
pub struct EnvScope {
    pub(crate) inner: Arc<ScopeInner>,
}

impl EnvScope {
    pub(crate) fn new(env_name: String, relay_id: String) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                env_name,
                relay_id,
                conns: Default::default(),
                routes: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn env_name(&self) -> &str {
        &self.inner.env_name
    }

    pub fn relay_id(&self) -> &str {
        &self.inner.relay_id
    }

    /// Open a connection gauge for the given platform
    ///
    /// Both tag variants are incremented now and decremented when the
    /// guard is dropped, however the holding task ends.
    pub fn connection_guard(&self, platform: Platform) -> ConnectionGuard {
        let conns = &self.inner.conns[platform.index()];
        conns.public_current.increment();
        conns.private_current.increment();
        conns.new_conns.increment();
        ConnectionGuard {
            scope: Arc::clone(&self.inner),
            platform,
        }
    }

    /// Record one routed request
    pub fn record_route(&self, method: &str, route: &str, status: u16, elapsed: Duration) {
        let key = RouteKey {
            method: method.to_string(),
            route: route.to_string(),
            status,
        };
        let mut routes = self.inner.routes.write();
        let entry = routes.entry(key).or_default();
        entry.count += 1;
        entry.total += elapsed;
    }

    /// Current connection count for one platform (public tag variant)
    pub fn current_connections(&self, platform: Platform) -> i64 {
        self.inner.conns[platform.index()].public_current.get()
    }

    /// Consistent copy of all counters in this scope
    pub fn snapshot(&self) -> EnvScopeSnapshot {
        let routes = self
            .inner
            .routes
            .read()
            .iter()
            .map(|(k, v)| RouteStats {
                method: k.method.clone(),
                route: k.route.clone(),
                status: k.status,
                count: v.count,
                total: v.total,
            })
            .collect();

        EnvScopeSnapshot {
            env_name: self.inner.env_name.clone(),
            relay_id: self.inner.relay_id.clone(),
            current_connections: Platform::ALL
                .map(|p| self.inner.conns[p.index()].public_current.get()),
            new_connections: Platform::ALL.map(|p| self.inner.conns[p.index()].new_conns.get()),
            routes,
        }
    }

    pub(crate) fn ptr_eq(&self, other: &EnvScope) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// RAII handle for one live connection; see `EnvScope::connection_guard`
#[derive(Debug)]
pub struct ConnectionGuard {
    scope: Arc<ScopeInner>,
    platform: Platform,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let conns = &self.scope.conns[self.platform.index()];
        conns.public_current.decrement();
        conns.private_current.decrement();
    }
}

/// Point-in-time copy of one scope's counters
#[derive(Clone, Debug)]
pub struct EnvScopeSnapshot {
    pub env_name: String,
    pub relay_id: String,
    /// Indexed server / mobile / browser
    pub current_connections: [i64; 3],
    pub new_connections: [u64; 3],
    pub routes: Vec<RouteStats>,
}

/// Aggregated counters for one (method, route, status)
#[derive(Clone, Debug)]
pub struct RouteStats {
    pub method: String,
    pub route: String,
    pub status: u16,
    pub count: u64,
    pub total: Duration,
}
