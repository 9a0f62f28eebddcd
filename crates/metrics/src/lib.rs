//! Flagrelay - Metrics
//!
//! Per-environment connection and request metrics.
//!
//! The manager owns a process-level relay id (random at startup) and one
//! tag scope per environment. Each scope keeps two views of its
//! connection gauges: a public one tagged by environment and platform,
//! and a private one that additionally carries the relay id. Route counts
//! are recorded per (method, route, status).
//!
//! # Design
//!
//! - Lock-free counters: gauges and counts are atomics, updated inline
//! - RAII gauges: `ConnectionGuard` increments on creation and decrements
//!   on drop, so a panicking connection task still releases its slot
//! - Snapshots: readers get consistent copies, never references into the
//!   live counters

mod manager;
mod scope;

pub use manager::{ManagerClosed, MetricsEventSink, MetricsManager};
pub use scope::{ConnectionGuard, EnvScope, EnvScopeSnapshot, Platform, RouteStats};

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Monotonic counter
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    #[inline]
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    #[inline]
    pub fn add(&self, val: u64) {
        self.0.fetch_add(val, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment(&self) {
        self.add(1);
    }

    #[inline]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Up/down gauge
#[derive(Debug, Default)]
pub struct Gauge(AtomicI64);

impl Gauge {
    #[inline]
    pub const fn new() -> Self {
        Self(AtomicI64::new(0))
    }

    #[inline]
    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn decrement(&self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn get(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }
}
