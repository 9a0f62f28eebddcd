//! Event publisher
//!
//! One publisher per (environment, endpoint dialect). Producers enqueue
//! raw event records without blocking; a single background flusher drains
//! the queue and posts everything as one JSON array upstream.
//!
//! Failure policy: transient upstream failures (network, 5xx, 408, 429)
//! drop the drained batch with a log line - no retries, the SDKs resend
//! their own events. 401/403 is logged and the publisher keeps running.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::error::EventError;
use crate::{EventRecords, SUMMARY_SCHEMA_VERSION};

/// Bound on the final drain when a publisher is closed
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Process-wide PRNG for batch sampling, seeded from the wall clock once
/// at startup
static SAMPLING_RNG: LazyLock<Mutex<StdRng>> = LazyLock::new(|| {
    let seed = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default();
    Mutex::new(StdRng::seed_from_u64(seed))
});

/// With a sampling interval N > 0, one batch in N passes
fn sampled_out(interval: u32) -> bool {
    interval > 0 && SAMPLING_RNG.lock().random_range(0..interval) != 0
}

/// Publisher settings; derived from `EventsConfig` per endpoint
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Full upstream URI for this endpoint's POSTs
    pub endpoint_uri: String,

    /// Authorization header value; `None` for the JS dialect
    pub auth_key: Option<String>,

    /// Maximum queued batches before the oldest is dropped
    pub capacity: usize,

    /// Time-based flush cadence
    pub flush_interval: Duration,

    /// Forward each batch with probability 1/N when N > 0
    pub sampling_interval: u32,
}

/// Bounded, lossy event queue with a background flusher
pub struct EventPublisher {
    inner: Arc<Inner>,
    cancel: CancellationToken,
    flusher: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

struct Inner {
    config: PublisherConfig,
    http: reqwest::Client,
    queue: Mutex<VecDeque<EventRecords>>,
    /// Batches dropped since the last warning; reset when the warning is
    /// emitted so drops coalesce to one line per flush interval
    dropped: AtomicU64,
    closed: AtomicBool,
    flush_now: Notify,
}

impl EventPublisher {
    /// Create the publisher and start its flusher task
    pub fn new(config: PublisherConfig) -> Result<Self, EventError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| EventError::ClientBuild(e.to_string()))?;
        Ok(Self::with_client(config, http))
    }

    /// Create the publisher around an existing HTTP client; the client is
    /// shared by every publisher of one environment
    pub fn with_client(config: PublisherConfig, http: reqwest::Client) -> Self {
        let inner = Arc::new(Inner {
            config,
            http,
            queue: Mutex::new(VecDeque::new()),
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            flush_now: Notify::new(),
        });

        let cancel = CancellationToken::new();
        let flusher = tokio::spawn(run_flusher(Arc::clone(&inner), cancel.clone()));

        Self {
            inner,
            cancel,
            flusher: Mutex::new(Some(flusher)),
        }
    }

    /// Enqueue one batch of raw records; never blocks
    ///
    /// When the queue is at capacity the oldest batch is dropped and a
    /// coalesced warning is emitted on the next flush.
    pub fn publish_raw(&self, records: EventRecords) {
        if records.is_empty() || self.inner.closed.load(Ordering::Relaxed) {
            return;
        }
        if sampled_out(self.inner.config.sampling_interval) {
            return;
        }

        let full = {
            let mut queue = self.inner.queue.lock();
            if queue.len() >= self.inner.config.capacity {
                queue.pop_front();
                self.inner.dropped.fetch_add(1, Ordering::Relaxed);
            }
            queue.push_back(records);
            queue.len() >= self.inner.config.capacity
        };
        if full {
            self.inner.flush_now.notify_one();
        }
    }

    /// Drain and post everything queued right now
    pub async fn flush(&self) {
        self.inner.flush().await;
    }

    /// Number of queued batches
    pub fn queued_batches(&self) -> usize {
        self.inner.queue.lock().len()
    }

    /// Stop the flusher after a final drain, bounded by the drain
    /// timeout. Further publishes are no-ops. Idempotent.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::Relaxed) {
            return;
        }
        self.cancel.cancel();
        let handle = self.flusher.lock().take();
        if let Some(handle) = handle
            && tokio::time::timeout(DRAIN_TIMEOUT, handle).await.is_err()
        {
            tracing::warn!(
                endpoint = %self.inner.config.endpoint_uri,
                "event publisher did not drain within the close timeout"
            );
        }
    }
}

async fn run_flusher(inner: Arc<Inner>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(inner.config.flush_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = inner.flush_now.notified() => {}
            _ = cancel.cancelled() => break,
        }
        inner.flush().await;
    }

    // final drain on close
    inner.flush().await;
}

impl Inner {
    async fn flush(&self) {
        let batches: Vec<EventRecords> = {
            let mut queue = self.queue.lock();
            queue.drain(..).collect()
        };

        let dropped = self.dropped.swap(0, Ordering::Relaxed);
        if dropped > 0 {
            tracing::warn!(
                endpoint = %self.config.endpoint_uri,
                dropped_batches = dropped,
                "event queue overflowed, oldest batches dropped"
            );
        }

        if batches.is_empty() {
            return;
        }

        let records: Vec<&serde_json::value::RawValue> = batches
            .iter()
            .flat_map(|batch| batch.iter().map(|record| record.as_ref()))
            .collect();
        let record_count = records.len();
        let payload = match serde_json::to_vec(&records) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize event payload");
                return;
            }
        };

        let mut request = self
            .http
            .post(&self.config.endpoint_uri)
            .header("Content-Type", "application/json")
            .header(
                crate::EVENT_SCHEMA_HEADER,
                SUMMARY_SCHEMA_VERSION.to_string(),
            )
            .body(payload);
        if let Some(key) = &self.config.auth_key {
            request = request.header("Authorization", key.clone());
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    tracing::debug!(
                        endpoint = %self.config.endpoint_uri,
                        records = record_count,
                        "posted events upstream"
                    );
                } else if status == reqwest::StatusCode::UNAUTHORIZED
                    || status == reqwest::StatusCode::FORBIDDEN
                {
                    tracing::error!(
                        endpoint = %self.config.endpoint_uri,
                        status = status.as_u16(),
                        "event service rejected credentials, batch dropped"
                    );
                } else {
                    tracing::warn!(
                        endpoint = %self.config.endpoint_uri,
                        status = status.as_u16(),
                        records = record_count,
                        "transient event delivery failure, batch dropped"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(
                    endpoint = %self.config.endpoint_uri,
                    error = %e,
                    records = record_count,
                    "event delivery failed, batch dropped"
                );
            }
        }
    }
}

#[cfg(test)]
#[path = "publisher_test.rs"]
mod tests;
