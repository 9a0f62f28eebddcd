//! Polling flag client
//!
//! Fetches the full flag snapshot from `{base_uri}/sdk/latest-all` on an
//! interval and turns it into store updates: the first successful fetch
//! becomes an `init`, later fetches are diffed against the previous
//! snapshot and delivered as per-item upserts (deletions as tombstones).
//! Transient upstream failures are retried with exponential backoff; a
//! 401/403 is terminal.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use flagrelay_config::SdkKey;

use crate::client::{ClientConfig, FlagClient};
use crate::error::StoreError;
use crate::item::{AllData, FlagDesc, SegmentDesc, Update};
use crate::store::UpdateSink;

/// Backoff ceiling between failed polls
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Default flag client; see module docs
pub struct PollingFlagClient {
    ready_rx: watch::Receiver<Option<Result<(), String>>>,
    initialized: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl PollingFlagClient {
    /// Build the client and start its poll task
    pub fn start(
        sdk_key: SdkKey,
        config: ClientConfig,
        sink: Arc<dyn UpdateSink>,
    ) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| StoreError::ClientBuild(e.to_string()))?;

        let (ready_tx, ready_rx) = watch::channel(None);
        let initialized = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();

        let task = PollTask {
            url: format!("{}/sdk/latest-all", config.base_uri.trim_end_matches('/')),
            sdk_key,
            poll_interval: config.poll_interval,
            http,
            sink,
            ready_tx,
            initialized: Arc::clone(&initialized),
            cancel: cancel.clone(),
        };
        tokio::spawn(task.run());

        Ok(Self {
            ready_rx,
            initialized,
            cancel,
        })
    }
}

#[async_trait]
impl FlagClient for PollingFlagClient {
    async fn wait_ready(&self) -> Result<(), StoreError> {
        let mut rx = self.ready_rx.clone();
        loop {
            if let Some(result) = rx.borrow_and_update().clone() {
                return result.map_err(StoreError::InitFailed);
            }
            if rx.changed().await.is_err() {
                return Err(StoreError::Closed);
            }
        }
    }

    fn initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    fn close(&self) {
        self.cancel.cancel();
    }
}

struct PollTask {
    url: String,
    sdk_key: SdkKey,
    poll_interval: Duration,
    http: reqwest::Client,
    sink: Arc<dyn UpdateSink>,
    ready_tx: watch::Sender<Option<Result<(), String>>>,
    initialized: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl PollTask {
    async fn run(self) {
        let mut previous: Option<AllData> = None;
        let mut backoff = Duration::from_secs(1);

        loop {
            let delay = match self.poll_once(&mut previous).await {
                Ok(()) => {
                    backoff = Duration::from_secs(1);
                    self.poll_interval
                }
                Err(StoreError::Unauthorized { status }) => {
                    tracing::error!(sdk_key = %self.sdk_key, status, "upstream rejected credentials");
                    let _ = self
                        .ready_tx
                        .send(Some(Err(format!("upstream returned status {status}"))));
                    return;
                }
                Err(e) => {
                    tracing::warn!(
                        sdk_key = %self.sdk_key,
                        error = %e,
                        retry_in_secs = backoff.as_secs(),
                        "poll failed, will retry"
                    );
                    let delay = backoff;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                    delay
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.cancel.cancelled() => {
                    tracing::debug!(sdk_key = %self.sdk_key, "flag client stopped");
                    return;
                }
            }
        }
    }

    async fn poll_once(&self, previous: &mut Option<AllData>) -> Result<(), StoreError> {
        let response = self
            .http
            .get(&self.url)
            .header("Authorization", self.sdk_key.expose())
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(StoreError::Unauthorized {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(StoreError::InitFailed(format!(
                "upstream returned status {status}"
            )));
        }

        let data: AllData = serde_json::from_slice(&response.bytes().await?)?;

        match previous.take() {
            None => {
                self.sink.init(data.clone());
                self.initialized.store(true, Ordering::Release);
                let _ = self.ready_tx.send(Some(Ok(())));
                tracing::info!(
                    flags = data.flags.len(),
                    segments = data.segments.len(),
                    "received initial flag snapshot"
                );
            }
            Some(old) => {
                for update in diff(&old, &data) {
                    self.sink.upsert(update);
                }
            }
        }
        *previous = Some(data);
        Ok(())
    }
}

/// Per-item changes between two snapshots, deletions as tombstones
fn diff(old: &AllData, new: &AllData) -> Vec<Update> {
    let mut updates = Vec::new();

    for (key, flag) in &new.flags {
        if old.flags.get(key).is_none_or(|o| o.version < flag.version) {
            updates.push(Update::Flag(flag.clone()));
        }
    }
    for (key, old_flag) in &old.flags {
        if !new.flags.contains_key(key) {
            updates.push(Update::Flag(FlagDesc::tombstone(
                key.clone(),
                old_flag.version + 1,
            )));
        }
    }

    for (key, segment) in &new.segments {
        if old
            .segments
            .get(key)
            .is_none_or(|o| o.version < segment.version)
        {
            updates.push(Update::Segment(segment.clone()));
        }
    }
    for (key, old_segment) in &old.segments {
        if !new.segments.contains_key(key) {
            updates.push(Update::Segment(SegmentDesc::tombstone(
                key.clone(),
                old_segment.version + 1,
            )));
        }
    }

    updates
}

#[cfg(test)]
#[path = "polling_test.rs"]
mod tests;
