//! Event dispatcher
//!
//! The HTTP-facing side of the event relay. Each environment gets one
//! dispatcher with an endpoint per SDK dialect; each endpoint decides
//! between the verbatim and the summarizing path based on the schema
//! header.
//!
//! Handler contract: the body is read in full and the caller gets its
//! 202 *before* any parsing happens. Everything after the 202 runs in a
//! detached task whose failures (including panics) are logged and never
//! surface to the caller.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use axum::body::Body;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::json;

use flagrelay_config::{EnvironmentId, EventsConfig, MobileKey, SdkKey};

use crate::error::EventError;
use crate::publisher::{EventPublisher, PublisherConfig};
use crate::summarizer::summarize;
use crate::{EVENT_SCHEMA_HEADER, EventRecords, SUMMARY_SCHEMA_VERSION};

/// The three inbound event dialects
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EndpointKind {
    Server,
    Mobile,
    JsClient,
}

impl EndpointKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EndpointKind::Server => "server",
            EndpointKind::Mobile => "mobile",
            EndpointKind::JsClient => "js-client",
        }
    }
}

/// Per-environment event relay façade
pub struct EventDispatcher {
    endpoints: HashMap<EndpointKind, Arc<EndpointDispatcher>>,
}

impl EventDispatcher {
    /// Build the dispatcher for one environment; endpoints exist only for
    /// the credentials the environment actually has. All of them share
    /// one outbound HTTP client.
    pub fn new(
        config: &EventsConfig,
        sdk_key: &SdkKey,
        mobile_key: Option<&MobileKey>,
        env_id: Option<&EnvironmentId>,
    ) -> Result<Self, EventError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| EventError::ClientBuild(e.to_string()))?;

        let mut endpoints = HashMap::new();
        endpoints.insert(
            EndpointKind::Server,
            Arc::new(EndpointDispatcher::new(
                config.clone(),
                http.clone(),
                Some(sdk_key.expose().to_string()),
                "/bulk".to_string(),
            )),
        );
        if let Some(key) = mobile_key {
            endpoints.insert(
                EndpointKind::Mobile,
                Arc::new(EndpointDispatcher::new(
                    config.clone(),
                    http.clone(),
                    Some(key.expose().to_string()),
                    "/mobile".to_string(),
                )),
            );
        }
        if let Some(id) = env_id {
            endpoints.insert(
                EndpointKind::JsClient,
                Arc::new(EndpointDispatcher::new(
                    config.clone(),
                    http,
                    None,
                    format!("/events/bulk/{id}"),
                )),
            );
        }
        Ok(Self { endpoints })
    }

    /// The endpoint for one dialect, if this environment supports it
    pub fn endpoint(&self, kind: EndpointKind) -> Option<Arc<EndpointDispatcher>> {
        self.endpoints.get(&kind).cloned()
    }

    /// Close every publisher, draining queued events
    pub async fn close(&self) {
        for endpoint in self.endpoints.values() {
            endpoint.close().await;
        }
    }
}

/// Dispatcher for one (environment, dialect) pair
///
/// The verbatim and summarizing relays are constructed lazily under a
/// mutex the first time a batch needs them.
pub struct EndpointDispatcher {
    config: EventsConfig,
    http: reqwest::Client,
    auth_key: Option<String>,
    remote_path: String,
    verbatim: Mutex<Option<Arc<EventPublisher>>>,
    summarizing: Mutex<Option<Arc<EventPublisher>>>,
}

impl EndpointDispatcher {
    fn new(
        config: EventsConfig,
        http: reqwest::Client,
        auth_key: Option<String>,
        remote_path: String,
    ) -> Self {
        Self {
            config,
            http,
            auth_key,
            remote_path,
            verbatim: Mutex::new(None),
            summarizing: Mutex::new(None),
        }
    }

    /// Accept one inbound batch
    ///
    /// Responds 400 on an empty or unreadable body, otherwise 202; the
    /// batch is processed after the response is decided.
    pub async fn accept(self: Arc<Self>, headers: &HeaderMap, body: Body) -> Response {
        let bytes = match axum::body::to_bytes(body, usize::MAX).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(error = %e, path = %self.remote_path, "error reading event post body");
                return error_response(StatusCode::BAD_REQUEST, "unable to read request body");
            }
        };
        if bytes.is_empty() {
            return error_response(StatusCode::BAD_REQUEST, "body may not be empty");
        }

        let payload_version = headers
            .get(EVENT_SCHEMA_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<i64>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(1);

        // the caller is done; parsing and forwarding happen detached, and
        // a panicking worker must not take the process down
        let this = Arc::clone(&self);
        let worker = tokio::spawn(async move { this.process(bytes, payload_version) });
        let path = self.remote_path.clone();
        tokio::spawn(async move {
            if let Err(e) = worker.await
                && e.is_panic()
            {
                tracing::error!(path = %path, "unexpected panic in event relay worker");
            }
        });

        StatusCode::ACCEPTED.into_response()
    }

    fn process(&self, body: Bytes, payload_version: i64) {
        let records: EventRecords = match serde_json::from_slice(&body) {
            Ok(records) => records,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    path = %self.remote_path,
                    "error parsing event post body"
                );
                return;
            }
        };

        tracing::debug!(
            count = records.len(),
            payload_version,
            path = %self.remote_path,
            "received events to be proxied"
        );

        if !self.config.send_events {
            return;
        }

        if payload_version >= SUMMARY_SCHEMA_VERSION {
            self.verbatim_publisher().publish_raw(records);
        } else {
            let summarized = summarize(&records, payload_version);
            self.summarizing_publisher().publish_raw(summarized);
        }
    }

    fn verbatim_publisher(&self) -> Arc<EventPublisher> {
        let mut slot = self.verbatim.lock();
        if let Some(publisher) = &*slot {
            return Arc::clone(publisher);
        }
        let publisher = Arc::new(EventPublisher::with_client(
            self.publisher_config(),
            self.http.clone(),
        ));
        *slot = Some(Arc::clone(&publisher));
        publisher
    }

    fn summarizing_publisher(&self) -> Arc<EventPublisher> {
        let mut slot = self.summarizing.lock();
        if let Some(publisher) = &*slot {
            return Arc::clone(publisher);
        }
        let publisher = Arc::new(EventPublisher::with_client(
            self.publisher_config(),
            self.http.clone(),
        ));
        *slot = Some(Arc::clone(&publisher));
        publisher
    }

    fn publisher_config(&self) -> PublisherConfig {
        PublisherConfig {
            endpoint_uri: format!(
                "{}{}",
                self.config.events_uri.trim_end_matches('/'),
                self.remote_path
            ),
            auth_key: self.auth_key.clone(),
            capacity: self.config.capacity,
            flush_interval: self.config.effective_flush_interval(),
            sampling_interval: self.config.sampling_interval,
        }
    }

    /// Flush whichever publishers exist right now
    pub async fn flush(&self) {
        let publishers: Vec<Arc<EventPublisher>> = {
            let verbatim = self.verbatim.lock().clone();
            let summarizing = self.summarizing.lock().clone();
            [verbatim, summarizing].into_iter().flatten().collect()
        };
        for publisher in publishers {
            publisher.flush().await;
        }
    }

    /// Close whichever publishers exist, draining their queues
    pub async fn close(&self) {
        let publishers: Vec<Arc<EventPublisher>> = {
            let verbatim = self.verbatim.lock().take();
            let summarizing = self.summarizing.lock().take();
            [verbatim, summarizing].into_iter().flatten().collect()
        };
        for publisher in publishers {
            publisher.close().await;
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({"message": message}))).into_response()
}

#[cfg(test)]
#[path = "dispatcher_test.rs"]
mod tests;
