//! Inbound HTTP surface
//!
//! Stream endpoints (SSE), event intake endpoints, and the status page.
//! Server and mobile endpoints authenticate with the `Authorization`
//! header; JS endpoints carry the public environment id in the path.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;

use flagrelay_config::{Credential, EnvironmentId, MobileKey, SdkKey};
use flagrelay_events::EndpointKind;
use flagrelay_metrics::{ConnectionGuard, Platform};
use flagrelay_streams::{EnvStream, StreamKind, Subscription};

use crate::envcontext::{EnvContext, InitState};
use crate::relay_core::RelayCore;

/// Build the full inbound router
pub fn build_router(core: Arc<RelayCore>) -> Router {
    Router::new()
        .route("/all", get(stream_server_all))
        .route("/flags", get(stream_server_flags))
        .route("/mping", get(stream_mobile_ping))
        .route("/ping/{env_id}", get(stream_js_ping))
        .route("/bulk", post(events_server))
        .route("/mobile", post(events_mobile))
        .route("/events/bulk/{env_id}", post(events_js))
        .route("/status", get(status))
        .with_state(core)
}

fn authorization(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn unauthorized() -> Response {
    StatusCode::UNAUTHORIZED.into_response()
}

/// Resolve a credential; failed or closed environments reject
fn resolve_env(core: &RelayCore, credential: &Credential) -> Option<Arc<EnvContext>> {
    core.environment(credential)
        .filter(|env| env.accepts_requests())
}

// ============================================================================
// Stream endpoints
// ============================================================================

/// The live pieces of one SSE connection; dropping it (client
/// disconnect, deadline, or stream closure) deregisters the subscriber
/// and releases the connection gauge
struct StreamConnection {
    subscription: Subscription,
    stream_env: Arc<EnvStream>,
    _guard: ConnectionGuard,
    deadline: Option<tokio::time::Instant>,
    draining: bool,
}

impl Drop for StreamConnection {
    fn drop(&mut self) {
        self.stream_env.unsubscribe(self.subscription.id());
    }
}

fn serve_stream(
    core: &RelayCore,
    env: Arc<EnvContext>,
    kind: StreamKind,
    platform: Platform,
) -> Response {
    let stream_env = Arc::clone(env.stream(kind));
    let subscription = match stream_env.subscribe() {
        Ok(subscription) => subscription,
        Err(_) => return unauthorized(),
    };
    let options = core.provider(kind).options().clone();

    tracing::debug!(
        env = %env.name(),
        kind = kind.as_str(),
        subscriber = subscription.id(),
        "stream connection opened"
    );

    let connection = StreamConnection {
        subscription,
        stream_env,
        _guard: env.scope().connection_guard(platform),
        deadline: options
            .max_connection_time
            .map(|d| tokio::time::Instant::now() + d),
        draining: false,
    };

    let stream = futures::stream::unfold(connection, |mut conn| async move {
        let event = loop {
            if conn.draining {
                break conn.subscription.try_recv();
            }
            match conn.deadline {
                // a configured max connection time ends the stream in an
                // orderly way: flush what is buffered, then end, forcing
                // the SDK to reconnect
                Some(deadline) => tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => conn.draining = true,
                    event = conn.subscription.recv() => break event,
                },
                None => break conn.subscription.recv().await,
            }
        };
        event.map(|event| {
            let sse = Event::default().event(event.name()).data(event.data());
            (Ok::<Event, Infallible>(sse), conn)
        })
    });

    Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(options.heartbeat_interval)
                .text(""),
        )
        .into_response()
}

async fn stream_server_all(
    State(core): State<Arc<RelayCore>>,
    headers: HeaderMap,
) -> Response {
    let Some(key) = authorization(&headers) else {
        return unauthorized();
    };
    let Some(env) = resolve_env(&core, &Credential::SdkKey(SdkKey::new(key))) else {
        return unauthorized();
    };
    serve_stream(&core, env, StreamKind::ServerSideAll, Platform::Server)
}

async fn stream_server_flags(
    State(core): State<Arc<RelayCore>>,
    headers: HeaderMap,
) -> Response {
    let Some(key) = authorization(&headers) else {
        return unauthorized();
    };
    let Some(env) = resolve_env(&core, &Credential::SdkKey(SdkKey::new(key))) else {
        return unauthorized();
    };
    serve_stream(&core, env, StreamKind::ServerSideFlagsOnly, Platform::Server)
}

async fn stream_mobile_ping(
    State(core): State<Arc<RelayCore>>,
    headers: HeaderMap,
) -> Response {
    let Some(key) = authorization(&headers) else {
        return unauthorized();
    };
    let Some(env) = resolve_env(&core, &Credential::MobileKey(MobileKey::new(key))) else {
        return unauthorized();
    };
    serve_stream(&core, env, StreamKind::MobilePing, Platform::Mobile)
}

async fn stream_js_ping(
    State(core): State<Arc<RelayCore>>,
    Path(env_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let credential = Credential::EnvironmentId(EnvironmentId::new(env_id));
    let Some(env) = resolve_env(&core, &credential) else {
        return unauthorized();
    };
    let response = serve_stream(&core, Arc::clone(&env), StreamKind::JsClientPing, Platform::Browser);
    with_cors(response, &env, &headers)
}

/// Browser responses carry the allowed origin; with no configured list
/// any origin is allowed, otherwise an unlisted origin gets the first
/// configured one (and an opaque failure in the browser)
fn with_cors(mut response: Response, env: &EnvContext, headers: &HeaderMap) -> Response {
    let origin = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok());
    let allowed = &env.config().allowed_origins;

    let value = if allowed.is_empty() {
        origin.unwrap_or("*").to_string()
    } else if let Some(origin) = origin
        && allowed.iter().any(|a| a == origin)
    {
        origin.to_string()
    } else {
        allowed[0].clone()
    };

    if let Ok(value) = HeaderValue::from_str(&value) {
        response
            .headers_mut()
            .insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
    }
    response
}

// ============================================================================
// Event endpoints
// ============================================================================

async fn relay_events(
    env: Arc<EnvContext>,
    kind: EndpointKind,
    route: &'static str,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let started = Instant::now();
    let Some(endpoint) = env.dispatcher().endpoint(kind) else {
        return unauthorized();
    };
    let response = endpoint.accept(&headers, body).await;
    env.scope()
        .record_route("POST", route, response.status().as_u16(), started.elapsed());
    response
}

async fn events_server(
    State(core): State<Arc<RelayCore>>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let Some(key) = authorization(&headers) else {
        return unauthorized();
    };
    let Some(env) = resolve_env(&core, &Credential::SdkKey(SdkKey::new(key))) else {
        return unauthorized();
    };
    relay_events(env, EndpointKind::Server, "/bulk", headers, body).await
}

async fn events_mobile(
    State(core): State<Arc<RelayCore>>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let Some(key) = authorization(&headers) else {
        return unauthorized();
    };
    let Some(env) = resolve_env(&core, &Credential::MobileKey(MobileKey::new(key))) else {
        return unauthorized();
    };
    relay_events(env, EndpointKind::Mobile, "/mobile", headers, body).await
}

async fn events_js(
    State(core): State<Arc<RelayCore>>,
    Path(env_id): Path<String>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let credential = Credential::EnvironmentId(EnvironmentId::new(env_id));
    let Some(env) = resolve_env(&core, &credential) else {
        return unauthorized();
    };
    let response = relay_events(
        Arc::clone(&env),
        EndpointKind::JsClient,
        "/events/bulk",
        headers.clone(),
        body,
    )
    .await;
    with_cors(response, &env, &headers)
}

// ============================================================================
// Status
// ============================================================================

async fn status(State(core): State<Arc<RelayCore>>) -> Response {
    let envs = core.environments();
    let mut environments = serde_json::Map::new();
    let mut degraded = false;

    for env in &envs {
        let state = match env.init_state() {
            InitState::Ready => "connected",
            InitState::Initializing => "connecting",
            InitState::Failed => {
                degraded = true;
                "failed"
            }
        };
        // credentials render masked; full keys never leave the process
        let mut entry = json!({
            "sdkKey": env.config().sdk_key.to_string(),
            "status": state,
            "connections": env.subscriber_count(),
        });
        if let Some(key) = &env.config().mobile_key {
            entry["mobileKey"] = json!(key.to_string());
        }
        if let Some(id) = &env.config().env_id {
            entry["envId"] = json!(id.to_string());
        }
        environments.insert(env.name().to_string(), entry);
    }

    Json(json!({
        "relayId": core.metrics().relay_id(),
        "status": if degraded { "degraded" } else { "healthy" },
        "environments": environments,
    }))
    .into_response()
}
