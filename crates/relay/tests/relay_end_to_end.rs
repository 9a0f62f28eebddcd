//! End-to-end tests over the HTTP surface
//!
//! Drives the full router with an in-process controllable flag client:
//! credential routing, stream subscriptions, event intake, and status.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use futures::StreamExt;
use tokio::sync::watch;
use tower::ServiceExt;

use flagrelay::{RelayCore, build_router};
use flagrelay_config::{Config, EnvConfig, EnvironmentId, MobileKey, SdkKey};
use flagrelay_store::{
    ClientFactory, FlagClient, FlagDesc, MemoryDataStoreFactory, StoreError, Update, UpdateSink,
};

// ============================================================================
// Controllable flag client
// ============================================================================

type ReadySignal = Option<Result<(), String>>;

struct TestFlagClient {
    ready: watch::Receiver<ReadySignal>,
}

#[async_trait::async_trait]
impl FlagClient for TestFlagClient {
    async fn wait_ready(&self) -> Result<(), StoreError> {
        let mut rx = self.ready.clone();
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
        self.ready.borrow().as_ref().is_some_and(|r| r.is_ok())
    }

    fn close(&self) {}
}

struct EnvHandle {
    sink: Arc<dyn UpdateSink>,
    ready: watch::Sender<ReadySignal>,
}

#[derive(Default)]
struct Harness {
    clients: StdMutex<HashMap<String, EnvHandle>>,
}

impl Harness {
    fn factory(self: &Arc<Self>) -> ClientFactory {
        let harness = Arc::clone(self);
        Arc::new(move |sdk_key, _config, sink| {
            let (ready_tx, ready_rx) = watch::channel(None);
            harness.clients.lock().unwrap().insert(
                sdk_key.expose().to_string(),
                EnvHandle {
                    sink,
                    ready: ready_tx,
                },
            );
            Ok(Arc::new(TestFlagClient { ready: ready_rx }) as Arc<dyn FlagClient>)
        })
    }

    fn make_ready(&self, sdk_key: &str) {
        let clients = self.clients.lock().unwrap();
        let _ = clients[sdk_key].ready.send(Some(Ok(())));
    }

    fn push(&self, sdk_key: &str, update: Update) {
        let clients = self.clients.lock().unwrap();
        clients[sdk_key].sink.upsert(update);
    }
}

fn test_app() -> (Router, Arc<RelayCore>, Arc<Harness>) {
    let mut config = Config::default();
    config.environments.insert(
        "production".to_string(),
        EnvConfig {
            sdk_key: SdkKey::new("sdk-A"),
            mobile_key: Some(MobileKey::new("mob-A")),
            env_id: Some(EnvironmentId::new("env-A")),
            ..EnvConfig::default()
        },
    );

    let harness = Arc::new(Harness::default());
    let core = RelayCore::new(
        config,
        harness.factory(),
        Arc::new(MemoryDataStoreFactory),
    )
    .unwrap();
    harness.make_ready("sdk-A");
    (build_router(Arc::clone(&core)), core, harness)
}

fn flag(key: &str, version: u64) -> FlagDesc {
    FlagDesc {
        key: key.into(),
        version,
        client_side: true,
        deleted: false,
        body: Default::default(),
    }
}

async fn body_string(body: Body) -> String {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

// ============================================================================
// Stream endpoints
// ============================================================================

#[tokio::test]
async fn server_stream_sends_initial_put() {
    let (app, core, harness) = test_app();
    harness.push("sdk-A", Update::Flag(flag("f1", 2)));

    let request = Request::builder()
        .method(Method::GET)
        .uri("/all")
        .header(header::AUTHORIZATION, "sdk-A")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/event-stream")
    );

    let mut frames = response.into_body().into_data_stream();
    let first = frames.next().await.unwrap().unwrap();
    let text = String::from_utf8(first.to_vec()).unwrap();
    assert!(text.starts_with("event: put"), "got: {text}");
    assert!(text.contains("\"f1\""));

    core.close().await;
}

#[tokio::test]
async fn stream_receives_patch_after_update() {
    let (app, core, harness) = test_app();

    let request = Request::builder()
        .method(Method::GET)
        .uri("/all")
        .header(header::AUTHORIZATION, "sdk-A")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let mut frames = response.into_body().into_data_stream();

    let put = frames.next().await.unwrap().unwrap();
    assert!(String::from_utf8(put.to_vec()).unwrap().starts_with("event: put"));

    harness.push("sdk-A", Update::Flag(flag("f1", 1)));
    let patch = frames.next().await.unwrap().unwrap();
    let text = String::from_utf8(patch.to_vec()).unwrap();
    assert!(text.starts_with("event: patch"), "got: {text}");
    assert!(text.contains("/flags/f1"));

    core.close().await;
}

#[tokio::test]
async fn stream_rejects_unknown_credential() {
    let (app, core, _harness) = test_app();

    let request = Request::builder()
        .method(Method::GET)
        .uri("/all")
        .header(header::AUTHORIZATION, "sdk-unknown")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    core.close().await;
}

#[tokio::test]
async fn stream_rejects_missing_authorization() {
    let (app, core, _harness) = test_app();

    let request = Request::builder()
        .method(Method::GET)
        .uri("/mping")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    core.close().await;
}

#[tokio::test]
async fn js_ping_stream_uses_env_id_and_sets_cors() {
    let (app, core, _harness) = test_app();

    let request = Request::builder()
        .method(Method::GET)
        .uri("/ping/env-A")
        .header(header::ORIGIN, "https://example.com")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "https://example.com"
    );

    let mut frames = response.into_body().into_data_stream();
    let first = frames.next().await.unwrap().unwrap();
    assert!(
        String::from_utf8(first.to_vec())
            .unwrap()
            .starts_with("event: ping")
    );

    core.close().await;
}

#[tokio::test]
async fn js_ping_stream_unknown_env_is_unauthorized() {
    let (app, core, _harness) = test_app();

    let request = Request::builder()
        .method(Method::GET)
        .uri("/ping/env-unknown")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    core.close().await;
}

#[tokio::test]
async fn mobile_key_does_not_open_server_stream() {
    let (app, core, _harness) = test_app();

    let request = Request::builder()
        .method(Method::GET)
        .uri("/all")
        .header(header::AUTHORIZATION, "mob-A")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    core.close().await;
}

// ============================================================================
// Event endpoints
// ============================================================================

#[tokio::test]
async fn empty_event_body_is_rejected() {
    let (app, core, _harness) = test_app();

    let request = Request::builder()
        .method(Method::POST)
        .uri("/bulk")
        .header(header::AUTHORIZATION, "sdk-A")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_string(response.into_body()).await;
    assert!(body.contains("body may not be empty"));

    core.close().await;
}

#[tokio::test]
async fn event_batch_is_accepted_with_202() {
    let (app, core, _harness) = test_app();

    let request = Request::builder()
        .method(Method::POST)
        .uri("/bulk")
        .header(header::AUTHORIZATION, "sdk-A")
        .header("X-LaunchDarkly-Event-Schema", "4")
        .body(Body::from(r#"[{"kind":"identify","user":{"key":"u1"}}]"#))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    core.close().await;
}

#[tokio::test]
async fn event_batch_with_unknown_key_is_unauthorized() {
    let (app, core, _harness) = test_app();

    let request = Request::builder()
        .method(Method::POST)
        .uri("/bulk")
        .header(header::AUTHORIZATION, "sdk-unknown")
        .body(Body::from("[1]"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    core.close().await;
}

#[tokio::test]
async fn js_event_batch_routes_by_env_id() {
    let (app, core, _harness) = test_app();

    let request = Request::builder()
        .method(Method::POST)
        .uri("/events/bulk/env-A")
        .body(Body::from("[1]"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    core.close().await;
}

// ============================================================================
// Status
// ============================================================================

#[tokio::test]
async fn status_reports_environments_with_masked_keys() {
    let (app, core, harness) = test_app();
    harness.make_ready("sdk-A");
    // give the init watcher a beat to record the state
    tokio::time::sleep(Duration::from_millis(50)).await;

    let request = Request::builder()
        .method(Method::GET)
        .uri("/status")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_string(response.into_body()).await;
    let status: serde_json::Value = serde_json::from_str(&body).unwrap();

    let env = &status["environments"]["production"];
    assert_eq!(env["status"], "connected");
    assert_eq!(env["envId"], "env-A");
    // secrets are masked
    assert_eq!(env["sdkKey"], "****dk-A");
    assert!(!body.contains("\"sdk-A\""));

    core.close().await;
}

#[tokio::test]
async fn requests_for_failed_environment_are_rejected() {
    let mut config = Config::default();
    config.environments.insert(
        "broken".to_string(),
        EnvConfig {
            sdk_key: SdkKey::new("sdk-broken"),
            ..EnvConfig::default()
        },
    );
    let harness = Arc::new(Harness::default());
    let core = RelayCore::new(
        config,
        harness.factory(),
        Arc::new(MemoryDataStoreFactory),
    )
    .unwrap();
    {
        let clients = harness.clients.lock().unwrap();
        let _ = clients["sdk-broken"]
            .ready
            .send(Some(Err("invalid sdk key".into())));
    }
    assert!(
        core.wait_for_all_clients(Duration::from_secs(1))
            .await
            .is_err()
    );

    let app = build_router(Arc::clone(&core));
    let request = Request::builder()
        .method(Method::GET)
        .uri("/all")
        .header(header::AUTHORIZATION, "sdk-broken")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    core.close().await;
}
