//! Shared test helpers: a local capture server standing in for the
//! upstream event service

use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicU16, Ordering};

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use bytes::Bytes;

/// One POST received by the capture server
#[derive(Clone, Debug)]
pub struct Captured {
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Captured {
    /// Body parsed as a JSON array of values
    pub fn records(&self) -> Vec<serde_json::Value> {
        serde_json::from_slice(&self.body).unwrap()
    }
}

#[derive(Debug, Default)]
pub struct CaptureState {
    requests: StdMutex<Vec<Captured>>,
    status: AtomicU16,
}

impl CaptureState {
    pub fn requests(&self) -> Vec<Captured> {
        self.requests.lock().unwrap().clone()
    }

    pub fn respond_with(&self, status: StatusCode) {
        self.status.store(status.as_u16(), Ordering::Relaxed);
    }
}

async fn capture(
    State(state): State<Arc<CaptureState>>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    state
        .requests
        .lock()
        .unwrap()
        .push(Captured { headers, body });
    StatusCode::from_u16(state.status.load(Ordering::Relaxed)).unwrap()
}

/// Start a capture server on a random local port; returns its base URI
pub async fn start_capture_server() -> (String, Arc<CaptureState>) {
    let state = Arc::new(CaptureState::default());
    state.respond_with(StatusCode::ACCEPTED);

    let app = Router::new()
        .route("/{*path}", post(capture))
        .with_state(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), state)
}
