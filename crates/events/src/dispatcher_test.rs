//! Tests for the event dispatcher

use super::*;
use crate::test_support::start_capture_server;

use axum::body::Body;
use axum::http::HeaderValue;
use std::time::Duration;

use flagrelay_config::{EnvironmentId, EventsConfig, MobileKey, SdkKey};

async fn dispatcher_for(uri: String) -> EventDispatcher {
    let config = EventsConfig {
        events_uri: uri,
        ..EventsConfig::default()
    };
    EventDispatcher::new(
        &config,
        &SdkKey::new("sdk-test"),
        Some(&MobileKey::new("mob-test")),
        Some(&EnvironmentId::new("env-test")),
    )
    .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// Let the detached worker run, then force the publishers to post
async fn settle(endpoint: &Arc<EndpointDispatcher>) {
    tokio::time::sleep(Duration::from_millis(50)).await;
    endpoint.flush().await;
}

#[tokio::test]
async fn empty_body_is_rejected_with_400() {
    let (uri, _upstream) = start_capture_server().await;
    let dispatcher = dispatcher_for(uri).await;
    let endpoint = dispatcher.endpoint(EndpointKind::Server).unwrap();

    let response = endpoint.accept(&HeaderMap::new(), Body::empty()).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await,
        serde_json::json!({"message": "body may not be empty"})
    );
}

#[tokio::test]
async fn schema_3_batch_passes_through_verbatim() {
    let (uri, upstream) = start_capture_server().await;
    let dispatcher = dispatcher_for(uri).await;
    let endpoint = dispatcher.endpoint(EndpointKind::Server).unwrap();

    let mut headers = HeaderMap::new();
    headers.insert(EVENT_SCHEMA_HEADER, HeaderValue::from_static("3"));
    let body = r#"[{"kind":"identify","user":{"key":"u1"}}]"#;

    let response = endpoint
        .clone()
        .accept(&headers, Body::from(body))
        .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    settle(&endpoint).await;
    let requests = upstream.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].records(),
        vec![serde_json::json!({"kind":"identify","user":{"key":"u1"}})]
    );
}

#[tokio::test]
async fn legacy_batch_is_summarized_before_forwarding() {
    let (uri, upstream) = start_capture_server().await;
    let dispatcher = dispatcher_for(uri).await;
    let endpoint = dispatcher.endpoint(EndpointKind::Server).unwrap();

    // no schema header: defaults to version 1
    let feature = r#"{"kind":"feature","creationDate":1000,"key":"flag-a","version":2,"variation":1,"value":true,"default":false}"#;
    let body = format!("[{feature},{feature}]");

    let response = endpoint
        .clone()
        .accept(&HeaderMap::new(), Body::from(body))
        .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    settle(&endpoint).await;
    let requests = upstream.requests();
    assert_eq!(requests.len(), 1);
    let records = requests[0].records();
    let summary = records
        .iter()
        .find(|r| r["kind"] == "summary")
        .expect("summary event present");
    assert_eq!(summary["features"]["flag-a"]["counters"][0]["count"], 2);
}

#[tokio::test]
async fn unparseable_schema_header_defaults_to_legacy() {
    let (uri, upstream) = start_capture_server().await;
    let dispatcher = dispatcher_for(uri).await;
    let endpoint = dispatcher.endpoint(EndpointKind::Server).unwrap();

    let mut headers = HeaderMap::new();
    headers.insert(EVENT_SCHEMA_HEADER, HeaderValue::from_static("not-a-number"));
    let feature = r#"{"kind":"feature","creationDate":1,"key":"f","version":1,"variation":0,"value":1,"default":0}"#;

    endpoint
        .clone()
        .accept(&headers, Body::from(format!("[{feature}]")))
        .await;
    settle(&endpoint).await;

    let records = upstream.requests()[0].records();
    assert!(records.iter().any(|r| r["kind"] == "summary"));
}

#[tokio::test]
async fn malformed_json_still_gets_202_and_forwards_nothing() {
    let (uri, upstream) = start_capture_server().await;
    let dispatcher = dispatcher_for(uri).await;
    let endpoint = dispatcher.endpoint(EndpointKind::Server).unwrap();

    let response = endpoint
        .clone()
        .accept(&HeaderMap::new(), Body::from("this is not json"))
        .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    settle(&endpoint).await;
    assert!(upstream.requests().is_empty());
}

#[tokio::test]
async fn send_events_disabled_accepts_and_drops() {
    let (uri, upstream) = start_capture_server().await;
    let config = EventsConfig {
        events_uri: uri,
        send_events: false,
        ..EventsConfig::default()
    };
    let dispatcher =
        EventDispatcher::new(&config, &SdkKey::new("sdk-test"), None, None).unwrap();
    let endpoint = dispatcher.endpoint(EndpointKind::Server).unwrap();

    let response = endpoint
        .clone()
        .accept(&HeaderMap::new(), Body::from("[1]"))
        .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    settle(&endpoint).await;
    assert!(upstream.requests().is_empty());
}

#[tokio::test]
async fn endpoints_follow_configured_credentials() {
    let (uri, _upstream) = start_capture_server().await;
    let config = EventsConfig {
        events_uri: uri,
        ..EventsConfig::default()
    };
    let dispatcher =
        EventDispatcher::new(&config, &SdkKey::new("sdk-test"), None, None).unwrap();

    assert!(dispatcher.endpoint(EndpointKind::Server).is_some());
    assert!(dispatcher.endpoint(EndpointKind::Mobile).is_none());
    assert!(dispatcher.endpoint(EndpointKind::JsClient).is_none());
}

#[tokio::test]
async fn mobile_endpoint_posts_with_mobile_key() {
    let (uri, upstream) = start_capture_server().await;
    let dispatcher = dispatcher_for(uri).await;
    let endpoint = dispatcher.endpoint(EndpointKind::Mobile).unwrap();

    let mut headers = HeaderMap::new();
    headers.insert(EVENT_SCHEMA_HEADER, HeaderValue::from_static("4"));
    endpoint
        .clone()
        .accept(&headers, Body::from("[1]"))
        .await;
    settle(&endpoint).await;

    let requests = upstream.requests();
    assert_eq!(requests[0].headers["Authorization"], "mob-test");
}
