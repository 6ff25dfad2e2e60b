//! The reqwest link gateway client against a local stand-in service.

use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use scriptgate::client::http::LinkGatewayClient;
use scriptgate::client::MonetizationGateway;
use scriptgate::store::memory::MemoryStore;
use scriptgate::{AccessGate, GateConfig, GateError, GatewayConfig};
use std::sync::Arc;
use std::time::Duration;

const API_KEY: &str = "wk-test-key";

async fn create_link(headers: HeaderMap) -> impl IntoResponse {
    if headers.get("x-api-key").and_then(|v| v.to_str().ok()) != Some(API_KEY) {
        return (StatusCode::UNAUTHORIZED, Json(serde_json::json!({ "error": "bad key" })));
    }
    (
        StatusCode::OK,
        Json(serde_json::json!({ "error": false, "response": { "url": "https://l.test/abc" } })),
    )
}

async fn validate_token() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "valid": true, "info": { "byIp": "127.0.0.1" } }))
}

async fn bad_gateway() -> (StatusCode, Html<&'static str>) {
    (
        StatusCode::BAD_GATEWAY,
        Html("<html><body>502 Bad Gateway</body></html>"),
    )
}

/// Serve the stand-in on an ephemeral port and return its base URL.
fn start_service() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    let app = Router::new()
        .route("/ok/link", post(create_link))
        .route("/ok/token/{token}", get(validate_token))
        .route("/down/link", post(bad_gateway))
        .route("/down/token/{token}", get(bad_gateway));

    std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, app).await.unwrap();
        });
    });

    base
}

fn client(service: &str, prefix: &str, api_key: &str) -> LinkGatewayClient {
    let config = GatewayConfig {
        api_key: api_key.to_string(),
        create_url: format!("{}/{}/link", service, prefix),
        validate_url: format!("{}/{}/token/{{}}", service, prefix),
        timeout: Duration::from_secs(5),
    };
    LinkGatewayClient::new(config, "https://gate.test").unwrap()
}

#[test]
fn test_healthy_service() {
    let service = start_service();
    let gateway = client(&service, "ok", API_KEY);

    assert_eq!(gateway.create_unlock_link("r1").unwrap(), "https://l.test/abc");
    assert!(gateway.validate_completion("tok123", "127.0.0.1").unwrap());
    assert!(!gateway.validate_completion("tok123", "10.0.0.9").unwrap());
}

#[test]
fn test_wrong_api_key_is_upstream_unavailable() {
    let service = start_service();
    let gateway = client(&service, "ok", "wrong");

    assert!(matches!(
        gateway.create_unlock_link("r1"),
        Err(GateError::UpstreamUnavailable(_))
    ));
}

#[test]
fn test_html_error_page_is_upstream_unavailable() {
    let service = start_service();
    let gateway = client(&service, "down", API_KEY);

    assert!(matches!(
        gateway.create_unlock_link("r1"),
        Err(GateError::UpstreamUnavailable(_))
    ));
    assert!(matches!(
        gateway.validate_completion("tok123", "127.0.0.1"),
        Err(GateError::UpstreamUnavailable(_))
    ));
}

#[test]
fn test_gate_surfaces_unavailable_service_on_unlock() {
    let service = start_service();
    let store = Arc::new(MemoryStore::new());
    let gate = AccessGate::new(
        GateConfig::new(b"link-gateway-secret-0123456".to_vec(), "https://gate.test"),
        store.clone(),
        store,
    )
    .unwrap()
    .with_gateway(Arc::new(client(&service, "down", API_KEY)));

    // Link creation fails, so registration degrades to no unlock URL.
    let registration = gate.register(b"print(1)".to_vec()).unwrap();
    assert!(registration.unlock_url.is_none());

    let err = gate
        .issue_key(&registration.resource_id, "127.0.0.1", Some("tok123"))
        .unwrap_err();
    assert!(matches!(err, GateError::UpstreamUnavailable(_)));
    assert_eq!(
        err.status_code(),
        axum::http::StatusCode::SERVICE_UNAVAILABLE
    );
}
