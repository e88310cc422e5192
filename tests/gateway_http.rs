//! End-to-end tests for the registered-mode (plaintext) gateway.

use std::net::SocketAddr;
use std::sync::Arc;

use registry_gateway::bootstrap::Shutdown;
use registry_gateway::net::listener::serve_plain;
use registry_gateway::{ConfigStore, GatewayServer, RuntimeConfig};
use serde_json::json;
use tokio::net::TcpListener;

mod common;

const SECRET: &str = "integration-secret";

async fn start_gateway(backend: SocketAddr) -> (SocketAddr, Shutdown, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let base = RuntimeConfig::from_json(&json!({
        "auth": {"secret": SECRET},
        "app": {"backend": format!("http://{}", backend)}
    }));
    let store = Arc::new(ConfigStore::new(
        base,
        dir.path().join("config_merged.json"),
    ));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = GatewayServer::new(store, false);
    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        serve_plain(listener, server.router(), rx).await.unwrap();
    });

    (addr, shutdown, dir)
}

#[tokio::test]
async fn business_requests_are_forwarded_untouched() {
    let backend = common::start_echo_backend().await;
    let (addr, _shutdown, _dir) = start_gateway(backend).await;

    let client = reqwest::Client::new();
    let response = client
        .get(format!("http://{}/fhir/Patient/1", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "/fhir/Patient/1");
}

#[tokio::test]
async fn protected_prefix_requires_a_token() {
    let backend = common::start_echo_backend().await;
    let (addr, _shutdown, _dir) = start_gateway(backend).await;

    let client = reqwest::Client::new();
    let response = client
        .get(format!("http://{}/portal/config", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
    assert_eq!(
        response
            .headers()
            .get("www-authenticate")
            .and_then(|v| v.to_str().ok()),
        Some(r#"Bearer realm="Token is required""#)
    );
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
}

#[tokio::test]
async fn valid_token_reaches_backend_with_prefix_stripped() {
    let backend = common::start_echo_backend().await;
    let (addr, _shutdown, _dir) = start_gateway(backend).await;

    let token = common::mint_token(SECRET, 300);
    let client = reqwest::Client::new();
    let response = client
        .get(format!("http://{}/portal/match/run?threshold=0.9", addr))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "/match/run?threshold=0.9");
}

#[tokio::test]
async fn expired_token_is_rejected_with_expired_realm() {
    let backend = common::start_echo_backend().await;
    let (addr, _shutdown, _dir) = start_gateway(backend).await;

    let token = common::mint_token(SECRET, -300);
    let client = reqwest::Client::new();
    let response = client
        .get(format!("http://{}/portal/config", addr))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
    assert_eq!(
        response
            .headers()
            .get("www-authenticate")
            .and_then(|v| v.to_str().ok()),
        Some(r#"Bearer realm="Token expired""#)
    );
}

#[tokio::test]
async fn issuance_path_is_exempt_and_forwarded() {
    let backend = common::start_echo_backend().await;
    let (addr, _shutdown, _dir) = start_gateway(backend).await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{}/portal/user/authenticate", addr))
        .json(&json!({"username": "admin", "password": "admin"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "/user/authenticate");
}

#[tokio::test]
async fn token_status_answers_in_place() {
    let backend = common::start_echo_backend().await;
    let (addr, _shutdown, _dir) = start_gateway(backend).await;

    let token = common::mint_token(SECRET, 300);
    let client = reqwest::Client::new();
    let response = client
        .get(format!("http://{}/portal/token/active", addr))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    // Exactly the boolean body; never the backend echo.
    assert_eq!(response.text().await.unwrap(), "true");
}
