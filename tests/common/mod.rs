//! Shared utilities for integration testing.

// Each integration binary compiles its own copy; not all of them use
// every helper.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{any, get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

/// Serve an axum router on an ephemeral port; returns the bound address.
pub async fn start_app(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.unwrap();
    });
    addr
}

/// A business backend that echoes the path it was asked for.
pub async fn start_echo_backend() -> SocketAddr {
    async fn echo(req: axum::http::Request<axum::body::Body>) -> String {
        req.uri().to_string()
    }
    let app = Router::new()
        .route("/{*path}", any(echo))
        .route("/", any(echo));
    start_app(app).await
}

/// A FHIR server whose `/metadata` probe answers with `status`.
pub async fn start_fhir_stub(status: StatusCode) -> SocketAddr {
    let app = Router::new().route("/metadata", get(move || async move { status }));
    start_app(app).await
}

/// State shared with the mock orchestrator's handlers.
#[derive(Clone)]
pub struct OrchestratorState {
    pub register_calls: Arc<AtomicU32>,
    pub heartbeat_calls: Arc<AtomicU32>,
    /// Deltas handed out on successive heartbeat polls; later polls get
    /// an empty body ("no change").
    pub heartbeat_deltas: Arc<Vec<Value>>,
    pub initial_config: Value,
}

/// An orchestrator covering registration, config fetch, and heartbeat.
pub async fn start_orchestrator(state: OrchestratorState) -> SocketAddr {
    async fn register(State(state): State<OrchestratorState>) -> StatusCode {
        state.register_calls.fetch_add(1, Ordering::SeqCst);
        StatusCode::CREATED
    }

    async fn fetch_config(State(state): State<OrchestratorState>) -> Json<Value> {
        Json(state.initial_config.clone())
    }

    async fn heartbeat(State(state): State<OrchestratorState>) -> Json<Value> {
        let call = state.heartbeat_calls.fetch_add(1, Ordering::SeqCst) as usize;
        let delta = state
            .heartbeat_deltas
            .get(call)
            .cloned()
            .unwrap_or_else(|| json!({}));
        Json(delta)
    }

    let app = Router::new()
        .route("/mediators", post(register))
        .route("/mediators/{urn}/config", get(fetch_config))
        .route("/mediators/{urn}/heartbeat", post(heartbeat))
        .with_state(state);
    start_app(app).await
}

/// Mint an HS256 token the way the issuance collaborator does.
pub fn mint_token(secret: &str, offset_secs: i64) -> String {
    use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64;
    encode(
        &Header::new(Algorithm::HS256),
        &registry_gateway::auth::TokenClaims {
            exp: (now + offset_secs).max(0) as u64,
            sub: Some("integration".into()),
        },
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}
