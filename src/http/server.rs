//! HTTP server setup and upstream forwarding.
//!
//! # Responsibilities
//! - Create the Axum router with the authentication chain wired in order
//! - Enforce request timeout and body limits
//! - Forward gated requests to the business collaborator
//!
//! # Design Decisions
//! - The gateway owns no business routes; everything that passes the
//!   chain is proxied to `app.backend` with the prefix already stripped
//! - The certificate gate is only mounted on the TLS listener
//!   (standalone mode); behind the orchestrator it has nothing to check

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{header, uri::Scheme, Request, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::auth::{certificate_gate, strip_protected_prefix, token_gate, AuthorizationDecision};
use crate::config::{keys, ConfigStore};
use crate::http::request::{RequestIdExt, RequestIdLayer};
use crate::observability::metrics;

/// The original front accepted JSON bodies up to 10 Mb.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ConfigStore>,
    pub client: Client<HttpConnector, Body>,
}

/// The gateway's HTTP front.
pub struct GatewayServer {
    router: Router,
}

impl GatewayServer {
    /// Build the server. `with_certificate_gate` mounts the client
    /// certificate check (standalone mode only).
    pub fn new(config: Arc<ConfigStore>, with_certificate_gate: bool) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        let state = AppState {
            config: config.clone(),
            client,
        };

        let mut router = Router::new()
            .route("/{*path}", any(forward_handler))
            .route("/", any(forward_handler))
            .with_state(state)
            .layer(axum::middleware::from_fn(strip_protected_prefix));

        if with_certificate_gate {
            router = router.layer(axum::middleware::from_fn(certificate_gate));
        }

        let router = router
            .layer(axum::middleware::from_fn_with_state(config, token_gate))
            .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
            .layer(TimeoutLayer::new(Duration::from_secs(REQUEST_TIMEOUT_SECS)))
            .layer(RequestIdLayer)
            .layer(TraceLayer::new_for_http());

        Self { router }
    }

    /// The composed router, cloneable per listener/connection.
    pub fn router(&self) -> Router {
        self.router.clone()
    }
}

/// Forward a gated request to the business collaborator.
async fn forward_handler(
    State(state): State<AppState>,
    request: Request<Body>,
) -> impl IntoResponse {
    let start_time = Instant::now();
    let request_id = request
        .request_id()
        .map(|id| id.as_str().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let decision = request
        .extensions()
        .get::<AuthorizationDecision>()
        .copied();

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %path,
        decision = ?decision,
        "Forwarding request"
    );

    let snapshot = state.config.snapshot();
    let backend = match snapshot.get_str(keys::APP_BACKEND) {
        Some(backend) => backend.to_string(),
        None => {
            tracing::error!(request_id = %request_id, "No business backend configured");
            metrics::record_request(&method, 503, start_time);
            return (StatusCode::SERVICE_UNAVAILABLE, "Backend not configured").into_response();
        }
    };
    let backend_uri: Uri = match backend.parse() {
        Ok(uri) => uri,
        Err(e) => {
            tracing::error!(request_id = %request_id, backend = %backend, error = %e, "Invalid backend address");
            metrics::record_request(&method, 503, start_time);
            return (StatusCode::SERVICE_UNAVAILABLE, "Backend not configured").into_response();
        }
    };

    let (mut parts, body) = request.into_parts();
    let mut uri_parts = parts.uri.into_parts();
    uri_parts.scheme = backend_uri.scheme().cloned().or(Some(Scheme::HTTP));
    uri_parts.authority = backend_uri.authority().cloned();
    if uri_parts.path_and_query.is_none() {
        uri_parts.path_and_query = Some("/".parse().expect("static path"));
    }
    parts.uri = match Uri::from_parts(uri_parts) {
        Ok(uri) => uri,
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Failed to build upstream URI");
            metrics::record_request(&method, 502, start_time);
            return (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response();
        }
    };
    if let Ok(value) = header::HeaderValue::from_str(&request_id) {
        parts.headers.insert("x-request-id", value);
    }

    match state.client.request(Request::from_parts(parts, body)).await {
        Ok(response) => {
            let status = response.status();
            metrics::record_request(&method, status.as_u16(), start_time);
            let (parts, body) = response.into_parts();
            Response::from_parts(parts, Body::new(body)).into_response()
        }
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Upstream error");
            metrics::record_request(&method, 502, start_time);
            (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
        }
    }
}
