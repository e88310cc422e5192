//! The ordered per-request authentication pipeline.
//!
//! # Responsibilities
//! - Token gate on the protected prefix (with issuance/preflight exemptions
//!   and the token-status short-circuit)
//! - Certificate gate on the business surface (standalone mode)
//! - Prefix rewrite before forwarding to business collaborators
//!
//! # Design Decisions
//! - Layer order is fixed: token gate, then certificate gate, then rewrite
//! - Decisions live in request extensions; nothing here is process-wide

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, uri::Uri, HeaderValue, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::auth::certificate::ClientCertState;
use crate::auth::token::{parse_authorization, verify_token};
use crate::auth::{AuthError, AuthorizationDecision};
use crate::config::{keys, ConfigStore};

/// Path namespace gated by token authentication.
pub const PROTECTED_PREFIX: &str = "/portal";

/// Always-exempt path that mints tokens; without the exemption no client
/// could ever obtain one.
pub const ISSUANCE_PATH: &str = "/portal/user/authenticate";

/// Token liveness probe; answers in place, never forwarded.
pub const TOKEN_STATUS_PATH: &str = "/portal/token/active";

/// Connection-scoped authentication state, inserted into every request's
/// extensions by the listener that accepted the connection.
///
/// `token_seen` is the per-connection replacement for the original
/// process-wide authorized flag: one client's token can only unlock the
/// business surface for its own connection.
#[derive(Clone)]
pub struct ConnectionAuth {
    pub certificate: ClientCertState,
    token_seen: Arc<AtomicBool>,
}

impl ConnectionAuth {
    pub fn new(certificate: ClientCertState) -> Self {
        Self {
            certificate,
            token_seen: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn mark_token_valid(&self) {
        self.token_seen.store(true, Ordering::Release);
    }

    pub fn token_seen(&self) -> bool {
        self.token_seen.load(Ordering::Acquire)
    }
}

fn under_protected_prefix(path: &str) -> bool {
    match path.strip_prefix(PROTECTED_PREFIX) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Bearer-token gate for the protected prefix.
pub async fn token_gate(
    State(config): State<Arc<ConfigStore>>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();

    if !under_protected_prefix(&path) {
        req.extensions_mut().insert(AuthorizationDecision::Exempt);
        return next.run(req).await;
    }

    if req.method() == Method::OPTIONS || path == ISSUANCE_PATH {
        req.extensions_mut().insert(AuthorizationDecision::Exempt);
        return next.run(req).await;
    }

    let header_value = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());
    let credential = match parse_authorization(header_value) {
        Ok(credential) => credential.to_string(),
        Err(err) => {
            tracing::error!(path = %path, "Token is missing");
            return err.into_response();
        }
    };

    let snapshot = config.snapshot();
    let secret = snapshot.get_str(keys::AUTH_SECRET).unwrap_or_default();
    match verify_token(&credential, secret) {
        Err(err) => {
            tracing::warn!(path = %path, "Token expired");
            err.into_response()
        }
        Ok(_claims) => {
            if let Some(conn) = req.extensions().get::<ConnectionAuth>() {
                conn.mark_token_valid();
            }
            if path == TOKEN_STATUS_PATH {
                return token_status_response();
            }
            req.extensions_mut().insert(AuthorizationDecision::TokenValid);
            next.run(req).await
        }
    }
}

fn token_status_response() -> Response {
    let mut response = Response::new(Body::from("true"));
    *response.status_mut() = StatusCode::OK;
    response.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json; charset=utf-8"),
    );
    response
}

/// Client-certificate gate for the business surface.
///
/// Only mounted on the TLS listener (standalone mode); the registered
/// deployment sits behind the orchestrator's own transport security.
pub async fn certificate_gate(mut req: Request<Body>, next: Next) -> Response {
    let path = req.uri().path().to_string();
    if under_protected_prefix(&path) {
        return next.run(req).await;
    }

    let conn = match req.extensions().get::<ConnectionAuth>().cloned() {
        Some(conn) => conn,
        None => {
            // A TLS listener always injects ConnectionAuth; treat its
            // absence as a connection without a certificate.
            tracing::error!(path = %path, "Client has submitted request without certificate");
            return AuthError::CertMissing.into_response();
        }
    };

    if conn.token_seen() {
        return next.run(req).await;
    }

    match conn.certificate {
        ClientCertState::Valid(identity) => {
            req.extensions_mut().insert(AuthorizationDecision::CertValid);
            req.extensions_mut().insert(identity);
            next.run(req).await
        }
        ClientCertState::NoCommonName { subject } => {
            tracing::error!(
                subject = %subject,
                "Client has submitted a valid certificate but missing Common Name (CN)"
            );
            AuthError::CertNoCn.into_response()
        }
        ClientCertState::Invalid { common_name } => {
            tracing::error!(
                common_name = %common_name.as_deref().unwrap_or("unknown"),
                "Client has submitted an invalid certificate"
            );
            AuthError::CertInvalid.into_response()
        }
        ClientCertState::Missing => {
            tracing::error!(path = %path, "Client has submitted request without certificate");
            AuthError::CertMissing.into_response()
        }
    }
}

/// Strip the protected prefix so collaborators see a prefix-free surface.
pub async fn strip_protected_prefix(mut req: Request<Body>, next: Next) -> Response {
    if let Some(rewritten) = stripped_uri(req.uri()) {
        *req.uri_mut() = rewritten;
    }
    next.run(req).await
}

fn stripped_uri(uri: &Uri) -> Option<Uri> {
    let path_and_query = uri.path_and_query()?;
    let path = path_and_query.path();

    let rest = path.strip_prefix(PROTECTED_PREFIX)?;
    let stripped = if rest.is_empty() {
        "/".to_string()
    } else if rest.starts_with('/') {
        rest.to_string()
    } else {
        // A sibling path like /portalish; leave it alone.
        return None;
    };

    let rewritten = match path_and_query.query() {
        Some(query) => format!("{}?{}", stripped, query),
        None => stripped,
    };

    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(rewritten.parse().ok()?);
    Uri::from_parts(parts).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::certificate::PeerIdentity;
    use crate::config::RuntimeConfig;
    use axum::{middleware, routing::any, Extension, Router};
    use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
    use serde_json::json;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};
    use tower::ServiceExt;

    const SECRET: &str = "unit-secret";

    fn store() -> Arc<ConfigStore> {
        let base = RuntimeConfig::from_json(&json!({"auth": {"secret": SECRET}}));
        Arc::new(ConfigStore::new(base, PathBuf::from("/tmp/unused.json")))
    }

    fn mint_token(secret: &str, offset_secs: i64) -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64;
        encode(
            &Header::new(Algorithm::HS256),
            &crate::auth::TokenClaims {
                exp: (now + offset_secs).max(0) as u64,
                sub: None,
            },
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    async fn echo_path(req: Request<Body>) -> String {
        req.uri().to_string()
    }

    fn gated_app() -> Router {
        Router::new()
            .route("/{*path}", any(echo_path))
            .route("/", any(echo_path))
            .layer(middleware::from_fn(strip_protected_prefix))
            .layer(middleware::from_fn(certificate_gate))
            .layer(middleware::from_fn_with_state(store(), token_gate))
    }

    fn with_connection(app: Router, state: ClientCertState) -> Router {
        app.layer(Extension(ConnectionAuth::new(state)))
    }

    async fn send(app: Router, req: Request<Body>) -> Response {
        app.oneshot(req).await.unwrap()
    }

    fn get(path: &str) -> Request<Body> {
        Request::builder().uri(path).body(Body::empty()).unwrap()
    }

    fn get_with_token(path: &str, token: &str) -> Request<Body> {
        Request::builder()
            .uri(path)
            .header("Authorization", format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap()
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn missing_header_yields_401_with_realm() {
        let app = with_connection(gated_app(), ClientCertState::Missing);
        let response = send(app, get("/portal/config")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response
                .headers()
                .get(header::WWW_AUTHENTICATE)
                .and_then(|v| v.to_str().ok()),
            Some(r#"Bearer realm="Token is required""#)
        );
    }

    #[tokio::test]
    async fn three_part_header_counts_as_missing() {
        let app = with_connection(gated_app(), ClientCertState::Missing);
        let request = Request::builder()
            .uri("/portal/config")
            .header("Authorization", "Bearer a b")
            .body(Body::empty())
            .unwrap();
        let response = send(app, request).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(body_string(response).await.contains("Token is missing"));
    }

    #[tokio::test]
    async fn expired_token_yields_401_expired_realm() {
        let app = with_connection(gated_app(), ClientCertState::Missing);
        let token = mint_token(SECRET, -600);
        let response = send(app, get_with_token("/portal/config", &token)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response
                .headers()
                .get(header::WWW_AUTHENTICATE)
                .and_then(|v| v.to_str().ok()),
            Some(r#"Bearer realm="Token expired""#)
        );
    }

    #[tokio::test]
    async fn missigned_token_yields_401_expired_realm() {
        let app = with_connection(gated_app(), ClientCertState::Missing);
        let token = mint_token("wrong-secret", 600);
        let response = send(app, get_with_token("/portal/config", &token)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(body_string(response).await.contains("Token expired"));
    }

    #[tokio::test]
    async fn valid_token_is_forwarded_with_prefix_stripped() {
        let app = with_connection(gated_app(), ClientCertState::Missing);
        let token = mint_token(SECRET, 600);
        let response = send(app, get_with_token("/portal/config/site?x=1", &token)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "/config/site?x=1");
    }

    #[tokio::test]
    async fn issuance_path_is_exempt_and_rewritten() {
        let app = with_connection(gated_app(), ClientCertState::Missing);
        let response = send(app, get(ISSUANCE_PATH)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "/user/authenticate");
    }

    #[tokio::test]
    async fn options_is_exempt() {
        let app = with_connection(gated_app(), ClientCertState::Missing);
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/portal/config")
            .body(Body::empty())
            .unwrap();
        let response = send(app, request).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn token_status_short_circuits_with_boolean_body() {
        let app = with_connection(gated_app(), ClientCertState::Missing);
        let token = mint_token(SECRET, 600);
        let response = send(app, get_with_token(TOKEN_STATUS_PATH, &token)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "true");
    }

    #[tokio::test]
    async fn business_surface_without_certificate_yields_401() {
        let app = with_connection(gated_app(), ClientCertState::Missing);
        let response = send(app, get("/fhir/Patient/1")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn business_surface_with_invalid_certificate_yields_403() {
        let app = with_connection(
            gated_app(),
            ClientCertState::Invalid {
                common_name: Some("intruder".into()),
            },
        );
        let response = send(app, get("/fhir/Patient/1")).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn business_surface_with_cnless_certificate_yields_400() {
        let app = with_connection(
            gated_app(),
            ClientCertState::NoCommonName {
                subject: "O=clients".into(),
            },
        );
        let response = send(app, get("/fhir/Patient/1")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn business_surface_with_valid_certificate_is_forwarded() {
        let app = with_connection(
            gated_app(),
            ClientCertState::Valid(PeerIdentity {
                common_name: "pos-1".into(),
                subject: "CN=pos-1".into(),
            }),
        );
        let response = send(app, get("/fhir/Patient/1")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "/fhir/Patient/1");
    }

    #[tokio::test]
    async fn token_valid_on_same_connection_skips_certificate_gate() {
        let conn = ConnectionAuth::new(ClientCertState::Missing);
        let app = Router::new()
            .route("/{*path}", any(echo_path))
            .layer(middleware::from_fn(strip_protected_prefix))
            .layer(middleware::from_fn(certificate_gate))
            .layer(middleware::from_fn_with_state(store(), token_gate))
            .layer(Extension(conn.clone()));
        let token = mint_token(SECRET, 600);

        // First request on the connection authenticates on the prefix.
        let response = send(app.clone(), get_with_token("/portal/config", &token)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(conn.token_seen());

        // Second request on the same connection reaches the business
        // surface without a certificate.
        let response = send(app, get("/fhir/Patient/1")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn fresh_connection_does_not_inherit_token() {
        let app = with_connection(gated_app(), ClientCertState::Missing);
        let token = mint_token(SECRET, 600);
        let response = send(app.clone(), get_with_token("/portal/config", &token)).await;
        assert_eq!(response.status(), StatusCode::OK);

        // A different connection gets its own ConnectionAuth.
        let other = with_connection(gated_app(), ClientCertState::Missing);
        let response = send(other, get("/fhir/Patient/1")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn prefix_strip_is_exact() {
        let cases = [
            ("/portal/foo/bar", "/foo/bar"),
            ("/portal", "/"),
            ("/portal/", "/"),
            ("/portal/user/authenticate", "/user/authenticate"),
        ];
        for (input, expected) in cases {
            let uri: Uri = input.parse().unwrap();
            assert_eq!(stripped_uri(&uri).unwrap().path(), expected);
        }

        // Non-prefix paths are untouched.
        let uri: Uri = "/fhir/Patient".parse().unwrap();
        assert!(stripped_uri(&uri).is_none());
        let uri: Uri = "/portalish/foo".parse().unwrap();
        assert!(stripped_uri(&uri).is_none());
    }

    #[test]
    fn prefix_check_does_not_match_sibling_paths() {
        assert!(under_protected_prefix("/portal"));
        assert!(under_protected_prefix("/portal/config"));
        assert!(!under_protected_prefix("/portalish"));
        assert!(!under_protected_prefix("/fhir"));
    }
}
