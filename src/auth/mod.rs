//! Request authentication subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → chain.rs token gate   (protected prefix: bearer token policy)
//!     → chain.rs cert gate    (business surface: client certificate policy,
//!                              standalone mode only)
//!     → chain.rs path rewrite (strip the protected prefix)
//!     → forwarded to the business collaborator
//! ```
//!
//! # Design Decisions
//! - The authorization decision is derived per request and threaded
//!   through request extensions; it is never process-wide state
//! - A TokenValid decision is remembered per connection (not per process)
//!   so a session that authenticated on the management surface can reach
//!   the business surface without a client certificate
//! - Certificate chain validation happens here, not in the TLS handshake,
//!   so rejections carry specific statuses instead of a handshake failure

pub mod certificate;
pub mod chain;
pub mod token;

pub use certificate::{CertificateGate, ClientCertState, PeerIdentity};
pub use chain::{certificate_gate, strip_protected_prefix, token_gate, ConnectionAuth};
pub use token::TokenClaims;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// The per-request outcome of the authentication chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationDecision {
    /// Path is outside the gated surface, or an always-exempt path.
    Exempt,
    TokenValid,
    TokenMissing,
    TokenExpired,
    CertValid,
    CertMissing,
    CertInvalid,
}

/// Authentication failures, all recovered locally into HTTP responses.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Token is missing")]
    TokenMissing,

    #[error("Token expired")]
    TokenExpired,

    #[error("client certificate missing")]
    CertMissing,

    #[error("client certificate not signed by the registry")]
    CertInvalid,

    #[error("client certificate has no Common Name")]
    CertNoCn,
}

impl AuthError {
    pub fn decision(&self) -> AuthorizationDecision {
        match self {
            AuthError::TokenMissing => AuthorizationDecision::TokenMissing,
            AuthError::TokenExpired => AuthorizationDecision::TokenExpired,
            AuthError::CertMissing => AuthorizationDecision::CertMissing,
            AuthError::CertInvalid | AuthError::CertNoCn => AuthorizationDecision::CertInvalid,
        }
    }

    /// Label used for rejection metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::TokenMissing => "token_missing",
            AuthError::TokenExpired => "token_expired",
            AuthError::CertMissing => "cert_missing",
            AuthError::CertInvalid => "cert_invalid",
            AuthError::CertNoCn => "cert_no_cn",
        }
    }
}

/// Browser clients must be able to read rejection bodies, so every
/// 400/401/403 produced here carries the permissive CORS header.
impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        crate::observability::metrics::record_auth_rejection(self.kind());

        let (status, www_authenticate, body) = match &self {
            AuthError::TokenMissing => (
                StatusCode::UNAUTHORIZED,
                Some(r#"Bearer realm="Token is required""#),
                r#"{"error":"Token is missing"}"#.to_string(),
            ),
            AuthError::TokenExpired => (
                StatusCode::UNAUTHORIZED,
                Some(r#"Bearer realm="Token expired""#),
                r#"{"error":"Token expired"}"#.to_string(),
            ),
            AuthError::CertMissing => (
                StatusCode::UNAUTHORIZED,
                None,
                "Sorry, you need to provide a client certificate to continue.".to_string(),
            ),
            AuthError::CertInvalid => (
                StatusCode::FORBIDDEN,
                None,
                "Sorry, you have submitted an invalid certificate, make sure that your \
                 certificate is signed by client registry"
                    .to_string(),
            ),
            AuthError::CertNoCn => (
                StatusCode::BAD_REQUEST,
                None,
                "You have submitted a valid certificate but missing Common Name (CN)"
                    .to_string(),
            ),
        };

        let content_type = if body.starts_with('{') {
            "application/json; charset=utf-8"
        } else {
            "text/plain; charset=utf-8"
        };

        let mut response = Response::new(body.into());
        *response.status_mut() = status;
        let headers = response.headers_mut();
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        );
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        if let Some(value) = www_authenticate {
            headers.insert(header::WWW_AUTHENTICATE, HeaderValue::from_static(value));
        }
        response
    }
}
