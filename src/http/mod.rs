//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, middleware stack)
//!     → auth chain (token gate, certificate gate, prefix rewrite)
//!     → forward handler (proxy to the business collaborator)
//!     → Send to client
//! ```

pub mod request;
pub mod server;

pub use request::{RequestId, RequestIdExt, RequestIdLayer, X_REQUEST_ID};
pub use server::{AppState, GatewayServer};
