//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → tls.rs (handshake; client certificate requested, never required)
//!     → certificate verdict computed once, attached to the connection
//!     → Hand off to HTTP layer with ConnectionAuth in extensions
//! ```
//!
//! # Design Decisions
//! - The handshake never rejects a client certificate; the gate answers
//!   with specific HTTP statuses instead of a TLS alert
//! - Bounded accept queue prevents resource exhaustion
//! - Registered mode serves plaintext (the orchestrator fronts TLS);
//!   standalone mode serves TLS with the registry's own material

pub mod listener;
pub mod tls;

pub use listener::{serve_plain, serve_tls, ListenerError};
pub use tls::{build_server_config, load_root_store, TlsError, TlsMaterial};
