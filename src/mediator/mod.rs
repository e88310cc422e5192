//! Orchestrator registration and configuration channel.
//!
//! # Data Flow
//! ```text
//! startup (registered mode):
//!     descriptor.rs (identity metadata, loaded once)
//!     → registrar.rs (registration handshake, initial config fetch)
//!     → ConfigStore (merge + persist + reload)
//!     → post-config hooks
//!
//! after the listener binds:
//!     heartbeat.rs (persistent channel, one delta at a time)
//!     → ConfigStore (same merge + persist sequence)
//!     → post-config hooks, URN re-asserted
//! ```
//!
//! # Design Decisions
//! - Registration and fetch failures are fatal: serving with an
//!   incomplete identity is worse than not serving
//! - Heartbeat failures are not: a running service keeps its last
//!   known-good configuration and retries with backoff

pub mod descriptor;
pub mod heartbeat;
pub mod registrar;

pub use descriptor::{DescriptorError, MediatorDescriptor};
pub use heartbeat::{HeartbeatSubscriber, ReconcileError};
pub use registrar::{OrchestratorApi, Registrar, RegistrationError};
