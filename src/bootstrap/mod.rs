//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs), registered mode:
//!     Load base config → register with orchestrator → fetch config
//!     → merge + persist + reload → post-config hooks → bind listener
//!     → start heartbeat channel
//!
//! Startup, standalone mode:
//!     Load base config → post-config hooks → bind TLS listener
//!
//! Shutdown (shutdown.rs):
//!     Signal received → stop accepting → drain in-flight → exit
//! ```
//!
//! # Design Decisions
//! - Fail fast: every startup stage is fatal, and the listener only
//!   binds once every earlier stage has succeeded
//! - The same hook set runs at startup and on every heartbeat cycle;
//!   only the failure policy differs (fatal vs. keep-serving)

pub mod hooks;
pub mod prerequisites;
pub mod shutdown;
pub mod startup;

pub use hooks::{HookError, PostConfigHooks};
pub use shutdown::Shutdown;
pub use startup::{run, BootstrapOptions, StartupError};
