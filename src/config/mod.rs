//! Runtime configuration subsystem.
//!
//! # Data Flow
//! ```text
//! config_<env>.json (base layer)
//!     → loader.rs (read & flatten to dotted keys)
//!     → RuntimeConfig (immutable snapshot)
//!     → shared via ConfigStore (arc-swap) to all subsystems
//!
//! On orchestrator delta (initial fetch or heartbeat):
//!     delta merged over base layer (delta wins, unknown keys kept)
//!     → persisted to config_merged.json via temp file + rename
//!     → reloaded from disk
//!     → atomic swap of the live snapshot
//!     → request handlers observe the new snapshot
//! ```
//!
//! # Design Decisions
//! - Snapshots are immutable; writers replace the whole snapshot, never
//!   mutate one in place while readers may be observing it
//! - Deltas merge over the base layer, not over the previous merge, so
//!   reconciliation is idempotent under repeated application
//! - The store is only repointed after the durable write succeeds

pub mod loader;
pub mod store;

pub use loader::{base_config_path, load_base_config, merged_config_path, ConfigError};
pub use store::{ConfigStore, RuntimeConfig};

/// Well-known dotted configuration keys.
pub mod keys {
    pub const MEDIATOR_REGISTER: &str = "mediator.register";
    pub const MEDIATOR_API_URL: &str = "mediator.api.url";
    pub const MEDIATOR_API_USERNAME: &str = "mediator.api.username";
    pub const MEDIATOR_API_PASSWORD: &str = "mediator.api.password";
    pub const MEDIATOR_API_URN: &str = "mediator.api.urn";
    pub const MEDIATOR_HEARTBEAT_INTERVAL: &str = "mediator.api.heartbeatInterval";
    pub const MEDIATOR_TRUST_SELF_SIGNED: &str = "mediator.api.trustSelfSigned";

    pub const APP_PORT: &str = "app.port";
    pub const APP_BACKEND: &str = "app.backend";
    pub const APP_MAX_CONNECTIONS: &str = "app.maxConnections";

    pub const SERVER_CERTIFICATE: &str = "server.certificate";
    pub const SERVER_KEY: &str = "server.key";
    pub const SERVER_CA: &str = "server.ca";

    pub const AUTH_SECRET: &str = "auth.secret";

    pub const MATCHING_TOOL: &str = "matching.tool";
    pub const SYNC_LAST_FHIR2ES: &str = "sync.lastFHIR2ESSync";
    pub const SYNC_ENDPOINT: &str = "sync.endpoint";

    pub const FHIR_SERVER: &str = "fhir.server";

    pub const METRICS_ADDRESS: &str = "observability.metricsAddress";
}
