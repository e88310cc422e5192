//! Registry Gateway
//!
//! Bootstrap and security-gating front of a networked client registry.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────────┐
//!                    │                 REGISTRY GATEWAY                  │
//!                    │                                                   │
//!   Client Request   │  ┌─────────┐   ┌────────────┐   ┌─────────────┐  │
//!   ─────────────────┼─▶│   net   │──▶│ auth chain │──▶│   forward   │──┼──▶ Business
//!                    │  │ TLS/TCP │   │ token+cert │   │  (rewrite)  │  │    collaborator
//!                    │  └─────────┘   └────────────┘   └─────────────┘  │
//!                    │                                                   │
//!                    │  ┌─────────────────────────────────────────────┐ │
//!                    │  │            Lifecycle & Config                │ │
//!                    │  │  ┌───────────┐  ┌───────────┐  ┌──────────┐ │ │
//!                    │  │  │ registrar │─▶│  config   │─▶│  hooks   │ │ │
//!                    │  │  │ handshake │  │   store   │  │ + resync │ │ │
//!                    │  │  └───────────┘  └─────▲─────┘  └──────────┘ │ │
//!                    │  │                       │                      │ │
//!                    │  │               ┌───────┴──────┐               │ │
//!   Orchestrator ────┼──┼──────────────▶│  heartbeat   │               │ │
//!   (config deltas)  │  │               │  subscriber  │               │ │
//!                    │  │               └──────────────┘               │ │
//!                    │  └─────────────────────────────────────────────┘ │
//!                    └──────────────────────────────────────────────────┘
//! ```

// Core subsystems
pub mod auth;
pub mod config;
pub mod http;
pub mod net;

// Orchestrator integration
pub mod mediator;
pub mod sync;

// Cross-cutting concerns
pub mod bootstrap;
pub mod observability;
pub mod resilience;

pub use bootstrap::{BootstrapOptions, Shutdown, StartupError};
pub use config::{ConfigStore, RuntimeConfig};
pub use http::GatewayServer;
