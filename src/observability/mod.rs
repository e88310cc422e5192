//! Logging and metrics.
//!
//! # Design Decisions
//! - Uses tracing for structured logging: JSON in production, pretty
//!   format elsewhere, level configurable via `RUST_LOG`
//! - Prometheus exposition is optional and bound only when the config
//!   provides `observability.metricsAddress`
//! - Rejections and resync-trigger failures are counted, not just
//!   logged, so a quiet failure mode is still visible

pub mod logging;
pub mod metrics;
