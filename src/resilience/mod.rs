//! Retry pacing for the orchestrator channel.
//!
//! The heartbeat subscriber never gives up on a broken channel; it
//! backs off exponentially (with jitter, so restarting fleets don't
//! reconnect in lockstep) and resumes the normal cadence on the first
//! successful delivery.

pub mod backoff;

pub use backoff::calculate_backoff;
