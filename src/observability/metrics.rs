//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): forwarded requests by method, status
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//! - `gateway_auth_rejections_total` (counter): rejections by kind
//! - `gateway_heartbeat_cycles_total` (counter): reconciliation outcomes
//! - `resync_trigger_failures_total` (counter): swallowed resync errors

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus exposition endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter started"),
        Err(e) => tracing::error!(error = %e, "Failed to start metrics exporter"),
    }
}

/// Record one forwarded (or locally answered) request.
pub fn record_request(method: &str, status: u16, start_time: Instant) {
    metrics::counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
    )
    .increment(1);
    metrics::histogram!("gateway_request_duration_seconds")
        .record(start_time.elapsed().as_secs_f64());
}

/// Count a rejection produced by the authentication chain.
pub fn record_auth_rejection(kind: &'static str) {
    metrics::counter!("gateway_auth_rejections_total", "kind" => kind).increment(1);
}

/// Count one heartbeat reconciliation cycle by outcome.
pub fn record_heartbeat_cycle(outcome: &'static str) {
    metrics::counter!("gateway_heartbeat_cycles_total", "outcome" => outcome).increment(1);
}

/// Count a failed resynchronization trigger. The failure itself is
/// swallowed by design; this counter is how it stays observable.
pub fn record_resync_trigger_failure() {
    metrics::counter!("resync_trigger_failures_total").increment(1);
}
