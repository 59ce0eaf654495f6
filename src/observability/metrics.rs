//! Metrics collection and exposition.
//!
//! # Metrics
//! - `bridge_requests_total` (counter): requests by method, status
//! - `bridge_request_duration_seconds` (histogram): end-to-end event latency
//! - `bridge_already_finalized_total` (counter): rejected mutations by operation
//! - `bridge_transport_failures_total` (counter): drain failures by step
//! - `bridge_tasks_total` (counter): background tasks by outcome
//! - `bridge_worker_errors_total` (counter): contained worker faults
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint on `addr`.
///
/// Must run inside a tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "bridge_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("bridge_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_already_finalized(operation: &'static str) {
    counter!("bridge_already_finalized_total", "operation" => operation).increment(1);
}

pub fn record_transport_failure(step: &'static str) {
    counter!("bridge_transport_failures_total", "step" => step).increment(1);
}

pub fn record_task(outcome: &'static str) {
    counter!("bridge_tasks_total", "outcome" => outcome).increment(1);
}

pub fn record_worker_error() {
    counter!("bridge_worker_errors_total").increment(1);
}
