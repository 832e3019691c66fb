//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gateway metrics (requests, latency, backend problems, rejections)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by pipeline and status
//! - `gateway_request_duration_seconds` (histogram): latency by pipeline
//! - `gateway_backend_problem` (gauge): 1 while a backend host is excluded
//! - `gateway_rejected_requests_total` (counter): admission rejections by reason
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   exporter every call is a no-op
//! - Labels for pipeline, host, status code

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

pub const REQUESTS_TOTAL: &str = "gateway_requests_total";
pub const REQUEST_DURATION: &str = "gateway_request_duration_seconds";
pub const BACKEND_PROBLEM: &str = "gateway_backend_problem";
pub const REJECTED_TOTAL: &str = "gateway_rejected_requests_total";

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(address: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(address)
        .install()?;
    tracing::info!(address = %address, "Metrics endpoint started");
    Ok(())
}

/// Record a finished request.
pub fn record_request(pipeline: &str, status: u16, elapsed: Duration) {
    metrics::counter!(
        REQUESTS_TOTAL,
        "pipeline" => pipeline.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!(REQUEST_DURATION, "pipeline" => pipeline.to_string())
        .record(elapsed.as_secs_f64());
}

pub fn set_backend_problem(host: &str, problem: bool) {
    metrics::gauge!(BACKEND_PROBLEM, "host" => host.to_string()).set(if problem { 1.0 } else { 0.0 });
}

pub fn record_rejected(reason: &'static str) {
    metrics::counter!(REJECTED_TOTAL, "reason" => reason).increment(1);
}
