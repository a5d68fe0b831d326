//! Metrics collection and exposition.
//!
//! # Metrics
//! - `mock_requests_total` (counter): requests by service, method, status
//! - `mock_request_duration_seconds` (histogram): latency incl. injected delay
//! - `mock_reloads_total` (counter): reloads by kind and outcome
//! - `mock_running_services` (gauge): size of the fleet

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(service: &str, method: &str, status: u16, start: Instant) {
    counter!(
        "mock_requests_total",
        "service" => service.to_string(),
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!(
        "mock_request_duration_seconds",
        "service" => service.to_string(),
        "method" => method.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn record_reload(kind: &'static str, success: bool) {
    let outcome = if success { "success" } else { "failure" };
    counter!("mock_reloads_total", "kind" => kind, "outcome" => outcome).increment(1);
}

pub fn set_running_services(count: usize) {
    gauge!("mock_running_services").set(count as f64);
}
