//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define authorization metrics
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `auth_requests_total` (counter): decisions by host, status
//! - `blocked_ips_total` (counter): clients newly blocked, by ip
//! - `auth_backend_failures_total` (counter): backend errors, by backend
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so library code and
//!   tests call these freely
//! - The exporter runs its own listener, separate from decision traffic

use metrics::counter;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

pub const AUTH_REQUESTS_TOTAL: &str = "auth_requests_total";
pub const BLOCKED_IPS_TOTAL: &str = "blocked_ips_total";
pub const AUTH_BACKEND_FAILURES_TOTAL: &str = "auth_backend_failures_total";

/// Install the Prometheus recorder and start its HTTP listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Count a decision.
pub fn record_auth_request(host: &str, status: u16) {
    counter!(
        AUTH_REQUESTS_TOTAL,
        "host" => host.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Count a client that just crossed the failure threshold.
pub fn record_blocked_ip(ip: &str) {
    counter!(BLOCKED_IPS_TOTAL, "ip" => ip.to_string()).increment(1);
}

/// Count a backend that errored instead of answering.
pub fn record_backend_failure(backend: &str) {
    counter!(AUTH_BACKEND_FAILURES_TOTAL, "backend" => backend.to_string()).increment(1);
}
