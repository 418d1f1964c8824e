//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method, status, host
//! - `proxy_request_duration_seconds` (histogram): time to response headers
//! - `proxy_certificate_lookups_total` (counter): cache lookups by result
//! - `proxy_certificate_issuance_total` (counter): provisioning attempts by outcome
//! - `proxy_certificate_issuance_duration_seconds` (histogram): provisioning latency
//! - `proxy_active_connections` (gauge): open TLS connections
//! - `proxy_tls_handshake_failures_total` (counter): failed handshakes by reason
//!
//! Recording is a no-op until [`init_metrics`] installs a recorder.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, host: &str, start: Instant) {
    let status = status.to_string();
    counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status,
        "host" => host.to_string()
    )
    .increment(1);
    histogram!(
        "proxy_request_duration_seconds",
        "method" => method.to_string(),
        "host" => host.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

/// `result` is one of hit, stale, wait, miss, failed, unknown.
pub fn record_certificate_lookup(result: &'static str) {
    counter!("proxy_certificate_lookups_total", "result" => result).increment(1);
}

pub fn record_issuance(outcome: &'static str, start: Instant) {
    counter!("proxy_certificate_issuance_total", "outcome" => outcome).increment(1);
    histogram!("proxy_certificate_issuance_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_active_connections(count: u64) {
    gauge!("proxy_active_connections").set(count as f64);
}

pub fn record_handshake_failure(reason: &'static str) {
    counter!("proxy_tls_handshake_failures_total", "reason" => reason).increment(1);
}
