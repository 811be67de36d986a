//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method and status
//! - `gateway_request_duration_seconds` (histogram): latency by method
//! - `gateway_worker_dispatch_total` (counter): calls moved to the worker pool
//! - `gateway_body_rejected_total` (counter): request bodies over the size cap
//! - `gateway_buffer_pool_available` (gauge): free buffers in the pool

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    metrics::counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("gateway_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_worker_dispatch() {
    metrics::counter!("gateway_worker_dispatch_total").increment(1);
}

pub fn record_body_rejected() {
    metrics::counter!("gateway_body_rejected_total").increment(1);
}

pub fn record_buffer_pool_available(available: usize) {
    metrics::gauge!("gateway_buffer_pool_available").set(available as f64);
}
