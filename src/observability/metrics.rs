//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_requests_total` (counter): relays by `mode` and `outcome`
//!   (`delivered` or the error kind)
//! - `relay_duration_seconds` (histogram): relay latency by `mode`
//! - `relay_browser_sessions` (gauge): headless browsers currently open

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

/// Start the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one finished relay.
pub fn record_relay(mode: &'static str, outcome: &'static str, elapsed: Duration) {
    counter!("relay_requests_total", "mode" => mode, "outcome" => outcome).increment(1);
    histogram!("relay_duration_seconds", "mode" => mode).record(elapsed.as_secs_f64());
}

pub fn browser_opened() {
    gauge!("relay_browser_sessions").increment(1.0);
}

pub fn browser_closed() {
    gauge!("relay_browser_sessions").decrement(1.0);
}
