//! Metrics collection and exposition.
//!
//! # Metrics
//! - `yt_proxy_requests_total` (counter): requests by command, status
//! - `yt_proxy_request_duration_seconds` (histogram): time to response headers
//! - `yt_proxy_admission_total` (counter): admission decisions by band
//! - `yt_proxy_memory_pressure_bytes` (gauge): latest watcher sample
//! - `yt_proxy_bytes_in_total` (counter): request body bytes read by the driver, by command
//! - `yt_proxy_bytes_out_total` (counter): response bytes by command
//! - `yt_proxy_cancellations_total` (counter): commands cancelled by the client
//!
//! Recording goes through the `metrics` facade and is a no-op until an
//! exporter is installed.
//!
//! The `command` label only carries names the driver accepted; anything
//! rejected before that is [`UNKNOWN_COMMAND`].

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::admission::Admission;

/// `command` label for requests that never reached an accepting driver.
pub const UNKNOWN_COMMAND: &str = "unknown";

/// Install the Prometheus exporter with its own HTTP listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(command: &str, status: u16, start: Instant) {
    counter!(
        "yt_proxy_requests_total",
        "command" => command.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("yt_proxy_request_duration_seconds", "command" => command.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_admission(band: Admission) {
    counter!("yt_proxy_admission_total", "band" => band.as_str()).increment(1);
}

pub fn record_pressure(bytes: u64) {
    gauge!("yt_proxy_memory_pressure_bytes").set(bytes as f64);
}

pub fn record_bytes_in(command: &str, bytes: u64) {
    counter!("yt_proxy_bytes_in_total", "command" => command.to_string()).increment(bytes);
}

pub fn record_bytes_out(command: &str, bytes: u64) {
    counter!("yt_proxy_bytes_out_total", "command" => command.to_string()).increment(bytes);
}

pub fn record_cancellation() {
    counter!("yt_proxy_cancellations_total").increment(1);
}
