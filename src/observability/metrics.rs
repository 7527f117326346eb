//! Metrics collection and exposition.
//!
//! # Metrics
//! - `trellis_requests_total` (counter): dispatched requests by disposition, status
//! - `trellis_request_duration_seconds` (histogram): dispatch latency
//! - `trellis_handler_failures_total` (counter): failed handler attempts by kind
//! - `trellis_sessions_active` (gauge): stored sessions
//! - `trellis_sessions_reaped_total` (counter): sessions removed by expiry
//! - `trellis_open_sockets` (gauge): registered WebSocket bridges
//! - `trellis_frames_total` (counter): inbound frames by kind
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - The Prometheus exporter is optional and owns its own listener

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter on `addr`. Must run inside a tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => {
            describe();
            tracing::info!(address = %addr, "Metrics exporter listening");
        }
        Err(err) => {
            tracing::error!(address = %addr, error = %err, "Failed to install metrics exporter");
        }
    }
}

fn describe() {
    describe_counter!("trellis_requests_total", Unit::Count, "Dispatched requests");
    describe_histogram!(
        "trellis_request_duration_seconds",
        Unit::Seconds,
        "Time spent dispatching a request"
    );
    describe_counter!("trellis_handler_failures_total", Unit::Count, "Failed handler attempts");
    describe_gauge!("trellis_sessions_active", Unit::Count, "Stored sessions");
    describe_counter!("trellis_sessions_reaped_total", Unit::Count, "Sessions removed by expiry");
    describe_gauge!("trellis_open_sockets", Unit::Count, "Open WebSocket connections");
    describe_counter!("trellis_frames_total", Unit::Count, "Inbound WebSocket frames");
}

/// Record one dispatched request.
pub fn record_request(disposition: &'static str, status: u16, started: Instant) {
    counter!(
        "trellis_requests_total",
        "disposition" => disposition,
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("trellis_request_duration_seconds").record(started.elapsed().as_secs_f64());
}

pub fn record_handler_failure(kind: &'static str) {
    counter!("trellis_handler_failures_total", "kind" => kind).increment(1);
}

pub fn set_sessions_active(count: usize) {
    gauge!("trellis_sessions_active").set(count as f64);
}

pub fn record_sessions_reaped(count: usize) {
    counter!("trellis_sessions_reaped_total").increment(count as u64);
}

pub fn set_open_sockets(count: usize) {
    gauge!("trellis_open_sockets").set(count as f64);
}

pub fn record_frame(kind: &'static str) {
    counter!("trellis_frames_total", "kind" => kind).increment(1);
}
