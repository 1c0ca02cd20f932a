//! Metrics collection and export for Roomcast.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use roomcast_core::RegistryStats;
use roomcast_transport::PumpSummary;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "roomcast_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "roomcast_connections_active";
    pub const JOINS_TOTAL: &str = "roomcast_joins_total";
    pub const MESSAGES_TOTAL: &str = "roomcast_messages_total";
    pub const ROOMS_ACTIVE: &str = "roomcast_rooms_active";
    pub const PEERS_ACTIVE: &str = "roomcast_peers_active";
    pub const STORE_OPERATIONS_TOTAL: &str = "roomcast_store_operations_total";
    pub const SESSION_DURATION_SECONDS: &str = "roomcast_session_duration_seconds";
    pub const ERRORS_TOTAL: &str = "roomcast_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of active connections"
    );
    metrics::describe_counter!(names::JOINS_TOTAL, "Total number of room joins");
    metrics::describe_counter!(
        names::MESSAGES_TOTAL,
        "Total number of messages by direction"
    );
    metrics::describe_gauge!(names::ROOMS_ACTIVE, "Current number of live rooms");
    metrics::describe_gauge!(names::PEERS_ACTIVE, "Current number of joined peers");
    metrics::describe_counter!(
        names::STORE_OPERATIONS_TOTAL,
        "Content store operations by kind and outcome"
    );
    metrics::describe_histogram!(
        names::SESSION_DURATION_SECONDS,
        "Time a WebSocket session stayed joined, in seconds"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{port}").parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a new connection.
pub fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

/// Record a disconnection.
pub fn record_disconnection() {
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a successful join.
pub fn record_join() {
    counter!(names::JOINS_TOTAL).increment(1);
}

/// Record the traffic of a finished connection.
pub fn record_pump(summary: &PumpSummary) {
    counter!(names::MESSAGES_TOTAL, "direction" => "inbound").increment(summary.inbound);
    counter!(names::MESSAGES_TOTAL, "direction" => "outbound").increment(summary.outbound);
    counter!(names::MESSAGES_TOTAL, "direction" => "rejected").increment(summary.rejected);
}

/// Record how long a session stayed joined.
pub fn record_session_duration(seconds: f64) {
    histogram!(names::SESSION_DURATION_SECONDS).record(seconds);
}

/// Update room and peer gauges.
pub fn set_registry_stats(stats: RegistryStats) {
    gauge!(names::ROOMS_ACTIVE).set(stats.room_count as f64);
    gauge!(names::PEERS_ACTIVE).set(stats.peer_count as f64);
}

/// Record a content store operation.
pub fn record_store_op(operation: &'static str, ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    counter!(
        names::STORE_OPERATIONS_TOTAL,
        "operation" => operation,
        "outcome" => outcome
    )
    .increment(1);
}

/// Record an error.
pub fn record_error(error_type: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type).increment(1);
}

/// Metrics guard that records disconnection on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        record_connection();
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        record_disconnection();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomcast_transport::CloseReason;

    #[test]
    fn test_recording_without_recorder() {
        // No recorder is installed in tests; every call must be a no-op.
        let _guard = ConnectionMetricsGuard::new();
        record_join();
        record_store_op("get", false);
        record_session_duration(0.5);
        record_pump(&PumpSummary {
            inbound: 1,
            rejected: 0,
            outbound: 2,
            reason: CloseReason::PeerClosed,
        });
        set_registry_stats(RegistryStats {
            room_count: 1,
            peer_count: 3,
        });
    }
}
