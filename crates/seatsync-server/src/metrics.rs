//! Metrics collection and export.
//!
//! Uses the `metrics` crate for instrumentation and exports to Prometheus
//! format.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "seatsync_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "seatsync_connections_active";
    pub const EVENTS_TOTAL: &str = "seatsync_events_total";
    pub const EMISSIONS_TOTAL: &str = "seatsync_emissions_total";
    pub const REJECTIONS_TOTAL: &str = "seatsync_rejections_total";
    pub const MATCHES_ACTIVE: &str = "seatsync_matches_active";
    pub const SEATS_OCCUPIED: &str = "seatsync_seats_occupied";
    pub const HANDLER_SECONDS: &str = "seatsync_handler_seconds";
    pub const ERRORS_TOTAL: &str = "seatsync_errors_total";
}

/// Describe all metrics.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of active connections"
    );
    metrics::describe_counter!(names::EVENTS_TOTAL, "Inbound events handled, by kind");
    metrics::describe_counter!(names::EMISSIONS_TOTAL, "Outbound emissions, by event");
    metrics::describe_counter!(names::REJECTIONS_TOTAL, "Rejected events, by reason");
    metrics::describe_gauge!(names::MATCHES_ACTIVE, "Matches with at least one group member");
    metrics::describe_gauge!(names::SEATS_OCCUPIED, "Seats currently held by a connection");
    metrics::describe_histogram!(names::HANDLER_SECONDS, "Event handling latency in seconds");
    metrics::describe_counter!(names::ERRORS_TOTAL, "Transport errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the exporter cannot be installed.
pub fn start_metrics_server(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record an inbound event.
pub fn record_event(kind: &'static str) {
    counter!(names::EVENTS_TOTAL, "kind" => kind).increment(1);
}

/// Record an outbound emission.
pub fn record_emission(event: &str) {
    counter!(names::EMISSIONS_TOTAL, "event" => event.to_string()).increment(1);
}

/// Record a rejected event.
pub fn record_rejection(reason: &'static str) {
    counter!(names::REJECTIONS_TOTAL, "reason" => reason).increment(1);
}

/// Record event handling latency.
pub fn record_latency(seconds: f64) {
    histogram!(names::HANDLER_SECONDS).record(seconds);
}

/// Update membership gauges.
pub fn set_membership(matches: usize, seats: usize) {
    gauge!(names::MATCHES_ACTIVE).set(matches as f64);
    gauge!(names::SEATS_OCCUPIED).set(seats as f64);
}

/// Record a transport error.
pub fn record_error(error_type: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type).increment(1);
}

/// Counts a connection while alive.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Record a new connection.
    #[must_use]
    pub fn new() -> Self {
        counter!(names::CONNECTIONS_TOTAL).increment(1);
        gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
        Self
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
    }
}
