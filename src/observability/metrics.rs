//! Metrics collection and exposition.
//!
//! # Metrics
//! - `termination_requests_total` (counter): SIGINT/SIGTERM received, by signal
//! - `worker_units_total` (counter): units executed, by result (ok, error, panic)
//! - `workers_live` (gauge): registered workers that have not exited
//! - `service_connections_active` (gauge): open service connections
//! - `service_requests_in_flight` (gauge): requests being served
//! - `shutdown_total` (counter): completed shutdowns, by outcome (clean, forced)
//!
//! # Design Decisions
//! - Recording is always on; without an installed recorder it is a no-op
//! - The Prometheus endpoint is optional and off by default

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and serve it on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    describe();
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

fn describe() {
    metrics::describe_counter!(
        "termination_requests_total",
        "Termination requests received from the operating system"
    );
    metrics::describe_counter!("worker_units_total", "Work units executed by workers");
    metrics::describe_gauge!("workers_live", "Workers registered and not yet exited");
    metrics::describe_gauge!("service_connections_active", "Open listening service connections");
    metrics::describe_gauge!("service_requests_in_flight", "Requests being served by the listening service");
    metrics::describe_counter!("shutdown_total", "Shutdowns completed, by outcome");
}
