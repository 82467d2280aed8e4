//! Metrics registration and optional Prometheus exposition.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on the exporter).
pub fn ensure_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "worker_processed_total",
            "Entries scored, persisted, and acknowledged."
        );
        describe_counter!(
            "worker_dropped_total",
            "Entries dropped (and acknowledged) by validation."
        );
        describe_counter!(
            "worker_failed_total",
            "Entries left pending after a persistence failure."
        );
        describe_counter!("alert_ticks_total", "Alerting engine evaluation ticks.");
        describe_counter!("alerts_triggered_total", "Alerts persisted.");
        describe_gauge!("stream_pending", "Delivered-but-unacknowledged entries.");
    });
}

/// Install the Prometheus recorder with its own HTTP listener on `addr`.
/// The process has no other web surface, so the exporter serves `/metrics`
/// itself.
pub fn install_exporter(addr: SocketAddr) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("installing prometheus exporter")?;
    Ok(())
}
