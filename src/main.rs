//! Pipeline daemon entrypoint: wires the append log, the store, the scoring
//! model, and the two long-lived loops (worker + alert monitor), then waits
//! for ctrl-c and drains.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sentistream::{
    build_model, metrics, AlertMonitor, AppendLog, Config, StartPosition, Store, Worker,
};

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sentistream=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = Config::from_env();
    metrics::ensure_described();
    if let Some(addr) = cfg.metrics_addr {
        metrics::install_exporter(addr)?;
        info!(%addr, "prometheus exporter listening");
    }

    // Explicit handles built once at startup and passed into both loops;
    // they share nothing but the store.
    let store = Store::connect(&cfg.database_url).await?;
    store.init_schema().await?;

    let log = Arc::new(AppendLog::new());
    log.create_group(&cfg.stream.group, StartPosition::Beginning);

    let model = build_model(&cfg.scoring);
    info!(variant = model.name(), "scoring model ready");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker = Worker::new(Arc::clone(&log), store.clone(), model, cfg.stream.clone());
    let worker_rx = shutdown_rx.clone();
    let worker_handle = tokio::spawn(async move { worker.run(worker_rx).await });

    let monitor = AlertMonitor::new(store.clone(), cfg.alert.clone());
    let monitor_handle = tokio::spawn(async move { monitor.run(shutdown_rx).await });

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, draining");
    let _ = shutdown_tx.send(true);
    let _ = worker_handle.await;
    let _ = monitor_handle.await;
    info!("pipeline stopped");

    Ok(())
}
