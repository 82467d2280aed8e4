// tests/pipeline_run.rs
//
// Drives the real `run` loops (worker + alert monitor) with the watch-based
// shutdown signal: entries appended while the loops are live get processed,
// and both loops drain and stop when signalled.

use std::sync::Arc;
use std::time::Duration;

use sentistream::config::{AlertConfig, StreamConfig};
use sentistream::monitor::AlertMonitor;
use sentistream::scoring::lexicon::LexiconModel;
use sentistream::store::Store;
use sentistream::stream::{AppendLog, PostEvent, StartPosition};
use sentistream::worker::Worker;
use tokio::sync::watch;

const GROUP: &str = "sentiment_workers";

#[tokio::test]
async fn loops_process_live_traffic_and_stop_on_signal() {
    let log = Arc::new(AppendLog::new());
    log.create_group(GROUP, StartPosition::Beginning);
    let store = Store::memory().await.unwrap();

    let worker = Worker::new(
        Arc::clone(&log),
        store.clone(),
        Arc::new(LexiconModel::new()),
        StreamConfig {
            group: GROUP.to_string(),
            consumer: "w1".to_string(),
            batch_size: 10,
            block_ms: 100,
        },
    );
    let monitor = AlertMonitor::new(
        store.clone(),
        AlertConfig { interval_secs: 1, ..AlertConfig::default() },
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker_rx = shutdown_rx.clone();
    let worker_handle = tokio::spawn(async move { worker.run(worker_rx).await });
    let monitor_handle = tokio::spawn(async move { monitor.run(shutdown_rx).await });

    // Traffic arrives while the loops are already blocked on reads/ticks.
    for i in 0..5 {
        log.append(PostEvent::new(
            format!("live{i}"),
            "x",
            format!("live message {i} is great"),
            "a",
        ));
    }

    // Oversized content must flow through truncation, not be rejected.
    log.append(PostEvent::new(
        "huge",
        "x",
        "terrible awful broken ".repeat(200),
        "a",
    ));

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if store.analysis_count().await.unwrap() >= 6 {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "worker did not process appended entries in time"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let huge = store.analyses_for_post("huge").await.unwrap();
    assert_eq!(huge.len(), 1);
    assert!((0.0..=1.0).contains(&huge[0].confidence_score));
    assert_eq!(huge[0].sentiment_label, "negative");

    // Signal shutdown; both tasks must come home.
    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), worker_handle)
        .await
        .expect("worker loop should stop on shutdown")
        .unwrap();
    tokio::time::timeout(Duration::from_secs(5), monitor_handle)
        .await
        .expect("monitor loop should stop on shutdown")
        .unwrap();

    assert_eq!(log.pending_count(GROUP).unwrap(), 0);
}
