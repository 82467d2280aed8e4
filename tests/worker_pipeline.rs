// tests/worker_pipeline.rs
//
// End-to-end worker tests over the real pieces: in-process append log,
// in-memory store, and the local lexicon model (deterministic, no network).

use std::sync::Arc;

use sentistream::config::StreamConfig;
use sentistream::scoring::lexicon::LexiconModel;
use sentistream::store::Store;
use sentistream::stream::{AppendLog, PostEvent, StartPosition};
use sentistream::worker::Worker;

const GROUP: &str = "sentiment_workers";

fn stream_cfg(consumer: &str) -> StreamConfig {
    StreamConfig {
        group: GROUP.to_string(),
        consumer: consumer.to_string(),
        batch_size: 10,
        block_ms: 50,
    }
}

async fn build_worker(consumer: &str) -> (Arc<AppendLog>, Store, Worker) {
    let log = Arc::new(AppendLog::new());
    log.create_group(GROUP, StartPosition::Beginning);
    let store = Store::memory().await.unwrap();
    let worker = Worker::new(
        Arc::clone(&log),
        store.clone(),
        Arc::new(LexiconModel::new()),
        stream_cfg(consumer),
    );
    (log, store, worker)
}

#[tokio::test]
async fn round_trip_produces_post_and_analysis() {
    let (log, store, worker) = build_worker("w1").await;
    log.append(
        PostEvent::new("p1", "x", "great", "a")
            .with_created_at("2026-08-01T10:00:00+00:00"),
    );

    let n = worker.poll_once().await.unwrap();
    assert_eq!(n, 1);

    let post = store.fetch_post("p1").await.unwrap().expect("post row");
    assert_eq!(post.source, "x");
    assert_eq!(post.content, "great");
    assert_eq!(post.created_at.to_rfc3339(), "2026-08-01T10:00:00+00:00");

    let analyses = store.analyses_for_post("p1").await.unwrap();
    assert_eq!(analyses.len(), 1);
    assert!(["positive", "negative", "neutral"].contains(&analyses[0].sentiment_label.as_str()));
    assert!(!analyses[0].model_name.is_empty());
    assert!((0.0..=1.0).contains(&analyses[0].confidence_score));

    // Commit happened, so the entry was acknowledged.
    assert_eq!(log.pending_count(GROUP).unwrap(), 0);
}

#[tokio::test]
async fn blank_content_is_dropped_without_blocking_siblings() {
    let (log, store, worker) = build_worker("w1").await;
    log.append(PostEvent::new("blank", "x", "   ", "a"));
    log.append(PostEvent::new("ok", "x", "what a wonderful day", "a"));

    worker.poll_once().await.unwrap();

    // The blank entry is acknowledged but produced nothing.
    assert_eq!(log.pending_count(GROUP).unwrap(), 0);
    assert!(store.fetch_post("blank").await.unwrap().is_none());
    assert!(store.analyses_for_post("blank").await.unwrap().is_empty());

    // Its sibling in the same batch went all the way through.
    assert!(store.fetch_post("ok").await.unwrap().is_some());
    assert_eq!(store.analyses_for_post("ok").await.unwrap().len(), 1);
}

#[tokio::test]
async fn redelivered_duplicates_merge_on_post_identity() {
    let (log, store, worker) = build_worker("w1").await;
    let ev = PostEvent::new("dup", "x", "this is terrible", "a");
    log.append(ev.clone());
    log.append(ev);

    worker.poll_once().await.unwrap();

    // One post, two analysis rows: idempotent on identity, duplicates of the
    // analysis are accepted.
    assert_eq!(store.post_count().await.unwrap(), 1);
    assert_eq!(store.analyses_for_post("dup").await.unwrap().len(), 2);
    assert_eq!(log.pending_count(GROUP).unwrap(), 0);
}

#[tokio::test]
async fn every_appended_entry_eventually_gets_an_analysis() {
    let (log, store, worker) = build_worker("w1").await;
    for i in 0..23 {
        log.append(PostEvent::new(
            format!("p{i}"),
            "x",
            format!("message number {i} is fine"),
            "a",
        ));
    }

    // Batch size is 10: three polls drain the backlog.
    let mut handled = 0;
    while handled < 23 {
        handled += worker.poll_once().await.unwrap();
    }

    assert_eq!(store.analysis_count().await.unwrap(), 23);
    assert_eq!(store.post_count().await.unwrap(), 23);
    assert_eq!(log.pending_count(GROUP).unwrap(), 0);
}

#[tokio::test]
async fn persistence_failure_leaves_entry_pending() {
    let (log, store, worker) = build_worker("w1").await;
    log.append(PostEvent::new("p1", "x", "decent text", "a"));

    // Kill the store before the worker runs: scoring succeeds, persistence
    // fails, the entry must stay pending for redelivery.
    store.close().await;
    worker.poll_once().await.unwrap();

    assert_eq!(log.pending_count(GROUP).unwrap(), 1);
    let pending = log.pending_entries(GROUP).unwrap();
    assert_eq!(pending[0].consumer, "w1");
}

#[tokio::test]
async fn unparseable_created_at_falls_back_to_arrival_time() {
    let (log, store, worker) = build_worker("w1").await;
    let before = chrono::Utc::now();
    log.append(PostEvent::new("p1", "x", "some text here", "a").with_created_at("garbage"));

    worker.poll_once().await.unwrap();

    let post = store.fetch_post("p1").await.unwrap().unwrap();
    assert!(post.created_at >= before);
    assert!(post.created_at <= chrono::Utc::now());
}

#[tokio::test]
async fn two_workers_split_one_group_without_overlap() {
    let log = Arc::new(AppendLog::new());
    log.create_group(GROUP, StartPosition::Beginning);
    let store = Store::memory().await.unwrap();
    let model: sentistream::SharedModel = Arc::new(LexiconModel::new());

    let mk = |name: &str| {
        let mut cfg = stream_cfg(name);
        cfg.batch_size = 5;
        Worker::new(Arc::clone(&log), store.clone(), Arc::clone(&model), cfg)
    };
    let w1 = mk("w1");
    let w2 = mk("w2");

    for i in 0..10 {
        log.append(PostEvent::new(
            format!("p{i}"),
            "x",
            format!("message {i} looks good"),
            "a",
        ));
    }

    // Each worker claims a disjoint half of the backlog.
    let (a, b) = tokio::join!(w1.poll_once(), w2.poll_once());
    assert_eq!(a.unwrap() + b.unwrap(), 10);

    assert_eq!(store.post_count().await.unwrap(), 10);
    assert_eq!(store.analysis_count().await.unwrap(), 10);
    assert_eq!(log.pending_count(GROUP).unwrap(), 0);
}
