//! # Stream-Consumer Worker
//! Pulls batches from the append log as one consumer in a competing-consumer
//! group, scores each entry, persists post + analysis in one transaction,
//! and acknowledges on commit.
//!
//! Per-entry state machine: received → validated → scored → persisted →
//! acknowledged. Blank content fails validation and is dropped-and-acked
//! (never retried). A persistence failure leaves the entry pending so the
//! log redelivers it. Delivery is at-least-once, so the write path is
//! idempotent on post identity and tolerant of duplicate analysis rows.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metrics::{counter, gauge};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::StreamConfig;
use crate::scoring::{truncate_for_model, SharedModel};
use crate::store::{NewPost, Store};
use crate::stream::{AppendLog, EntryId, PostEvent};

/// Pause after a log/loop level error before polling again.
const LOOP_BACKOFF: Duration = Duration::from_secs(2);

/// What happened to one entry; failures stay pending in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOutcome {
    Persisted,
    Dropped,
    Failed,
}

#[derive(Clone)]
pub struct Worker {
    log: Arc<AppendLog>,
    store: Store,
    model: SharedModel,
    cfg: StreamConfig,
}

impl Worker {
    pub fn new(log: Arc<AppendLog>, store: Store, model: SharedModel, cfg: StreamConfig) -> Self {
        Self { log, store, model, cfg }
    }

    /// Long-lived consume loop. The blocking read is raced against the
    /// shutdown signal; a batch already handed out is always drained before
    /// the loop exits, so shutdown never abandons claimed entries mid-flight.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            group = %self.cfg.group,
            consumer = %self.cfg.consumer,
            batch_size = self.cfg.batch_size,
            "worker started"
        );
        loop {
            let batch = tokio::select! {
                _ = shutdown.changed() => break,
                read = self.log.read_batch(
                    &self.cfg.group,
                    &self.cfg.consumer,
                    self.cfg.batch_size,
                    Duration::from_millis(self.cfg.block_ms),
                ) => match read {
                    Ok(batch) => batch,
                    Err(e) => {
                        error!(error = ?e, "worker read failed");
                        tokio::time::sleep(LOOP_BACKOFF).await;
                        continue;
                    }
                },
            };
            if batch.is_empty() {
                continue;
            }
            self.process_batch(batch).await;
            if let Ok(pending) = self.log.pending_count(&self.cfg.group) {
                gauge!("stream_pending").set(pending as f64);
            }
        }
        info!(consumer = %self.cfg.consumer, "worker stopped");
    }

    /// One read-and-process cycle; returns how many entries were handled.
    /// Exposed so tests (and embedders) can drive the worker without the
    /// perpetual loop.
    pub async fn poll_once(&self) -> anyhow::Result<usize> {
        let batch = self
            .log
            .read_batch(
                &self.cfg.group,
                &self.cfg.consumer,
                self.cfg.batch_size,
                Duration::from_millis(self.cfg.block_ms),
            )
            .await?;
        let n = batch.len();
        self.process_batch(batch).await;
        Ok(n)
    }

    /// Fan a batch out with one independent task (and one independent
    /// persistence transaction) per entry, so a failing entry never blocks
    /// or rolls back its siblings.
    async fn process_batch(&self, batch: Vec<(EntryId, PostEvent)>) {
        let mut tasks = JoinSet::new();
        for (id, event) in batch {
            let worker = self.clone();
            tasks.spawn(async move { worker.process_entry(id, event).await });
        }
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(EntryOutcome::Persisted) => counter!("worker_processed_total").increment(1),
                Ok(EntryOutcome::Dropped) => counter!("worker_dropped_total").increment(1),
                Ok(EntryOutcome::Failed) => counter!("worker_failed_total").increment(1),
                Err(e) => error!(error = ?e, "entry task panicked"),
            }
        }
    }

    async fn process_entry(&self, id: EntryId, event: PostEvent) -> EntryOutcome {
        // Validation: blank content is dropped and acknowledged, not retried.
        if event.content.trim().is_empty() {
            warn!(entry = %id, post_id = %event.post_id, "dropping entry with empty content");
            if let Err(e) = self.log.ack(&self.cfg.group, id) {
                error!(entry = %id, error = ?e, "ack after drop failed");
            }
            return EntryOutcome::Dropped;
        }

        // Sentiment and emotion are independent; score them concurrently.
        // The capability contract guarantees neither call can fail.
        let text = truncate_for_model(&event.content);
        let (sentiment, emotion) = tokio::join!(
            self.model.analyze_sentiment(text),
            self.model.analyze_emotion(text)
        );

        let post = NewPost::from_event(&event, Utc::now());
        match self.store.record_analysis(&post, &sentiment, &emotion).await {
            Ok(_) => {
                if let Err(e) = self.log.ack(&self.cfg.group, id) {
                    error!(entry = %id, error = ?e, "ack after commit failed");
                }
                info!(
                    post_id = %event.post_id,
                    label = %sentiment.label,
                    emotion = %emotion.emotion,
                    "analysis persisted"
                );
                EntryOutcome::Persisted
            }
            Err(e) => {
                // Transient store trouble: leave the entry pending and let
                // redelivery retry it.
                error!(
                    entry = %id,
                    post_id = %event.post_id,
                    error = ?e,
                    "persist failed, leaving entry pending"
                );
                EntryOutcome::Failed
            }
        }
    }
}
