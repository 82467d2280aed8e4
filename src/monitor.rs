//! # Alerting Engine
//! Periodic, stateless threshold monitor over a trailing time window. Each
//! tick counts sentiment labels for posts whose event time falls inside the
//! window, compares the negative/positive ratio against the configured
//! threshold, and persists an alert when it is strictly exceeded.
//!
//! There is no cooldown: a spike that persists re-triggers on every tick.
//! The evaluation core is pure so the boundary cases are unit-testable
//! without a store.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use metrics::counter;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::AlertConfig;
use crate::store::{AlertDraft, Store};

pub const ALERT_TYPE_NEGATIVE_RATIO: &str = "high_negative_ratio";

/// Guards the ratio against division by zero when the window has no
/// positive samples.
const POSITIVE_FLOOR: f64 = 0.1;

/// Per-label tallies for one window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowCounts {
    pub positive: usize,
    pub negative: usize,
    pub neutral: usize,
}

impl WindowCounts {
    pub fn total(&self) -> usize {
        self.positive + self.negative + self.neutral
    }

    /// Tally raw labels; classification is case-insensitive and
    /// substring-based so model-specific spellings ("POSITIVE", "LABEL_0
    /// negative") still land in a bucket.
    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut counts = Self::default();
        for label in labels {
            let lower = label.as_ref().to_ascii_lowercase();
            if lower.contains("pos") {
                counts.positive += 1;
            } else if lower.contains("neg") {
                counts.negative += 1;
            } else {
                counts.neutral += 1;
            }
        }
        counts
    }

    /// `negative / max(positive, 0.1)`.
    pub fn negative_ratio(&self) -> f64 {
        self.negative as f64 / (self.positive as f64).max(POSITIVE_FLOOR)
    }

    fn details(&self) -> serde_json::Value {
        serde_json::json!({
            "positive_count": self.positive,
            "negative_count": self.negative,
            "neutral_count": self.neutral,
            "total_count": self.total(),
        })
    }
}

/// Pure trigger decision for one window. `None` means no alert: either too
/// few samples for evidence, or the ratio did not strictly exceed the
/// threshold.
pub fn evaluate(
    counts: &WindowCounts,
    cfg: &AlertConfig,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Option<AlertDraft> {
    if counts.total() < cfg.min_posts {
        return None;
    }
    let ratio = counts.negative_ratio();
    if ratio <= cfg.threshold {
        return None;
    }
    Some(AlertDraft {
        alert_type: ALERT_TYPE_NEGATIVE_RATIO.to_string(),
        threshold_value: cfg.threshold,
        actual_value: round2(ratio),
        window_minutes: cfg.window_minutes,
        window_start,
        window_end,
        post_count: counts.total() as i64,
        details: counts.details(),
    })
}

pub struct AlertMonitor {
    store: Store,
    cfg: AlertConfig,
}

impl AlertMonitor {
    pub fn new(store: Store, cfg: AlertConfig) -> Self {
        Self { store, cfg }
    }

    /// Query the trailing window and decide; no side effects.
    pub async fn check_thresholds(&self) -> anyhow::Result<Option<AlertDraft>> {
        let window_end = Utc::now();
        let window_start = window_end - ChronoDuration::minutes(self.cfg.window_minutes);
        let labels = self
            .store
            .sentiment_labels_in_window(window_start, window_end)
            .await?;
        let counts = WindowCounts::from_labels(&labels);
        if counts.total() < self.cfg.min_posts {
            debug!(
                total = counts.total(),
                min_posts = self.cfg.min_posts,
                "window below minimum sample size, skipping"
            );
            return Ok(None);
        }
        Ok(evaluate(&counts, &self.cfg, window_start, window_end))
    }

    /// One evaluation tick. Persistence failures are logged and swallowed;
    /// the analyses stay intact and the next tick recomputes the window.
    pub async fn tick(&self) {
        counter!("alert_ticks_total").increment(1);
        match self.check_thresholds().await {
            Ok(Some(draft)) => match self.store.insert_alert(&draft).await {
                Ok(id) => {
                    counter!("alerts_triggered_total").increment(1);
                    warn!(
                        alert_id = id,
                        ratio = draft.actual_value,
                        threshold = draft.threshold_value,
                        post_count = draft.post_count,
                        "negative sentiment alert triggered"
                    );
                }
                Err(e) => error!(error = ?e, "failed to persist alert"),
            },
            Ok(None) => debug!("no alert this tick"),
            Err(e) => error!(error = ?e, "alert evaluation failed"),
        }
    }

    /// Interval loop, independent of the worker's scheduling. The tick body
    /// runs outside the select so shutdown cannot cancel a half-done
    /// evaluation.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            window_minutes = self.cfg.window_minutes,
            threshold = self.cfg.threshold,
            interval_secs = self.cfg.interval_secs,
            "alert monitor started"
        );
        let mut ticker =
            tokio::time::interval(std::time::Duration::from_secs(self.cfg.interval_secs));
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
            }
            self.tick().await;
        }
        info!("alert monitor stopped");
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> AlertConfig {
        AlertConfig::default()
    }

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        let end = Utc::now();
        (end - ChronoDuration::minutes(5), end)
    }

    #[test]
    fn classification_is_case_insensitive_substring() {
        let counts = WindowCounts::from_labels(["POSITIVE", "Negative", "neutral", "joy", "neg"]);
        assert_eq!(
            counts,
            WindowCounts { positive: 1, negative: 2, neutral: 2 }
        );
    }

    #[test]
    fn nine_negative_against_three_positive_triggers() {
        let counts = WindowCounts { positive: 3, negative: 9, neutral: 1 };
        let (start, end) = window();
        let draft = evaluate(&counts, &cfg(), start, end).expect("should trigger");
        assert_eq!(draft.actual_value, 3.0);
        assert_eq!(draft.post_count, 13);
        assert_eq!(draft.alert_type, ALERT_TYPE_NEGATIVE_RATIO);
        assert_eq!(draft.details["total_count"], 13);
    }

    #[test]
    fn too_few_samples_never_trigger() {
        // Extreme ratio, but only 4 samples.
        let counts = WindowCounts { positive: 0, negative: 4, neutral: 0 };
        let (start, end) = window();
        assert!(evaluate(&counts, &cfg(), start, end).is_none());
    }

    #[test]
    fn ratio_exactly_at_threshold_does_not_trigger() {
        // 6 / 3 = 2.0 with threshold 2.0: strict inequality required.
        let counts = WindowCounts { positive: 3, negative: 6, neutral: 1 };
        let (start, end) = window();
        assert!(evaluate(&counts, &cfg(), start, end).is_none());
    }

    #[test]
    fn zero_positive_uses_the_floor() {
        let counts = WindowCounts { positive: 0, negative: 10, neutral: 0 };
        assert_eq!(counts.negative_ratio(), 100.0);
        let (start, end) = window();
        assert!(evaluate(&counts, &cfg(), start, end).is_some());
    }
}
