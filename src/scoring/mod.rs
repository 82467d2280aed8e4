//! # Scoring Capability
//! Pluggable sentiment/emotion scoring behind one trait, polymorphic over a
//! local lexicon variant and a remote LLM variant. The variant is chosen once
//! at construction; callers hold an `Arc<dyn ScoringModel>` and never branch.
//!
//! Contract: scoring never fails. Empty/blank input yields a deterministic
//! neutral result with zero confidence; over-long input is truncated, not
//! rejected; any internal failure (backend unreachable, malformed response)
//! degrades to a neutral result tagged `model_name = "fallback"`.

pub mod lexicon;
pub mod remote;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::{ScoringConfig, ScoringMode};

/// Longest text submitted to any model; the rest is cut, never rejected.
pub const MAX_SCORING_CHARS: usize = 512;

/// Model name reported when scoring degrades to the safe default.
pub const FALLBACK_MODEL: &str = "fallback";

/// Model name reported for empty/blank input (nothing was scored).
pub const EMPTY_INPUT_MODEL: &str = "none";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl SentimentLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Negative => "negative",
            SentimentLabel::Neutral => "neutral",
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sentiment verdict for one text. `confidence` is always within [0, 1];
/// the constructor clamps whatever a backend returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentScore {
    pub label: SentimentLabel,
    pub confidence: f64,
    pub model_name: String,
}

impl SentimentScore {
    pub fn new(label: SentimentLabel, confidence: f64, model_name: impl Into<String>) -> Self {
        Self {
            label,
            confidence: confidence.clamp(0.0, 1.0),
            model_name: model_name.into(),
        }
    }

    /// Deterministic result for empty/blank input.
    pub fn empty_input() -> Self {
        Self::new(SentimentLabel::Neutral, 0.0, EMPTY_INPUT_MODEL)
    }

    /// Safe default when a backend fails.
    pub fn fallback() -> Self {
        Self::new(SentimentLabel::Neutral, 0.0, FALLBACK_MODEL)
    }
}

/// Primary-emotion verdict for one text (joy, sadness, anger, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionScore {
    pub emotion: String,
    pub confidence: f64,
    pub model_name: String,
}

impl EmotionScore {
    pub fn new(emotion: impl Into<String>, confidence: f64, model_name: impl Into<String>) -> Self {
        Self {
            emotion: emotion.into(),
            confidence: confidence.clamp(0.0, 1.0),
            model_name: model_name.into(),
        }
    }

    pub fn fallback() -> Self {
        Self::new("neutral", 0.0, FALLBACK_MODEL)
    }
}

/// The consumed interface: both variants implement it, neither ever errors.
#[async_trait::async_trait]
pub trait ScoringModel: Send + Sync {
    async fn analyze_sentiment(&self, text: &str) -> SentimentScore;

    async fn analyze_emotion(&self, text: &str) -> EmotionScore;

    /// Batch form for throughput; order matches the input order.
    async fn analyze_batch(&self, texts: &[&str]) -> Vec<SentimentScore>;

    /// Variant name for diagnostics.
    fn name(&self) -> &'static str;
}

pub type SharedModel = Arc<dyn ScoringModel>;

/// Build the configured variant once at startup.
pub fn build_model(cfg: &ScoringConfig) -> SharedModel {
    match cfg.mode {
        ScoringMode::Local => Arc::new(lexicon::LexiconModel::new()),
        ScoringMode::Remote => Arc::new(remote::RemoteModel::from_config(cfg)),
    }
}

/// Cut `text` to [`MAX_SCORING_CHARS`] characters (char-aligned, so multibyte
/// input cannot split a code point).
pub fn truncate_for_model(text: &str) -> &str {
    match text.char_indices().nth(MAX_SCORING_CHARS) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Round to 4 decimal places, the precision persisted for confidences.
pub(crate) fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}
