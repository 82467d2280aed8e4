//! Local scoring variant: embedded lexicons, no I/O, fully deterministic.

use std::collections::{BTreeMap, HashMap};

use once_cell::sync::Lazy;

use super::{
    EmotionScore, ScoringModel, SentimentLabel, SentimentScore, round4, truncate_for_model,
};

const SENTIMENT_MODEL_NAME: &str = "lexicon-sentiment-v1";
const EMOTION_MODEL_NAME: &str = "lexicon-emotion-v1";

/// Texts shorter than this carry too little signal for emotion detection and
/// short-circuit to a neutral verdict.
const MIN_EMOTION_CHARS: usize = 10;
const STATIC_RULE_MODEL: &str = "static_rule";

/// Per-word scores are in [-3, 3]; used to normalize strength into [0, 1].
const WORD_SCORE_CAP: f64 = 3.0;

static SENTIMENT_LEXICON: Lazy<HashMap<String, i32>> = Lazy::new(|| {
    let raw = include_str!("../../assets/sentiment_lexicon.json");
    serde_json::from_str::<HashMap<String, i32>>(raw).expect("valid sentiment lexicon")
});

static EMOTION_LEXICON: Lazy<HashMap<String, String>> = Lazy::new(|| {
    let raw = include_str!("../../assets/emotion_lexicon.json");
    serde_json::from_str::<HashMap<String, String>>(raw).expect("valid emotion lexicon")
});

/// Lexicon-backed model: word scores with a short negation window for
/// sentiment, keyword voting for the primary emotion.
#[derive(Debug, Clone, Default)]
pub struct LexiconModel;

impl LexiconModel {
    pub fn new() -> Self {
        Self
    }

    /// Returns (summed score, number of lexicon hits). If a negator appears
    /// within the previous 1..=3 tokens, the word's score is inverted.
    fn score_text(&self, text: &str) -> (i32, usize) {
        let tokens: Vec<String> = tokenize(text).collect();
        let mut score: i32 = 0;
        let mut hits: usize = 0;

        for i in 0..tokens.len() {
            let base = *SENTIMENT_LEXICON.get(tokens[i].as_str()).unwrap_or(&0);
            if base == 0 {
                continue;
            }
            let negated = (1..=3).any(|k| i >= k && is_negator(tokens[i - k].as_str()));
            score += if negated { -base } else { base };
            hits += 1;
        }

        (score, hits)
    }
}

#[async_trait::async_trait]
impl ScoringModel for LexiconModel {
    async fn analyze_sentiment(&self, text: &str) -> SentimentScore {
        if text.trim().is_empty() {
            return SentimentScore::empty_input();
        }

        let (score, hits) = self.score_text(truncate_for_model(text));
        if hits == 0 || score == 0 {
            // No signal, or signal that cancels out.
            return SentimentScore::new(SentimentLabel::Neutral, 0.5, SENTIMENT_MODEL_NAME);
        }

        let label = if score > 0 {
            SentimentLabel::Positive
        } else {
            SentimentLabel::Negative
        };
        let strength = (score.unsigned_abs() as f64 / (hits as f64 * WORD_SCORE_CAP)).min(1.0);
        SentimentScore::new(label, round4(0.5 + 0.5 * strength), SENTIMENT_MODEL_NAME)
    }

    async fn analyze_emotion(&self, text: &str) -> EmotionScore {
        if text.trim().chars().count() < MIN_EMOTION_CHARS {
            return EmotionScore::new("neutral", 1.0, STATIC_RULE_MODEL);
        }

        // Vote: every lexicon keyword counts toward its emotion.
        let mut votes: BTreeMap<&str, usize> = BTreeMap::new();
        let mut total = 0usize;
        for token in tokenize(truncate_for_model(text)) {
            if let Some(emotion) = EMOTION_LEXICON.get(token.as_str()) {
                *votes.entry(emotion.as_str()).or_default() += 1;
                total += 1;
            }
        }

        if total == 0 {
            return EmotionScore::new("neutral", 0.5, EMOTION_MODEL_NAME);
        }

        // BTreeMap iteration plus a strict `>` keeps ties deterministic.
        let mut best = ("neutral", 0usize);
        for (&emotion, &count) in &votes {
            if count > best.1 {
                best = (emotion, count);
            }
        }
        EmotionScore::new(best.0, round4(best.1 as f64 / total as f64), EMOTION_MODEL_NAME)
    }

    async fn analyze_batch(&self, texts: &[&str]) -> Vec<SentimentScore> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.analyze_sentiment(text).await);
        }
        out
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

/// Alphanumeric tokens, lower-cased.
fn tokenize(s: &str) -> impl Iterator<Item = String> + '_ {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_ascii_lowercase())
}

// Bare stems like "isn"/"don" only occur when the tokenizer splits a
// contraction ("isn't" -> "isn", "t"), so they are safe to treat as negators.
fn is_negator(tok: &str) -> bool {
    matches!(
        tok,
        "not" | "no" | "never" | "cannot" | "without" | "isn" | "wasn" | "aren" | "won" | "don"
            | "didn" | "doesn"
    )
}
