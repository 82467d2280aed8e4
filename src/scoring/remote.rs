//! Remote scoring variant: an OpenAI-compatible chat-completions backend.
//! Every failure path (missing key, transport error, non-2xx, malformed
//! JSON) collapses into the fallback result; the worker never sees an error.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{
    EmotionScore, ScoringModel, SentimentLabel, SentimentScore, truncate_for_model,
};
use crate::config::ScoringConfig;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(4);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct RemoteModel {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Clone, Copy)]
enum Task {
    Sentiment,
    Emotion,
}

impl Task {
    fn as_str(&self) -> &'static str {
        match self {
            Task::Sentiment => "sentiment",
            Task::Emotion => "emotion",
        }
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    response_format: serde_json::Value,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

/// The JSON object the prompt asks the backend to emit.
#[derive(Deserialize)]
struct LabeledVerdict {
    label: Option<String>,
    confidence: Option<f64>,
}

impl RemoteModel {
    pub fn from_config(cfg: &ScoringConfig) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("sentistream/0.1")
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client");
        Self {
            http,
            api_url: cfg.api_url.clone(),
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
        }
    }

    /// One round-trip to the backend; `None` means "use the fallback".
    async fn fetch_verdict(&self, text: &str, task: Task) -> Option<LabeledVerdict> {
        if self.api_key.is_empty() {
            return None;
        }

        let prompt = format!(
            "Analyze the following text and return ONLY a JSON object with \
             'label' and 'confidence' (0-1). Task: {}. Text: {}",
            task.as_str(),
            truncate_for_model(text)
        );
        let req = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage { role: "user", content: &prompt }],
            response_format: serde_json::json!({ "type": "json_object" }),
            temperature: 0.1,
        };

        let resp = match self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(error = ?e, task = task.as_str(), "remote scoring request failed");
                return None;
            }
        };
        if !resp.status().is_success() {
            warn!(status = %resp.status(), task = task.as_str(), "remote scoring backend rejected request");
            return None;
        }

        let body: ChatResponse = resp.json().await.ok()?;
        let content = body.choices.first().map(|c| c.message.content.as_str())?;
        serde_json::from_str::<LabeledVerdict>(content).ok()
    }
}

#[async_trait::async_trait]
impl ScoringModel for RemoteModel {
    async fn analyze_sentiment(&self, text: &str) -> SentimentScore {
        if text.trim().is_empty() {
            return SentimentScore::empty_input();
        }
        match self.fetch_verdict(text, Task::Sentiment).await {
            Some(v) => {
                let label = map_sentiment_label(v.label.as_deref().unwrap_or("neutral"));
                SentimentScore::new(label, v.confidence.unwrap_or(0.5), self.model.clone())
            }
            None => SentimentScore::fallback(),
        }
    }

    async fn analyze_emotion(&self, text: &str) -> EmotionScore {
        if text.trim().is_empty() {
            return EmotionScore::new("neutral", 0.0, super::EMPTY_INPUT_MODEL);
        }
        match self.fetch_verdict(text, Task::Emotion).await {
            Some(v) => {
                let emotion = v.label.unwrap_or_else(|| "neutral".to_string()).to_lowercase();
                EmotionScore::new(emotion, v.confidence.unwrap_or(0.5), self.model.clone())
            }
            None => EmotionScore::fallback(),
        }
    }

    async fn analyze_batch(&self, texts: &[&str]) -> Vec<SentimentScore> {
        // Concurrent round-trips; the backend is the throughput bottleneck.
        futures::future::join_all(texts.iter().map(|t| self.analyze_sentiment(t))).await
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}

fn map_sentiment_label(raw: &str) -> SentimentLabel {
    let lower = raw.to_ascii_lowercase();
    if lower.contains("pos") {
        SentimentLabel::Positive
    } else if lower.contains("neg") {
        SentimentLabel::Negative
    } else {
        SentimentLabel::Neutral
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ScoringConfig, ScoringMode};
    use crate::scoring::FALLBACK_MODEL;

    fn cfg(api_url: &str, api_key: &str) -> ScoringConfig {
        ScoringConfig {
            mode: ScoringMode::Remote,
            api_url: api_url.to_string(),
            api_key: api_key.to_string(),
            model: "test-model".to_string(),
        }
    }

    #[test]
    fn label_mapping_is_substring_based() {
        assert_eq!(map_sentiment_label("POSITIVE"), SentimentLabel::Positive);
        assert_eq!(map_sentiment_label("very negative"), SentimentLabel::Negative);
        assert_eq!(map_sentiment_label("mixed"), SentimentLabel::Neutral);
    }

    #[tokio::test]
    async fn missing_api_key_degrades_to_fallback() {
        let model = RemoteModel::from_config(&cfg("http://127.0.0.1:1/v1/chat", ""));
        let s = model.analyze_sentiment("some text").await;
        assert_eq!(s.label, SentimentLabel::Neutral);
        assert_eq!(s.confidence, 0.0);
        assert_eq!(s.model_name, FALLBACK_MODEL);
    }

    #[tokio::test]
    async fn unreachable_backend_degrades_to_fallback() {
        // Port 1 refuses connections immediately; no external network needed.
        let model = RemoteModel::from_config(&cfg("http://127.0.0.1:1/v1/chat", "key"));
        let s = model.analyze_sentiment("some text").await;
        assert_eq!(s.model_name, FALLBACK_MODEL);

        let e = model.analyze_emotion("some text").await;
        assert_eq!(e.model_name, FALLBACK_MODEL);
        assert_eq!(e.emotion, "neutral");
    }

    #[tokio::test]
    async fn empty_input_short_circuits_without_network() {
        let model = RemoteModel::from_config(&cfg("http://127.0.0.1:1/v1/chat", "key"));
        let s = model.analyze_sentiment("   ").await;
        assert_eq!(s, SentimentScore::empty_input());
    }
}
