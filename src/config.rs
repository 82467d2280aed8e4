//! Environment-driven configuration with parse-or-default semantics.
//! Every recognized option has a production default so a bare process starts.

use std::net::SocketAddr;
use std::str::FromStr;

/// Default chat-completions endpoint for the remote scoring variant.
const DEFAULT_API_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
const DEFAULT_REMOTE_MODEL: &str = "llama-3.1-8b-instant";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// When set, a Prometheus exporter is bound to this address.
    pub metrics_addr: Option<SocketAddr>,
    pub stream: StreamConfig,
    pub scoring: ScoringConfig,
    pub alert: AlertConfig,
}

#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub group: String,
    /// Consumer identity within the group; unique per worker process.
    pub consumer: String,
    pub batch_size: usize,
    pub block_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringMode {
    Local,
    Remote,
}

impl FromStr for ScoringMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(ScoringMode::Local),
            // The deployment historically called this variant "external".
            "remote" | "external" => Ok(ScoringMode::Remote),
            other => Err(format!("unknown scoring mode: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScoringConfig {
    pub mode: ScoringMode,
    pub api_url: String,
    pub api_key: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct AlertConfig {
    /// Negative/positive ratio above which (strictly) an alert fires.
    pub threshold: f64,
    pub window_minutes: i64,
    /// Windows with fewer analyses than this are skipped entirely.
    pub min_posts: usize,
    pub interval_secs: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            threshold: 2.0,
            window_minutes: 5,
            min_posts: 10,
            interval_secs: 60,
        }
    }
}

impl Config {
    /// Read everything from the environment. Unset or unparseable values
    /// fall back to defaults; nothing here can fail.
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://data/sentistream.db".to_string()),
            metrics_addr: std::env::var("METRICS_ADDR").ok().and_then(|v| v.parse().ok()),
            stream: StreamConfig {
                group: env_or("CONSUMER_GROUP", "sentiment_workers"),
                consumer: std::env::var("CONSUMER_NAME")
                    .unwrap_or_else(|_| format!("worker_{}", std::process::id())),
                batch_size: env_parse("WORKER_BATCH_SIZE", 10),
                block_ms: env_parse("STREAM_BLOCK_MS", 5_000),
            },
            scoring: ScoringConfig {
                mode: env_parse("SCORING_MODE", ScoringMode::Local),
                api_url: env_or("EXTERNAL_LLM_API_URL", DEFAULT_API_URL),
                api_key: env_or("EXTERNAL_LLM_API_KEY", ""),
                model: env_or("EXTERNAL_LLM_MODEL", DEFAULT_REMOTE_MODEL),
            },
            alert: AlertConfig {
                threshold: env_parse("ALERT_NEGATIVE_RATIO_THRESHOLD", 2.0),
                window_minutes: env_parse("ALERT_WINDOW_MINUTES", 5),
                min_posts: env_parse("ALERT_MIN_POSTS", 10),
                interval_secs: env_parse("ALERT_INTERVAL_SECS", 60),
            },
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
