// src/store/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;

use crate::stream::PostEvent;

/// A post as stored; immutable after first write except `ingested_at`.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct PostRecord {
    pub id: i64,
    pub post_id: String,
    pub source: String,
    pub content: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub ingested_at: DateTime<Utc>,
}

/// One scoring result; append-only, many per post are legal.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct AnalysisRecord {
    pub id: i64,
    pub post_id: String,
    pub model_name: String,
    pub sentiment_label: String,
    pub confidence_score: f64,
    pub emotion: Option<String>,
    pub analyzed_at: DateTime<Utc>,
}

/// A persisted alert with its window snapshot.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AlertRecord {
    pub id: i64,
    pub alert_type: String,
    pub threshold_value: f64,
    pub actual_value: f64,
    pub window_minutes: i64,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub post_count: i64,
    pub triggered_at: DateTime<Utc>,
    pub details: Json<serde_json::Value>,
}

/// Post fields as the worker writes them, with event-time parsing applied.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPost {
    pub post_id: String,
    pub source: String,
    pub content: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
}

impl NewPost {
    /// Normalize a log entry for persistence. A missing or unparseable
    /// `created_at` falls back to `arrival`; the column must never be NULL.
    /// Blank source/author get the conventional placeholders.
    pub fn from_event(event: &PostEvent, arrival: DateTime<Utc>) -> Self {
        let created_at = DateTime::parse_from_rfc3339(event.created_at.trim())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(arrival);
        Self {
            post_id: event.post_id.clone(),
            source: non_blank(&event.source, "unknown"),
            content: event.content.clone(),
            author: non_blank(&event.author, "anonymous"),
            created_at,
        }
    }
}

/// An alert about to be persisted (everything but id/triggered_at).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertDraft {
    pub alert_type: String,
    pub threshold_value: f64,
    pub actual_value: f64,
    pub window_minutes: i64,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub post_count: i64,
    pub details: serde_json::Value,
}

fn non_blank(value: &str, placeholder: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        placeholder.to_string()
    } else {
        value.to_string()
    }
}
