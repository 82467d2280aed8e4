//! # Persistence Store
//! SQLite-backed store for posts, analyses, and alerts. The write path is
//! built for redelivery: posts upsert by natural key (`ON CONFLICT` merge,
//! never an uncaught uniqueness violation), analyses append, and every
//! worker entry commits in its own transaction so an orphan analysis row
//! cannot exist.

pub mod models;

pub use models::{AlertDraft, AlertRecord, AnalysisRecord, NewPost, PostRecord};

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use crate::scoring::{EmotionScore, SentimentScore};

#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if missing) the database at `url`, e.g.
    /// `sqlite://data/sentistream.db`, with WAL and foreign keys on.
    pub async fn connect(url: &str) -> Result<Self> {
        // SQLite creates the file but not its parent directory.
        if let Some(path) = url.strip_prefix("sqlite://") {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("creating {}", parent.display()))?;
                }
            }
        }

        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("parsing database url {url}"))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_millis(5_000));

        let pool = SqlitePoolOptions::new()
            .max_connections(20)
            .min_connections(1)
            .connect_with(options)
            .await
            .context("connecting to sqlite")?;

        info!(url, "store connected");
        Ok(Self { pool })
    }

    /// In-memory store for tests. A single connection keeps every query on
    /// the same ephemeral database.
    pub async fn memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .connect_with(options)
            .await
            .context("connecting to in-memory sqlite")?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the pool; subsequent writes fail. Used to exercise the
    /// leave-pending path in tests.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Idempotent schema creation.
    pub async fn init_schema(&self) -> Result<()> {
        create_posts_table(&self.pool).await?;
        create_analyses_table(&self.pool).await?;
        create_alerts_table(&self.pool).await?;
        Ok(())
    }

    /// Persist one scoring result atomically: upsert the post by `post_id`
    /// (only `ingested_at` moves on conflict; content and event time are
    /// immutable once stored), then append the analysis row. Returns the new
    /// analysis id.
    pub async fn record_analysis(
        &self,
        post: &NewPost,
        sentiment: &SentimentScore,
        emotion: &EmotionScore,
    ) -> Result<i64> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.context("starting transaction")?;

        sqlx::query(
            r#"
            INSERT INTO posts (post_id, source, content, author, created_at, ingested_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(post_id) DO UPDATE SET ingested_at = excluded.ingested_at
            "#,
        )
        .bind(&post.post_id)
        .bind(&post.source)
        .bind(&post.content)
        .bind(&post.author)
        .bind(post.created_at)
        .bind(now)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("upserting post {}", post.post_id))?;

        let result = sqlx::query(
            r#"
            INSERT INTO analyses (post_id, model_name, sentiment_label, confidence_score, emotion, analyzed_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.post_id)
        .bind(&sentiment.model_name)
        .bind(sentiment.label.as_str())
        .bind(sentiment.confidence)
        .bind(&emotion.emotion)
        .bind(now)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("inserting analysis for {}", post.post_id))?;

        tx.commit().await.context("committing analysis")?;
        Ok(result.last_insert_rowid())
    }

    /// Append-only alert insert; returns the new alert id.
    pub async fn insert_alert(&self, draft: &AlertDraft) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO alerts (alert_type, threshold_value, actual_value, window_minutes,
                                window_start, window_end, post_count, triggered_at, details)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&draft.alert_type)
        .bind(draft.threshold_value)
        .bind(draft.actual_value)
        .bind(draft.window_minutes)
        .bind(draft.window_start)
        .bind(draft.window_end)
        .bind(draft.post_count)
        .bind(Utc::now())
        .bind(sqlx::types::Json(&draft.details))
        .execute(&self.pool)
        .await
        .context("inserting alert")?;
        Ok(result.last_insert_rowid())
    }

    /// Sentiment labels of analyses whose POST's event time lies in
    /// `[start, end]`; this is the alerting engine's window query.
    pub async fn sentiment_labels_in_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        sqlx::query_scalar(
            r#"
            SELECT a.sentiment_label
            FROM analyses a
            JOIN posts p ON p.post_id = a.post_id
            WHERE p.created_at >= ? AND p.created_at <= ?
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .context("querying window labels")
    }

    pub async fn fetch_post(&self, post_id: &str) -> Result<Option<PostRecord>> {
        sqlx::query_as::<_, PostRecord>("SELECT * FROM posts WHERE post_id = ?")
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await
            .context("fetching post")
    }

    pub async fn analyses_for_post(&self, post_id: &str) -> Result<Vec<AnalysisRecord>> {
        sqlx::query_as::<_, AnalysisRecord>(
            "SELECT * FROM analyses WHERE post_id = ? ORDER BY id",
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .context("fetching analyses")
    }

    pub async fn recent_alerts(&self, limit: i64) -> Result<Vec<AlertRecord>> {
        sqlx::query_as::<_, AlertRecord>(
            "SELECT * FROM alerts ORDER BY triggered_at DESC, id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("fetching alerts")
    }

    pub async fn post_count(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM posts")
            .fetch_one(&self.pool)
            .await
            .context("counting posts")
    }

    pub async fn analysis_count(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM analyses")
            .fetch_one(&self.pool)
            .await
            .context("counting analyses")
    }
}

async fn create_posts_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS posts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            post_id TEXT NOT NULL UNIQUE,
            source TEXT NOT NULL,
            content TEXT NOT NULL,
            author TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL,
            ingested_at TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_posts_source ON posts(source)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_posts_created_at ON posts(created_at)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_analyses_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS analyses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            post_id TEXT NOT NULL REFERENCES posts(post_id),
            model_name TEXT NOT NULL,
            sentiment_label TEXT NOT NULL,
            confidence_score REAL NOT NULL,
            emotion TEXT,
            analyzed_at TIMESTAMP NOT NULL,
            CHECK (confidence_score >= 0.0 AND confidence_score <= 1.0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_analyses_post_id ON analyses(post_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_analyses_analyzed_at ON analyses(analyzed_at)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_alerts_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS alerts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            alert_type TEXT NOT NULL,
            threshold_value REAL NOT NULL,
            actual_value REAL NOT NULL,
            window_minutes INTEGER NOT NULL,
            window_start TIMESTAMP NOT NULL,
            window_end TIMESTAMP NOT NULL,
            post_count INTEGER NOT NULL,
            triggered_at TIMESTAMP NOT NULL,
            details TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_alerts_triggered_at ON alerts(triggered_at)")
        .execute(pool)
        .await?;

    Ok(())
}
