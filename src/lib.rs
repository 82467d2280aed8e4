// src/lib.rs
// Public library surface for integration tests (and embedders that wire the
// worker into a larger process).

pub mod config;
pub mod metrics;
pub mod monitor;
pub mod scoring;
pub mod store;
pub mod stream;
pub mod worker;

// ---- Re-exports for stable public API ----
pub use crate::config::{AlertConfig, Config, ScoringConfig, ScoringMode, StreamConfig};
pub use crate::monitor::AlertMonitor;
pub use crate::scoring::{
    build_model, EmotionScore, ScoringModel, SentimentLabel, SentimentScore, SharedModel,
};
pub use crate::store::Store;
pub use crate::stream::{AppendLog, EntryId, PostEvent, StartPosition};
pub use crate::worker::Worker;
