// src/stream/mod.rs
pub mod log;

pub use log::{AppendLog, PendingInfo, StartPosition};

use std::fmt;

/// Position of an entry in the append log. Ids are assigned on append and
/// strictly increase; they are never reused, even across group resets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId(pub u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One produced event as it travels the log: the raw post plus its event
/// timestamp as an RFC 3339 string (producers serialize, the worker parses).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PostEvent {
    pub post_id: String,
    pub source: String,
    pub content: String,
    pub author: String,
    pub created_at: String,
}

impl PostEvent {
    /// Builder used by producers and tests; fills `created_at` with `now`.
    pub fn new(
        post_id: impl Into<String>,
        source: impl Into<String>,
        content: impl Into<String>,
        author: impl Into<String>,
    ) -> Self {
        Self {
            post_id: post_id.into(),
            source: source.into(),
            content: content.into(),
            author: author.into(),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn with_created_at(mut self, created_at: impl Into<String>) -> Self {
        self.created_at = created_at.into();
        self
    }
}
