use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::events::types::split_path;
use crate::patterns::{PatternKey, PatternKind};

/// What the user is doing right now.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionContext {
    /// Paths touched most recently. Never predicted back.
    #[serde(default)]
    pub recent_paths: Vec<String>,
    #[serde(default)]
    pub current_directory: Option<String>,
    /// Hour of day (0-23, UTC) for time-of-day ranking of frequent files.
    #[serde(default)]
    pub hour: Option<u32>,
}

impl PredictionContext {
    pub fn new(recent_paths: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            recent_paths: recent_paths.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_directory(mut self, directory: impl Into<String>) -> Self {
        self.current_directory = Some(directory.into());
        self
    }

    pub fn with_hour(mut self, hour: u32) -> Self {
        self.hour = Some(hour % 24);
        self
    }

    pub fn recent_set(&self) -> BTreeSet<&str> {
        self.recent_paths.iter().map(String::as_str).collect()
    }

    /// The current directory plus the parent directory of every recent path.
    pub fn directories(&self) -> BTreeSet<String> {
        let mut dirs: BTreeSet<String> = self
            .recent_paths
            .iter()
            .map(|p| split_path(p).2)
            .collect();
        if let Some(dir) = &self.current_directory {
            let trimmed = dir.trim_end_matches('/');
            dirs.insert(if trimmed.is_empty() { "/" } else { trimmed }.to_string());
        }
        dirs
    }

    /// Canonical cache key: order and repetition of recent paths do not matter.
    pub fn cache_key(&self) -> String {
        let recent: Vec<&str> = self.recent_set().into_iter().collect();
        format!(
            "recent={}|dir={}|hour={}",
            recent.join("\u{1f}"),
            self.current_directory.as_deref().unwrap_or(""),
            self.hour.map(|h| (h % 24).to_string()).unwrap_or_default()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionStatus {
    Fresh,
    Cached,
    /// No pattern applies to the context. A normal outcome, not an error.
    NoPatternsAvailable,
}

/// One predicted path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub path: String,
    /// Blended score in `[0, 1]`.
    pub confidence: f64,
    /// Kinds that contributed, in declaration order.
    pub kinds: Vec<PatternKind>,
    /// Patterns credited or blamed by the feedback loop.
    pub patterns: Vec<PatternKey>,
    /// Newest `last_used` among the contributing patterns.
    pub last_used: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionSet {
    pub predictions: Vec<Prediction>,
    pub status: PredictionStatus,
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PredictionSet {
    pub fn is_empty(&self) -> bool {
        self.predictions.is_empty()
    }
}
