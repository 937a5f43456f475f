//! Pattern Store: learned patterns with confidence, hit/miss counters, and recency.
//!
//! All read-modify-write goes through [`PatternStore::update`] and
//! [`PatternStore::reinforce`], which each implementation makes atomic per key.
//! [`PatternStore::decay`] walks keys one at a time so maintenance never holds more
//! than a single pattern.

pub mod memory;
pub mod sqlite;
pub mod types;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::PatternConfig;
use crate::error::Result;
pub use types::{DecayOutcome, DelayStats, Pattern, PatternKey, PatternKind, PatternPayload};

/// Why a pattern row changed; recorded in the audit trail by stores that keep one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternChange {
    Reinforce,
    Hit,
    Miss,
    Decay,
}

impl PatternChange {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reinforce => "reinforce",
            Self::Hit => "hit",
            Self::Miss => "miss",
            Self::Decay => "decay",
        }
    }
}

pub trait PatternStore: Send + Sync {
    /// Insert or replace a pattern.
    fn upsert(&self, pattern: &Pattern) -> Result<()>;

    fn get(&self, key: &PatternKey) -> Result<Option<Pattern>>;

    /// Non-retired patterns with `confidence >= min_confidence`, highest confidence
    /// first, ties by key.
    fn list(&self, kind: Option<PatternKind>, min_confidence: f64) -> Result<Vec<Pattern>>;

    fn keys(&self) -> Result<Vec<PatternKey>>;

    /// Atomically apply `f` to an existing pattern. Returns the updated pattern, or
    /// `None` if the key is unknown.
    fn update(
        &self,
        key: &PatternKey,
        change: PatternChange,
        f: &mut dyn FnMut(&mut Pattern),
    ) -> Result<Option<Pattern>>;

    /// Atomically apply `f` to the pattern with `seed`'s key, inserting `seed` first
    /// when absent.
    fn reinforce(&self, seed: Pattern, f: &mut dyn FnMut(&mut Pattern)) -> Result<Pattern>;

    /// Remove every pattern. Returns how many were removed.
    fn clear(&self) -> Result<usize>;

    fn stats(&self) -> Result<PatternStats>;

    /// Apply time decay to every pattern, one key at a time.
    fn decay(&self, now: DateTime<Utc>, model: &PatternConfig) -> Result<DecayReport> {
        decay_each(self, now, model)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DecayReport {
    pub examined: usize,
    pub decayed: usize,
    pub retired: usize,
    /// Keys whose update failed; they are picked up again on the next run.
    pub failed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PatternStats {
    pub total_patterns: u64,
    pub active_patterns: u64,
    pub retired_patterns: u64,
    pub by_kind: BTreeMap<String, u64>,
    pub total_hits: u64,
    pub total_misses: u64,
    pub mean_confidence: f64,
}

impl PatternStats {
    /// Build stats from an iterator of patterns (used by stores without SQL aggregation).
    pub fn from_patterns<'a>(patterns: impl IntoIterator<Item = &'a Pattern>) -> Self {
        let mut stats = Self::default();
        let mut confidence_sum = 0.0;
        for p in patterns {
            stats.total_patterns += 1;
            if p.retired {
                stats.retired_patterns += 1;
            } else {
                stats.active_patterns += 1;
                confidence_sum += p.confidence;
                *stats.by_kind.entry(p.kind().to_string()).or_default() += 1;
            }
            stats.total_hits += p.hit_count;
            stats.total_misses += p.miss_count;
        }
        if stats.active_patterns > 0 {
            stats.mean_confidence = confidence_sum / stats.active_patterns as f64;
        }
        stats
    }
}

/// Shared decay walk used by every store. Per-key failures are logged and skipped.
pub fn decay_each<S: PatternStore + ?Sized>(
    store: &S,
    now: DateTime<Utc>,
    model: &PatternConfig,
) -> Result<DecayReport> {
    let mut report = DecayReport::default();

    for key in store.keys()? {
        report.examined += 1;
        let mut outcome = DecayOutcome::Unchanged;
        let result = store.update(&key, PatternChange::Decay, &mut |p: &mut Pattern| {
            outcome = p.apply_decay(now, model);
        });

        match result {
            Ok(Some(_)) => match outcome {
                DecayOutcome::Unchanged => {}
                DecayOutcome::Decayed => report.decayed += 1,
                DecayOutcome::Retired => {
                    report.decayed += 1;
                    report.retired += 1;
                }
            },
            // Removed concurrently (e.g. rebuild); nothing to decay.
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "decay failed for pattern; will retry next run");
                report.failed += 1;
            }
        }
    }

    tracing::info!(
        examined = report.examined,
        decayed = report.decayed,
        retired = report.retired,
        failed = report.failed,
        "pattern decay complete"
    );
    Ok(report)
}

/// Sort patterns by confidence descending, then key ascending.
pub(crate) fn sort_by_confidence(patterns: &mut [Pattern]) {
    patterns.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| a.key.cmp(&b.key))
    });
}
