//! Ranked prediction cache keyed by canonical context.
//!
//! Entries are inserted whole after a computation finishes, so a cancelled
//! prediction never leaves a partial entry behind.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use super::types::Prediction;
use crate::error::Result;
use crate::patterns::{PatternKey, PatternStore};

#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Top-K ranked predictions.
    pub ranked: Vec<Prediction>,
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// `last_used` of every contributing pattern when the entry was computed.
    pub contributors: BTreeMap<PatternKey, DateTime<Utc>>,
}

impl CacheEntry {
    /// Keep only the contributors referenced by `ranked`.
    pub fn new(
        ranked: Vec<Prediction>,
        generated_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        all_contributors: &BTreeMap<PatternKey, DateTime<Utc>>,
    ) -> Self {
        let contributors = ranked
            .iter()
            .flat_map(|p| p.patterns.iter())
            .filter_map(|key| all_contributors.get(key).map(|at| (key.clone(), *at)))
            .collect();
        Self {
            ranked,
            generated_at,
            expires_at,
            contributors,
        }
    }
}

#[derive(Default)]
pub struct PredictionCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl PredictionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A live entry for `key` whose contributing patterns are unchanged, or `None`.
    /// Stale entries are evicted.
    pub fn lookup(
        &self,
        key: &str,
        patterns: &dyn PatternStore,
        now: DateTime<Utc>,
    ) -> Result<Option<CacheEntry>> {
        let Some(entry) = self.entries.read()?.get(key).cloned() else {
            return Ok(None);
        };

        if entry.expires_at <= now || !still_valid(&entry, patterns)? {
            self.entries.write()?.remove(key);
            tracing::debug!(key, "prediction cache entry invalidated");
            return Ok(None);
        }
        Ok(Some(entry))
    }

    pub fn insert(&self, key: String, entry: CacheEntry) -> Result<()> {
        self.entries.write()?.insert(key, entry);
        Ok(())
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut entries = self.entries.write()?;
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        Ok(before - entries.len())
    }

    pub fn clear(&self) -> Result<()> {
        self.entries.write()?.clear();
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Every contributing pattern still exists, is active, and has not been used since.
fn still_valid(entry: &CacheEntry, patterns: &dyn PatternStore) -> Result<bool> {
    for (key, last_used) in &entry.contributors {
        match patterns.get(key)? {
            Some(p) if !p.retired && p.last_used == *last_used => {}
            _ => return Ok(false),
        }
    }
    Ok(true)
}
