//! Feedback Loop: settles served predictions as hits or misses.
//!
//! Every prediction handed out is registered as an [`ActivePrediction`]. An
//! observed event for the predicted path between issue and expiry is a hit;
//! expiry without one is a miss. This is the only place `hit_count` and `miss_count` change.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use crate::config::PatternConfig;
use crate::error::Result;
use crate::events::OperationEvent;
use crate::patterns::{Pattern, PatternChange, PatternKey, PatternStore};

/// A served prediction awaiting confirmation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivePrediction {
    pub path: String,
    pub confidence: f64,
    pub patterns: Vec<PatternKey>,
    /// Canonical snapshot of the context that produced the prediction.
    pub context_key: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Registry of outstanding predictions, shared by the predictor and the feedback loop.
#[derive(Default)]
pub struct ActivePredictions {
    inner: Mutex<Vec<ActivePrediction>>,
}

impl ActivePredictions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a batch in one step. Returns how many entries are new.
    ///
    /// At most one entry exists per (path, context). A duplicate is coalesced to
    /// the higher-confidence entry; on a tie the newer one replaces the old.
    pub fn register(&self, batch: Vec<ActivePrediction>) -> Result<usize> {
        let mut active = self.inner.lock()?;
        let mut added = 0;
        for prediction in batch {
            let existing = active
                .iter_mut()
                .find(|a| a.path == prediction.path && a.context_key == prediction.context_key);
            match existing {
                Some(current) => {
                    if prediction.confidence >= current.confidence {
                        *current = prediction;
                    }
                }
                None => {
                    active.push(prediction);
                    added += 1;
                }
            }
        }
        Ok(added)
    }

    /// Remove and return every prediction expired at `at`.
    pub fn take_expired(&self, at: DateTime<Utc>) -> Result<Vec<ActivePrediction>> {
        let mut active = self.inner.lock()?;
        let (expired, live): (Vec<_>, Vec<_>) = active.drain(..).partition(|a| a.expires_at <= at);
        *active = live;
        Ok(expired)
    }

    /// Remove and return every prediction for `path` that was live at `at`.
    /// Predictions issued after `at` stay outstanding.
    pub fn take_confirmed(&self, path: &str, at: DateTime<Utc>) -> Result<Vec<ActivePrediction>> {
        let mut active = self.inner.lock()?;
        let (matched, rest): (Vec<_>, Vec<_>) = active
            .drain(..)
            .partition(|a| a.path == path && a.issued_at <= at && at < a.expires_at);
        *active = rest;
        Ok(matched)
    }

    pub fn snapshot(&self) -> Result<Vec<ActivePrediction>> {
        Ok(self.inner.lock()?.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|a| a.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeedbackReport {
    pub hits: usize,
    pub misses: usize,
    pub patterns_credited: usize,
    pub patterns_blamed: usize,
}

pub struct FeedbackLoop {
    active: Arc<ActivePredictions>,
    model: PatternConfig,
}

impl FeedbackLoop {
    pub fn new(active: Arc<ActivePredictions>, model: PatternConfig) -> Self {
        Self { active, model }
    }

    pub fn active(&self) -> &Arc<ActivePredictions> {
        &self.active
    }

    /// Settle expirations up to the event's time, then credit predictions of its path.
    pub fn observe(&self, patterns: &dyn PatternStore, event: &OperationEvent) -> Result<FeedbackReport> {
        let mut report = self.sweep(patterns, event.timestamp)?;

        let matched = self.active.take_confirmed(&event.file_path, event.timestamp)?;
        if matched.is_empty() {
            return Ok(report);
        }
        report.hits = matched.len();

        // Each pattern is credited once per observation, however many predictions it backed.
        let credited: BTreeSet<&PatternKey> = matched.iter().flat_map(|a| a.patterns.iter()).collect();
        for key in credited {
            let updated = patterns.update(key, PatternChange::Hit, &mut |p: &mut Pattern| {
                p.record_hit(event.timestamp, &self.model)
            });
            match updated {
                Ok(Some(_)) => report.patterns_credited += 1,
                Ok(None) => {}
                Err(e) => tracing::warn!(key = %key, error = %e, "failed to credit pattern"),
            }
        }

        tracing::debug!(
            path = %event.file_path,
            hits = report.hits,
            credited = report.patterns_credited,
            "prediction confirmed"
        );
        Ok(report)
    }

    /// Settle every prediction expired at `now` as a miss.
    pub fn sweep(&self, patterns: &dyn PatternStore, now: DateTime<Utc>) -> Result<FeedbackReport> {
        let expired = self.active.take_expired(now)?;
        let mut report = FeedbackReport {
            misses: expired.len(),
            ..Default::default()
        };

        for prediction in &expired {
            for key in &prediction.patterns {
                let updated = patterns.update(key, PatternChange::Miss, &mut |p: &mut Pattern| {
                    p.record_miss(&self.model)
                });
                match updated {
                    Ok(Some(_)) => report.patterns_blamed += 1,
                    Ok(None) => {}
                    Err(e) => tracing::warn!(key = %key, error = %e, "failed to record miss"),
                }
            }
        }

        if report.misses > 0 {
            tracing::debug!(misses = report.misses, blamed = report.patterns_blamed, "predictions expired");
        }
        Ok(report)
    }
}
