//! Prediction Engine: ranks likely next files for a context.
//!
//! Each pattern kind that applies to the context contributes a score per candidate
//! path (the strongest one per kind). The blended confidence is the weighted sum
//! of those scores over the total weight of all kinds.
//!
//! Candidates are ordered by their co-access strength with a recent path first,
//! so background directory and frequency signals never lift a path above one
//! seen together with the context more often. The blend orders the rest.

pub mod cache;
pub mod types;

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::config::{PatternConfig, PredictionConfig};
use crate::error::Result;
use crate::feedback::{ActivePrediction, ActivePredictions};
use crate::patterns::types::clamp_unit;
use crate::patterns::{Pattern, PatternKey, PatternKind, PatternPayload, PatternStore};
use cache::{CacheEntry, PredictionCache};
pub use types::{Prediction, PredictionContext, PredictionSet, PredictionStatus};

/// Per-candidate accumulation while scoring.
#[derive(Default)]
struct Candidate {
    best: BTreeMap<PatternKind, f64>,
    patterns: BTreeSet<PatternKey>,
    last_used: Option<DateTime<Utc>>,
}

impl Candidate {
    fn offer(&mut self, pattern: &Pattern, score: f64) {
        if score <= 0.0 {
            return;
        }
        let best = self.best.entry(pattern.kind()).or_insert(0.0);
        *best = best.max(score);
        self.patterns.insert(pattern.key.clone());
        self.last_used = Some(match self.last_used {
            Some(t) => t.max(pattern.last_used),
            None => pattern.last_used,
        });
    }
}

/// A computed, not yet served, prediction result.
#[derive(Debug, Clone)]
pub struct Ranking {
    key: String,
    set: PredictionSet,
    cache_entry: Option<CacheEntry>,
}

impl Ranking {
    pub fn set(&self) -> &PredictionSet {
        &self.set
    }
}

pub struct Predictor {
    config: PredictionConfig,
    model: PatternConfig,
    cache: PredictionCache,
    active: Arc<ActivePredictions>,
}

impl Predictor {
    pub fn new(config: PredictionConfig, model: PatternConfig, active: Arc<ActivePredictions>) -> Self {
        Self {
            config,
            model,
            cache: PredictionCache::new(),
            active,
        }
    }

    pub fn cache(&self) -> &PredictionCache {
        &self.cache
    }

    /// Predict up to `max_results` paths for `context` and serve them.
    ///
    /// Served predictions are registered with the feedback loop. An empty result
    /// has status [`PredictionStatus::NoPatternsAvailable`]; it is never an error.
    pub fn predict(
        &self,
        patterns: &dyn PatternStore,
        context: &PredictionContext,
        max_results: usize,
        now: DateTime<Utc>,
    ) -> Result<PredictionSet> {
        let ranking = self.rank(patterns, context, max_results, now)?;
        self.commit(ranking)
    }

    /// Compute a ranking without serving it: nothing is cached or registered
    /// until [`commit`](Self::commit).
    pub fn rank(
        &self,
        patterns: &dyn PatternStore,
        context: &PredictionContext,
        max_results: usize,
        now: DateTime<Utc>,
    ) -> Result<Ranking> {
        let key = context.cache_key();
        let cacheable = max_results <= self.config.cache_top_k;

        if cacheable {
            if let Some(entry) = self.cache.lookup(&key, patterns, now)? {
                let mut predictions = entry.ranked;
                predictions.truncate(max_results);
                return Ok(Ranking {
                    key,
                    set: PredictionSet {
                        predictions,
                        status: PredictionStatus::Cached,
                        generated_at: entry.generated_at,
                        expires_at: entry.expires_at,
                    },
                    cache_entry: None,
                });
            }
        }

        let (mut ranked, contributors) = self.score(patterns, context)?;
        let expires_at = now + self.config.cache_ttl();

        if ranked.is_empty() {
            return Ok(Ranking {
                key,
                set: PredictionSet {
                    predictions: Vec::new(),
                    status: PredictionStatus::NoPatternsAvailable,
                    generated_at: now,
                    expires_at,
                },
                cache_entry: None,
            });
        }

        let cache_entry = cacheable.then(|| {
            let top: Vec<Prediction> = ranked.iter().take(self.config.cache_top_k).cloned().collect();
            CacheEntry::new(top, now, expires_at, &contributors)
        });
        ranked.truncate(max_results);

        Ok(Ranking {
            key,
            set: PredictionSet {
                predictions: ranked,
                status: PredictionStatus::Fresh,
                generated_at: now,
                expires_at,
            },
            cache_entry,
        })
    }

    /// Serve a ranking: cache a fresh one and register its predictions.
    pub fn commit(&self, ranking: Ranking) -> Result<PredictionSet> {
        let Ranking { key, set, cache_entry } = ranking;
        if let Some(entry) = cache_entry {
            self.cache.insert(key.clone(), entry)?;
        }
        self.register(&set.predictions, &key, set.generated_at, set.expires_at)?;

        if set.status == PredictionStatus::Fresh {
            tracing::debug!(context = %key, served = set.predictions.len(), "predictions computed");
        }
        Ok(set)
    }

    fn register(
        &self,
        predictions: &[Prediction],
        context_key: &str,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let batch = predictions
            .iter()
            .map(|p| ActivePrediction {
                path: p.path.clone(),
                confidence: p.confidence,
                patterns: p.patterns.clone(),
                context_key: context_key.to_string(),
                issued_at,
                expires_at,
            })
            .collect();
        self.active.register(batch)?;
        Ok(())
    }

    /// Score every candidate and return them best first, plus the `last_used` of
    /// each contributing pattern.
    fn score(
        &self,
        patterns: &dyn PatternStore,
        context: &PredictionContext,
    ) -> Result<(Vec<Prediction>, BTreeMap<PatternKey, DateTime<Utc>>)> {
        let recent = context.recent_set();
        let directories = context.directories();
        let mut candidates: BTreeMap<String, Candidate> = BTreeMap::new();
        let mut frequent: Vec<(Pattern, u64)> = Vec::new();
        let mut contributors = BTreeMap::new();

        let mut offer = |path: &str, pattern: &Pattern, score: f64| {
            if recent.contains(path) || score <= 0.0 {
                return;
            }
            candidates.entry(path.to_string()).or_default().offer(pattern, score);
            contributors.insert(pattern.key.clone(), pattern.last_used);
        };

        for pattern in patterns.list(None, 0.0)? {
            if let PatternPayload::Frequency { path, .. } = &pattern.payload {
                let count = match context.hour {
                    Some(hour) => pattern.payload.hour_window_count(hour),
                    None => pattern.payload.window_count(),
                };
                let eligible = count > 0 && !recent.contains(path.as_str());
                if eligible {
                    frequent.push((pattern, count));
                }
                continue;
            }

            match &pattern.payload {
                PatternPayload::CoAccess { path_a, path_b, .. } => {
                    if recent.contains(path_a.as_str()) {
                        offer(path_b, &pattern, pattern.confidence);
                    }
                    if recent.contains(path_b.as_str()) {
                        offer(path_a, &pattern, pattern.confidence);
                    }
                }
                PatternPayload::Sequential { from, to, .. } => {
                    if recent.contains(from.as_str()) {
                        offer(to, &pattern, pattern.confidence);
                    }
                }
                PatternPayload::DirectoryAffinity { directory, .. } => {
                    if directories.contains(directory) {
                        for (path, strength) in pattern.directory_file_strengths() {
                            offer(&path, &pattern, strength);
                        }
                    }
                }
                PatternPayload::Frequency { .. } => {}
            }
        }

        // Frequency is served as a rank score: the busiest path scores 1.0 and each
        // following rank is scaled by the ratio again.
        frequent.sort_by(|a, b| {
            b.1.cmp(&a.1)
                .then_with(|| b.0.confidence.total_cmp(&a.0.confidence))
                .then_with(|| a.0.key.cmp(&b.0.key))
        });
        let ratio = self.model.frequency_rank_ratio.clamp(0.0, 1.0);
        for (rank, (pattern, _)) in frequent.iter().enumerate() {
            if let PatternPayload::Frequency { path, .. } = &pattern.payload {
                offer(path, pattern, ratio.powi(rank as i32));
            }
        }

        let weights = &self.config.weights;
        let total_weight = weights.total();
        if total_weight <= 0.0 {
            return Ok((Vec::new(), contributors));
        }

        let mut scored: Vec<(f64, Prediction)> = candidates
            .into_iter()
            .filter_map(|(path, candidate)| {
                let last_used = candidate.last_used?;
                let blended: f64 = candidate
                    .best
                    .iter()
                    .map(|(kind, score)| weights.weight(*kind).max(0.0) * score)
                    .sum::<f64>()
                    / total_weight;
                let confidence = clamp_unit(blended);
                if confidence <= 0.0 || confidence < self.config.min_score {
                    return None;
                }
                let co_access = if weights.weight(PatternKind::CoAccess) > 0.0 {
                    candidate.best.get(&PatternKind::CoAccess).copied().unwrap_or(0.0)
                } else {
                    0.0
                };
                Some((
                    co_access,
                    Prediction {
                        path,
                        confidence,
                        kinds: candidate.best.keys().copied().collect(),
                        patterns: candidate.patterns.into_iter().collect(),
                        last_used,
                    },
                ))
            })
            .collect();

        scored.sort_by(|(a_co, a), (b_co, b)| {
            b_co.total_cmp(a_co)
                .then_with(|| b.confidence.total_cmp(&a.confidence))
                .then_with(|| b.last_used.cmp(&a.last_used))
                .then_with(|| a.path.cmp(&b.path))
        });
        let ranked = scored.into_iter().map(|(_, prediction)| prediction).collect();

        Ok((ranked, contributors))
    }
}
