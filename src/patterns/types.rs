//! Pattern type definitions and the confidence model.
//!
//! Every pattern shares one lifecycle (confidence, hit/miss counters, recency,
//! decay) and carries a kind-specific [`PatternPayload`]. Confidence is never
//! assigned directly: [`Pattern::recompute`] derives it from the payload evidence,
//! the feedback counters, and the accumulated decay weight.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::PatternConfig;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    /// Two paths touched within a short window of each other.
    CoAccess,
    /// One path reliably followed by another after a similar delay.
    Sequential,
    /// The file types (and files) a directory is typically used for.
    DirectoryAffinity,
    /// How often a path is accessed within a rolling window.
    Frequency,
}

impl PatternKind {
    pub const ALL: [PatternKind; 4] = [
        Self::CoAccess,
        Self::Sequential,
        Self::DirectoryAffinity,
        Self::Frequency,
    ];

    /// SQL-compatible string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CoAccess => "co_access",
            Self::Sequential => "sequential",
            Self::DirectoryAffinity => "directory_affinity",
            Self::Frequency => "frequency",
        }
    }
}

impl std::fmt::Display for PatternKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PatternKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "co_access" => Ok(Self::CoAccess),
            "sequential" => Ok(Self::Sequential),
            "directory_affinity" => Ok(Self::DirectoryAffinity),
            "frequency" => Ok(Self::Frequency),
            _ => Err(format!("unknown pattern kind: {s}")),
        }
    }
}

/// Canonical identity of a pattern, e.g. `co_access:/a <-> /b`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatternKey(String);

impl PatternKey {
    pub fn co_access(a: &str, b: &str) -> Self {
        let (a, b) = ordered(a, b);
        Self(format!("co_access:{a} <-> {b}"))
    }

    pub fn sequential(from: &str, to: &str) -> Self {
        Self(format!("sequential:{from} -> {to}"))
    }

    pub fn directory(directory: &str) -> Self {
        Self(format!("directory_affinity:{directory}"))
    }

    pub fn frequency(path: &str) -> Self {
        Self(format!("frequency:{path}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for PatternKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for PatternKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn ordered<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Running delay statistics (Welford's online algorithm).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DelayStats {
    pub samples: u64,
    pub mean_ms: f64,
    /// Sum of squared deviations from the mean.
    pub m2: f64,
}

impl DelayStats {
    pub fn push(&mut self, delay_ms: f64) {
        self.samples += 1;
        let delta = delay_ms - self.mean_ms;
        self.mean_ms += delta / self.samples as f64;
        self.m2 += delta * (delay_ms - self.mean_ms);
    }

    pub fn std_dev_ms(&self) -> Option<f64> {
        (self.samples >= 2).then(|| (self.m2.max(0.0) / (self.samples - 1) as f64).sqrt())
    }

    /// `1 / (1 + cv)` where `cv` is the coefficient of variation; 0 with fewer than two samples.
    pub fn consistency(&self) -> f64 {
        match self.std_dev_ms() {
            None => 0.0,
            Some(_) if self.mean_ms <= 0.0 => 1.0,
            Some(sd) => 1.0 / (1.0 + sd / self.mean_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PatternPayload {
    CoAccess {
        /// Lexicographically smaller path of the pair.
        path_a: String,
        path_b: String,
        co_occurrences: u64,
    },
    Sequential {
        from: String,
        to: String,
        occurrences: u64,
        delay: DelayStats,
    },
    DirectoryAffinity {
        directory: String,
        /// Access counts per extension (`""` for files without one).
        extensions: BTreeMap<String, u64>,
        /// Access counts per file, bounded by `directory_max_files`.
        files: BTreeMap<String, u64>,
    },
    Frequency {
        path: String,
        /// Access counts per day since the epoch, pruned to the rolling window.
        daily: BTreeMap<i64, u64>,
        /// Access counts per hour of day (UTC).
        hourly: [u64; 24],
    },
}

impl PatternPayload {
    pub fn co_access(a: &str, b: &str) -> Self {
        let (a, b) = ordered(a, b);
        Self::CoAccess {
            path_a: a.to_string(),
            path_b: b.to_string(),
            co_occurrences: 0,
        }
    }

    pub fn sequential(from: &str, to: &str) -> Self {
        Self::Sequential {
            from: from.to_string(),
            to: to.to_string(),
            occurrences: 0,
            delay: DelayStats::default(),
        }
    }

    pub fn directory(directory: &str) -> Self {
        Self::DirectoryAffinity {
            directory: directory.to_string(),
            extensions: BTreeMap::new(),
            files: BTreeMap::new(),
        }
    }

    pub fn frequency(path: &str) -> Self {
        Self::Frequency {
            path: path.to_string(),
            daily: BTreeMap::new(),
            hourly: [0; 24],
        }
    }

    pub fn kind(&self) -> PatternKind {
        match self {
            Self::CoAccess { .. } => PatternKind::CoAccess,
            Self::Sequential { .. } => PatternKind::Sequential,
            Self::DirectoryAffinity { .. } => PatternKind::DirectoryAffinity,
            Self::Frequency { .. } => PatternKind::Frequency,
        }
    }

    pub fn key(&self) -> PatternKey {
        match self {
            Self::CoAccess { path_a, path_b, .. } => PatternKey::co_access(path_a, path_b),
            Self::Sequential { from, to, .. } => PatternKey::sequential(from, to),
            Self::DirectoryAffinity { directory, .. } => PatternKey::directory(directory),
            Self::Frequency { path, .. } => PatternKey::frequency(path),
        }
    }

    /// Share of the most common extension in a directory, in `[0, 1]`.
    pub fn dominant_share(&self) -> f64 {
        match self {
            Self::DirectoryAffinity { extensions, .. } => {
                let total: u64 = extensions.values().sum();
                let dominant = extensions.values().copied().max().unwrap_or(0);
                if total == 0 {
                    0.0
                } else {
                    dominant as f64 / total as f64
                }
            }
            _ => 0.0,
        }
    }

    /// Sum of the daily buckets.
    pub fn window_count(&self) -> u64 {
        match self {
            Self::Frequency { daily, .. } => daily.values().sum(),
            _ => 0,
        }
    }

    /// Accesses within one hour either side of `hour` (wrapping at midnight).
    pub fn hour_window_count(&self, hour: u32) -> u64 {
        match self {
            Self::Frequency { hourly, .. } => {
                let h = (hour % 24) as usize;
                [(h + 23) % 24, h, (h + 1) % 24]
                    .iter()
                    .map(|i| hourly[*i])
                    .sum()
            }
            _ => 0,
        }
    }
}

/// A learned regularity plus its shared lifecycle state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub key: PatternKey,
    pub payload: PatternPayload,
    /// Always in `[0.0, 1.0]`; derived, never assigned.
    pub confidence: f64,
    pub hit_count: u64,
    pub miss_count: u64,
    /// Most recent reinforcement or confirmed prediction.
    pub last_used: DateTime<Utc>,
    /// Product of all decay applied since `last_used`, in `[0.0, 1.0]`.
    pub decay_weight: f64,
    /// Decay has been applied up to this instant.
    pub decayed_through: DateTime<Utc>,
    /// Soft-removed by decay; excluded from listings until confidence recovers.
    pub retired: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecayOutcome {
    Unchanged,
    Decayed,
    Retired,
}

impl Pattern {
    /// A fresh pattern with no evidence yet. Confidence starts at the formula's value (0).
    pub fn seed(payload: PatternPayload, now: DateTime<Utc>, model: &PatternConfig) -> Self {
        let mut pattern = Self {
            key: payload.key(),
            payload,
            confidence: 0.0,
            hit_count: 0,
            miss_count: 0,
            last_used: now,
            decay_weight: 1.0,
            decayed_through: now,
            retired: false,
            created_at: now,
        };
        pattern.recompute(model);
        pattern
    }

    pub fn kind(&self) -> PatternKind {
        self.payload.kind()
    }

    /// Confidence from evidence and feedback alone, before decay.
    pub fn base_confidence(&self, model: &PatternConfig) -> f64 {
        let k = model.decay_constant.max(0.0);
        let hits = self.hit_count as f64;
        let misses = self.miss_count as f64;
        let feedback = (hits + 1.0) / (hits + misses + 1.0);

        let value = match &self.payload {
            PatternPayload::CoAccess { co_occurrences, .. } => {
                saturating(*co_occurrences as f64 + hits, k, misses)
            }
            PatternPayload::Sequential {
                occurrences, delay, ..
            } => saturating(*occurrences as f64 + hits, k, misses) * (1.0 + delay.consistency()),
            PatternPayload::DirectoryAffinity { .. } => self.payload.dominant_share() * feedback,
            PatternPayload::Frequency { .. } => {
                saturating(self.payload.window_count() as f64 + hits, k, misses)
            }
        };
        clamp_unit(value)
    }

    /// Re-derive `confidence` from the counters and decay weight.
    pub fn recompute(&mut self, model: &PatternConfig) {
        self.confidence = clamp_unit(self.base_confidence(model) * self.decay_weight);
        if self.retired && self.confidence >= model.confidence_floor {
            self.retired = false;
        }
    }

    /// Mark the pattern as used at `at`, clearing accumulated decay.
    /// Older timestamps (late events) leave recency untouched.
    pub fn touch(&mut self, at: DateTime<Utc>) {
        if at >= self.last_used {
            self.last_used = at;
            self.decay_weight = 1.0;
            self.decayed_through = at;
        }
    }

    pub fn record_hit(&mut self, at: DateTime<Utc>, model: &PatternConfig) {
        self.hit_count += 1;
        self.touch(at);
        self.recompute(model);
    }

    pub fn record_miss(&mut self, model: &PatternConfig) {
        self.miss_count += 1;
        self.recompute(model);
    }

    /// Multiply in `decay_factor` per day elapsed since the later of `last_used`
    /// and the previous decay. Repeating the call with the same `now` is a no-op.
    pub fn apply_decay(&mut self, now: DateTime<Utc>, model: &PatternConfig) -> DecayOutcome {
        let anchor = self.last_used.max(self.decayed_through);
        let mut outcome = DecayOutcome::Unchanged;

        if now > anchor {
            let days = (now - anchor).num_milliseconds() as f64 / MILLIS_PER_DAY;
            let factor = model.decay_factor.clamp(0.0, 1.0).powf(days);
            self.decay_weight = clamp_unit(self.decay_weight * factor);
            self.decayed_through = now;
            self.recompute(model);
            outcome = DecayOutcome::Decayed;
        }

        if !self.retired && self.confidence < model.confidence_floor {
            self.retired = true;
            outcome = DecayOutcome::Retired;
        }
        outcome
    }

    /// Per-file strengths a directory-affinity pattern contributes to predictions:
    /// confidence scaled by the file's type share relative to the dominant type and
    /// by its access count relative to the busiest file.
    pub fn directory_file_strengths(&self) -> Vec<(String, f64)> {
        let PatternPayload::DirectoryAffinity {
            extensions, files, ..
        } = &self.payload
        else {
            return Vec::new();
        };

        let total: u64 = extensions.values().sum();
        let dominant = extensions.values().copied().max().unwrap_or(0);
        let busiest = files.values().copied().max().unwrap_or(0);
        if total == 0 || dominant == 0 || busiest == 0 {
            return Vec::new();
        }

        files
            .iter()
            .map(|(path, count)| {
                let ext = crate::events::types::split_path(path).1.unwrap_or_default();
                let type_weight =
                    extensions.get(&ext).copied().unwrap_or(0) as f64 / dominant as f64;
                let file_weight = *count as f64 / busiest as f64;
                (path.clone(), clamp_unit(self.confidence * type_weight * file_weight))
            })
            .collect()
    }
}

/// `n / (n + k + m)`, 0 when the denominator is 0.
fn saturating(n: f64, k: f64, m: f64) -> f64 {
    let denom = n + k + m;
    if denom <= 0.0 {
        0.0
    } else {
        n / denom
    }
}

pub(crate) fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
