//! Pattern Miner: incremental learning from each newly stored event.
//!
//! Only the patterns an event can affect are touched: co-access and sequential
//! pairs with its neighbours in the same stream, its directory's affinity, and
//! its own frequency. A neighbour pair is counted by whichever of the two events
//! was ingested later, so every pair is seen exactly once even when events arrive
//! out of timestamp order.

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::{MiningConfig, PatternConfig};
use crate::error::Result;
use crate::events::{query, EventFilter, EventStore, StoredEvent, TimeRange};
use crate::patterns::{Pattern, PatternPayload, PatternStore};

const SECONDS_PER_DAY: i64 = 86_400;

// ── Result types ─────────────────────────────────────────────────────────────

/// Patterns touched while learning from one event.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MiningReport {
    pub co_access: usize,
    pub sequential: usize,
    pub directory: usize,
    pub frequency: usize,
    /// The event was not mined (hidden path).
    pub skipped: bool,
}

impl MiningReport {
    pub fn total(&self) -> usize {
        self.co_access + self.sequential + self.directory + self.frequency
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RebuildReport {
    pub patterns_cleared: usize,
    pub events_replayed: usize,
    /// Events that could not be decoded or mined.
    pub events_failed: usize,
    pub patterns_touched: usize,
    /// Highest sequence number replayed. Later events are left to incremental learning.
    pub replayed_through: Option<i64>,
}

// ── Miner ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PatternMiner {
    mining: MiningConfig,
    model: PatternConfig,
}

/// A neighbouring path and the timestamp of the occurrence used for pairing.
struct Neighbor {
    path: String,
    timestamp: DateTime<Utc>,
}

impl PatternMiner {
    pub fn new(mining: MiningConfig, model: PatternConfig) -> Self {
        Self { mining, model }
    }

    pub fn model(&self) -> &PatternConfig {
        &self.model
    }

    /// Update every pattern `stored` can affect.
    pub fn learn(
        &self,
        events: &dyn EventStore,
        patterns: &dyn PatternStore,
        stored: &StoredEvent,
    ) -> Result<MiningReport> {
        let event = &stored.event;
        if self.mining.ignore_hidden && event.is_hidden() {
            tracing::debug!(path = %event.file_path, "hidden path not mined");
            return Ok(MiningReport {
                skipped: true,
                ..Default::default()
            });
        }

        let earlier = self.earlier_ingested_neighbors(events, stored)?;
        let mut report = MiningReport::default();

        report.co_access = self.mine_co_access(patterns, stored, &earlier)?;
        report.sequential = self.mine_sequential(patterns, stored, &earlier)?;
        self.mine_directory(patterns, stored)?;
        report.directory = 1;
        self.mine_frequency(patterns, stored)?;
        report.frequency = 1;

        tracing::debug!(
            path = %event.file_path,
            co_access = report.co_access,
            sequential = report.sequential,
            "event mined"
        );
        Ok(report)
    }

    /// Clear all patterns and replay the event log, oldest first, through [`learn`](Self::learn).
    ///
    /// Only events stored before the replay starts are replayed. An undecodable
    /// event is counted as failed and skipped; a storage failure aborts the rebuild.
    pub fn rebuild(
        &self,
        events: &dyn EventStore,
        patterns: &dyn PatternStore,
    ) -> Result<RebuildReport> {
        let through = events.stats(None)?.last_seq;
        let mut report = RebuildReport {
            patterns_cleared: patterns.clear()?,
            replayed_through: through,
            ..Default::default()
        };

        let mut log = query(events, EventFilter::default(), TimeRange::all());
        for stored in log.by_ref() {
            let stored = match stored {
                Ok(stored) => stored,
                Err(e) => {
                    tracing::error!(error = %e, replayed = report.events_replayed, "event log read failed; rebuild aborted");
                    return Err(e);
                }
            };
            if through.map_or(true, |seq| stored.seq > seq) {
                continue;
            }
            match self.learn(events, patterns, &stored) {
                Ok(mined) => {
                    report.events_replayed += 1;
                    report.patterns_touched += mined.total();
                }
                Err(e) => {
                    tracing::warn!(id = %stored.id, error = %e, "skipping event during rebuild");
                    report.events_failed += 1;
                }
            }
        }
        report.events_failed += log.skipped();

        tracing::info!(
            cleared = report.patterns_cleared,
            replayed = report.events_replayed,
            failed = report.events_failed,
            "pattern rebuild complete"
        );
        Ok(report)
    }

    /// Events in the same stream, within the widest pairing window, that were stored
    /// before `stored`. Hidden paths and the event's own path are excluded.
    fn earlier_ingested_neighbors(
        &self,
        events: &dyn EventStore,
        stored: &StoredEvent,
    ) -> Result<Vec<StoredEvent>> {
        let event = &stored.event;
        let reach = self
            .mining
            .co_access_window()
            .max(self.mining.sequential_max_delay());
        let range = TimeRange::around(event.timestamp, reach);

        query(events, EventFilter::for_stream(event.stream()), range)
            .filter(|n| match n {
                Ok(n) => {
                    n.seq < stored.seq
                        && n.event.file_path != event.file_path
                        && !(self.mining.ignore_hidden && n.event.is_hidden())
                }
                Err(_) => true,
            })
            .collect()
    }

    fn mine_co_access(
        &self,
        patterns: &dyn PatternStore,
        stored: &StoredEvent,
        earlier: &[StoredEvent],
    ) -> Result<usize> {
        let at = stored.event.timestamp;
        let window = self.mining.co_access_window();

        // Closest occurrence per distinct path.
        let mut closest: BTreeMap<&str, Duration> = BTreeMap::new();
        for n in earlier {
            let gap = distance(n.event.timestamp, at);
            if gap > window {
                continue;
            }
            closest
                .entry(n.event.file_path.as_str())
                .and_modify(|g| *g = (*g).min(gap))
                .or_insert(gap);
        }
        let neighbors = self.cap(
            closest
                .into_iter()
                .map(|(path, gap)| (path.to_string(), gap))
                .collect(),
        );

        for path in &neighbors {
            let seed = Pattern::seed(PatternPayload::co_access(&stored.event.file_path, path), at, &self.model);
            patterns.reinforce(seed, &mut |p: &mut Pattern| {
                if let PatternPayload::CoAccess { co_occurrences, .. } = &mut p.payload {
                    *co_occurrences += 1;
                }
                p.touch(at);
                p.recompute(&self.model);
            })?;
        }
        Ok(neighbors.len())
    }

    fn mine_sequential(
        &self,
        patterns: &dyn PatternStore,
        stored: &StoredEvent,
        earlier: &[StoredEvent],
    ) -> Result<usize> {
        let event = &stored.event;
        let at = event.timestamp;
        let max_delay = self.mining.sequential_max_delay();

        // Latest predecessor and earliest successor occurrence per distinct path.
        let mut predecessors: BTreeMap<&str, DateTime<Utc>> = BTreeMap::new();
        let mut successors: BTreeMap<&str, DateTime<Utc>> = BTreeMap::new();
        for n in earlier {
            let ts = n.event.timestamp;
            let path = n.event.file_path.as_str();
            if ts <= at && at - ts <= max_delay {
                let latest = predecessors.entry(path).or_insert(ts);
                *latest = (*latest).max(ts);
            } else if ts > at && ts - at <= max_delay {
                let earliest = successors.entry(path).or_insert(ts);
                *earliest = (*earliest).min(ts);
            }
        }

        let before: Vec<Neighbor> = predecessors
            .into_iter()
            .map(|(path, timestamp)| Neighbor {
                path: path.to_string(),
                timestamp,
            })
            .collect();
        let after: Vec<Neighbor> = successors
            .into_iter()
            .map(|(path, timestamp)| Neighbor {
                path: path.to_string(),
                timestamp,
            })
            .collect();

        let mut touched = 0;
        for n in self.cap_neighbors(before, at) {
            self.reinforce_sequence(patterns, &n.path, &event.file_path, at - n.timestamp, at)?;
            touched += 1;
        }
        for n in self.cap_neighbors(after, at) {
            self.reinforce_sequence(patterns, &event.file_path, &n.path, n.timestamp - at, at)?;
            touched += 1;
        }
        Ok(touched)
    }

    fn reinforce_sequence(
        &self,
        patterns: &dyn PatternStore,
        from: &str,
        to: &str,
        delay: Duration,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let seed = Pattern::seed(PatternPayload::sequential(from, to), at, &self.model);
        let delay_ms = delay.num_milliseconds() as f64;
        patterns.reinforce(seed, &mut |p: &mut Pattern| {
            if let PatternPayload::Sequential {
                occurrences,
                delay,
                ..
            } = &mut p.payload
            {
                *occurrences += 1;
                delay.push(delay_ms);
            }
            p.touch(at);
            p.recompute(&self.model);
        })?;
        Ok(())
    }

    fn mine_directory(&self, patterns: &dyn PatternStore, stored: &StoredEvent) -> Result<()> {
        let event = &stored.event;
        let at = event.timestamp;
        let extension = event.extension.clone().unwrap_or_default();
        let max_files = self.mining.directory_max_files.max(1);

        let seed = Pattern::seed(PatternPayload::directory(&event.directory_path), at, &self.model);
        patterns.reinforce(seed, &mut |p: &mut Pattern| {
            if let PatternPayload::DirectoryAffinity {
                extensions, files, ..
            } = &mut p.payload
            {
                *extensions.entry(extension.clone()).or_default() += 1;
                *files.entry(event.file_path.clone()).or_default() += 1;
                evict_least_used(files, max_files, &event.file_path);
            }
            p.touch(at);
            p.recompute(&self.model);
        })?;
        Ok(())
    }

    fn mine_frequency(&self, patterns: &dyn PatternStore, stored: &StoredEvent) -> Result<()> {
        let event = &stored.event;
        let at = event.timestamp;
        let day = at.timestamp().div_euclid(SECONDS_PER_DAY);
        let oldest_kept = day - i64::from(self.mining.frequency_window_days.max(1)) + 1;
        let hour = at.hour() as usize;

        let seed = Pattern::seed(PatternPayload::frequency(&event.file_path), at, &self.model);
        patterns.reinforce(seed, &mut |p: &mut Pattern| {
            if let PatternPayload::Frequency { daily, hourly, .. } = &mut p.payload {
                *daily.entry(day).or_default() += 1;
                daily.retain(|d, _| *d >= oldest_kept);
                hourly[hour] += 1;
            }
            p.touch(at);
            p.recompute(&self.model);
        })?;
        Ok(())
    }

    /// Keep the `max_neighbors` closest paths (ties by path).
    fn cap(&self, mut by_gap: Vec<(String, Duration)>) -> Vec<String> {
        by_gap.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        by_gap.truncate(self.mining.max_neighbors);
        by_gap.into_iter().map(|(path, _)| path).collect()
    }

    fn cap_neighbors(&self, neighbors: Vec<Neighbor>, at: DateTime<Utc>) -> Vec<Neighbor> {
        let mut neighbors = neighbors;
        neighbors.sort_by(|a, b| {
            distance(a.timestamp, at)
                .cmp(&distance(b.timestamp, at))
                .then_with(|| a.path.cmp(&b.path))
        });
        neighbors.truncate(self.mining.max_neighbors);
        neighbors
    }
}

fn distance(a: DateTime<Utc>, b: DateTime<Utc>) -> Duration {
    if a >= b {
        a - b
    } else {
        b - a
    }
}

/// Drop the least-accessed files (ties: lexicographically first) until at most
/// `max_files` remain. `keep` is never evicted.
fn evict_least_used(files: &mut BTreeMap<String, u64>, max_files: usize, keep: &str) {
    while files.len() > max_files {
        let victim = files
            .iter()
            .filter(|(path, _)| path.as_str() != keep)
            .min_by(|a, b| a.1.cmp(b.1).then_with(|| a.0.cmp(b.0)))
            .map(|(path, _)| path.clone());
        match victim {
            Some(path) => {
                files.remove(&path);
            }
            None => break,
        }
    }
}
