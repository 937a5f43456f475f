//! In-process [`PatternStore`] with one lock per pattern.
//!
//! The map lock is only held to find or insert a slot; all read-modify-write happens
//! under the slot's own mutex, so concurrent updates to different keys never wait
//! on each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use super::{sort_by_confidence, Pattern, PatternChange, PatternKey, PatternKind, PatternStats, PatternStore};
use crate::error::Result;

type Slot = Arc<Mutex<Pattern>>;

#[derive(Default)]
pub struct MemoryPatternStore {
    slots: RwLock<HashMap<PatternKey, Slot>>,
}

impl MemoryPatternStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &PatternKey) -> Result<Option<Slot>> {
        Ok(self.slots.read()?.get(key).cloned())
    }

    fn all_slots(&self) -> Result<Vec<Slot>> {
        Ok(self.slots.read()?.values().cloned().collect())
    }

    fn snapshot(&self) -> Result<Vec<Pattern>> {
        self.all_slots()?
            .iter()
            .map(|slot| Ok(slot.lock()?.clone()))
            .collect()
    }
}

impl PatternStore for MemoryPatternStore {
    fn upsert(&self, pattern: &Pattern) -> Result<()> {
        if let Some(slot) = self.slot(&pattern.key)? {
            *slot.lock()? = pattern.clone();
            return Ok(());
        }
        let slot = self
            .slots
            .write()?
            .entry(pattern.key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(pattern.clone())))
            .clone();
        *slot.lock()? = pattern.clone();
        Ok(())
    }

    fn get(&self, key: &PatternKey) -> Result<Option<Pattern>> {
        match self.slot(key)? {
            Some(slot) => Ok(Some(slot.lock()?.clone())),
            None => Ok(None),
        }
    }

    fn list(&self, kind: Option<PatternKind>, min_confidence: f64) -> Result<Vec<Pattern>> {
        let mut patterns: Vec<Pattern> = self
            .snapshot()?
            .into_iter()
            .filter(|p| {
                !p.retired
                    && p.confidence >= min_confidence
                    && kind.map_or(true, |k| p.kind() == k)
            })
            .collect();
        sort_by_confidence(&mut patterns);
        Ok(patterns)
    }

    fn keys(&self) -> Result<Vec<PatternKey>> {
        let mut keys: Vec<PatternKey> = self.slots.read()?.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    fn update(
        &self,
        key: &PatternKey,
        _change: PatternChange,
        f: &mut dyn FnMut(&mut Pattern),
    ) -> Result<Option<Pattern>> {
        let Some(slot) = self.slot(key)? else {
            return Ok(None);
        };
        let mut pattern = slot.lock()?;
        f(&mut pattern);
        Ok(Some(pattern.clone()))
    }

    fn reinforce(&self, seed: Pattern, f: &mut dyn FnMut(&mut Pattern)) -> Result<Pattern> {
        let slot = match self.slot(&seed.key)? {
            Some(slot) => slot,
            None => {
                let mut slots = self.slots.write()?;
                slots
                    .entry(seed.key.clone())
                    .or_insert_with(|| Arc::new(Mutex::new(seed)))
                    .clone()
            }
        };
        let mut pattern = slot.lock()?;
        f(&mut pattern);
        Ok(pattern.clone())
    }

    fn clear(&self) -> Result<usize> {
        let mut slots = self.slots.write()?;
        let removed = slots.len();
        slots.clear();
        Ok(removed)
    }

    fn stats(&self) -> Result<PatternStats> {
        let patterns = self.snapshot()?;
        Ok(PatternStats::from_patterns(&patterns))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PatternConfig;
    use crate::patterns::PatternPayload;
    use chrono::{DateTime, Duration, Utc};

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn bump(p: &mut Pattern) {
        if let PatternPayload::CoAccess { co_occurrences, .. } = &mut p.payload {
            *co_occurrences += 1;
        }
        p.recompute(&PatternConfig::default());
    }

    #[test]
    fn reinforce_inserts_then_updates() {
        let store = MemoryPatternStore::new();
        let model = PatternConfig::default();
        let seed = || Pattern::seed(PatternPayload::co_access("/a", "/b"), t0(), &model);

        store.reinforce(seed(), &mut bump).unwrap();
        let p = store.reinforce(seed(), &mut bump).unwrap();
        assert!((p.confidence - 2.0 / 5.0).abs() < 1e-12);
        assert_eq!(store.keys().unwrap().len(), 1);
    }

    #[test]
    fn concurrent_reinforcement_loses_no_updates() {
        let store = Arc::new(MemoryPatternStore::new());
        let model = PatternConfig::default();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                let model = model.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        let seed = Pattern::seed(PatternPayload::co_access("/a", "/b"), t0(), &model);
                        store.reinforce(seed, &mut bump).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let p = store.get(&PatternKey::co_access("/a", "/b")).unwrap().unwrap();
        match p.payload {
            PatternPayload::CoAccess { co_occurrences, .. } => assert_eq!(co_occurrences, 400),
            _ => panic!("wrong payload"),
        }
    }

    #[test]
    fn list_excludes_retired_and_low_confidence() {
        let store = MemoryPatternStore::new();
        let model = PatternConfig::default();
        for (a, n) in [("/x", 9), ("/y", 1)] {
            let seed = Pattern::seed(PatternPayload::co_access(a, "/z"), t0(), &model);
            store
                .reinforce(seed, &mut |p: &mut Pattern| {
                    for _ in 0..n {
                        bump(p);
                    }
                })
                .unwrap();
        }

        assert_eq!(store.list(None, 0.0).unwrap().len(), 2);
        let report = store.decay(t0() + Duration::days(200), &model).unwrap();
        assert_eq!(report.examined, 2);
        assert_eq!(report.retired, 1);

        let listed = store.list(Some(PatternKind::CoAccess), 0.0).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].key, PatternKey::co_access("/x", "/z"));
        assert_eq!(store.stats().unwrap().retired_patterns, 1);
    }
}
