#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use exocortex::config::{MiningConfig, PatternConfig};
use exocortex::db::{self, Db};
use exocortex::events::sqlite::SqliteEventStore;
use exocortex::events::{
    EventCursor, EventFilter, EventPage, EventStats, EventStore, OperationEvent, OperationKind,
    Recorded, StoredEvent, TimeRange,
};
use exocortex::mining::PatternMiner;
use exocortex::patterns::sqlite::SqlitePatternStore;
use exocortex::patterns::{
    DecayReport, Pattern, PatternChange, PatternKey, PatternKind, PatternPayload, PatternStats,
    PatternStore,
};
use rusqlite::Connection;
use std::sync::atomic::{AtomicBool, Ordering};

/// Open a fresh in-memory database with schema and migrations applied.
pub fn test_db() -> Connection {
    db::open_memory_database().unwrap()
}

/// SQLite-backed event and pattern stores sharing one in-memory connection.
pub fn sqlite_stores() -> (Db, SqliteEventStore, SqlitePatternStore) {
    let db = db::shared(test_db());
    (
        db.clone(),
        SqliteEventStore::new(db.clone()),
        SqlitePatternStore::new(db),
    )
}

pub fn default_miner() -> PatternMiner {
    PatternMiner::new(MiningConfig::default(), PatternConfig::default())
}

/// Fixed reference instant used across tests.
pub fn t0() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-03-02T09:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

/// A read of `path` at `t0 + secs`, in `session`.
pub fn read_at(path: &str, secs: i64, session: &str) -> OperationEvent {
    OperationEvent::new(OperationKind::Read, path, t0() + Duration::seconds(secs)).with_session(session)
}

/// Record `event` and, unless it is a duplicate, mine it. Returns what the store reported.
pub fn ingest(
    events: &dyn EventStore,
    patterns: &dyn PatternStore,
    miner: &PatternMiner,
    event: OperationEvent,
) -> Recorded {
    let recorded = events.record(&event).unwrap();
    if !recorded.duplicate {
        let stored = StoredEvent {
            id: recorded.id.clone(),
            seq: recorded.seq,
            event,
        };
        miner.learn(events, patterns, &stored).unwrap();
    }
    recorded
}

pub fn co_occurrences(patterns: &dyn PatternStore, a: &str, b: &str) -> u64 {
    match patterns.get(&PatternKey::co_access(a, b)).unwrap() {
        Some(p) => match p.payload {
            PatternPayload::CoAccess { co_occurrences, .. } => co_occurrences,
            _ => panic!("wrong payload kind"),
        },
        None => 0,
    }
}

pub fn frequency_count(patterns: &dyn PatternStore, path: &str) -> u64 {
    patterns
        .get(&PatternKey::frequency(path))
        .unwrap()
        .map(|p| p.payload.window_count())
        .unwrap_or(0)
}

/// Event store whose every call blocks for `delay` before delegating.
pub struct SlowEventStore<S> {
    pub inner: S,
    pub delay: std::time::Duration,
}

impl<S: EventStore> EventStore for SlowEventStore<S> {
    fn record(&self, event: &OperationEvent) -> exocortex::Result<Recorded> {
        std::thread::sleep(self.delay);
        self.inner.record(event)
    }

    fn fetch_page(
        &self,
        filter: &EventFilter,
        range: &TimeRange,
        after: Option<EventCursor>,
        limit: usize,
    ) -> exocortex::Result<EventPage> {
        std::thread::sleep(self.delay);
        self.inner.fetch_page(filter, range, after, limit)
    }

    fn stats(&self, since: Option<DateTime<Utc>>) -> exocortex::Result<EventStats> {
        std::thread::sleep(self.delay);
        self.inner.stats(since)
    }
}

/// Event store that blocks for `delay` on the calls switched on with
/// [`stall_next_record`](Self::stall_next_record) and [`stall_pages`](Self::stall_pages).
pub struct StallingEventStore<S> {
    pub inner: S,
    pub delay: std::time::Duration,
    next_record: AtomicBool,
    pages: AtomicBool,
}

impl<S> StallingEventStore<S> {
    pub fn new(inner: S, delay: std::time::Duration) -> Self {
        Self {
            inner,
            delay,
            next_record: AtomicBool::new(false),
            pages: AtomicBool::new(false),
        }
    }

    /// The next `record` call blocks before it is stored.
    pub fn stall_next_record(&self) {
        self.next_record.store(true, Ordering::SeqCst);
    }

    /// Every `fetch_page` call blocks while set.
    pub fn stall_pages(&self, stall: bool) {
        self.pages.store(stall, Ordering::SeqCst);
    }
}

impl<S: EventStore> EventStore for StallingEventStore<S> {
    fn record(&self, event: &OperationEvent) -> exocortex::Result<Recorded> {
        if self.next_record.swap(false, Ordering::SeqCst) {
            std::thread::sleep(self.delay);
        }
        self.inner.record(event)
    }

    fn fetch_page(
        &self,
        filter: &EventFilter,
        range: &TimeRange,
        after: Option<EventCursor>,
        limit: usize,
    ) -> exocortex::Result<EventPage> {
        if self.pages.load(Ordering::SeqCst) {
            std::thread::sleep(self.delay);
        }
        self.inner.fetch_page(filter, range, after, limit)
    }

    fn stats(&self, since: Option<DateTime<Utc>>) -> exocortex::Result<EventStats> {
        self.inner.stats(since)
    }
}

/// Pattern store whose `list` blocks for `delay`; everything else passes through.
pub struct SlowListPatternStore<S> {
    pub inner: S,
    pub delay: std::time::Duration,
}

impl<S: PatternStore> PatternStore for SlowListPatternStore<S> {
    fn upsert(&self, pattern: &Pattern) -> exocortex::Result<()> {
        self.inner.upsert(pattern)
    }

    fn get(&self, key: &PatternKey) -> exocortex::Result<Option<Pattern>> {
        self.inner.get(key)
    }

    fn list(&self, kind: Option<PatternKind>, min_confidence: f64) -> exocortex::Result<Vec<Pattern>> {
        std::thread::sleep(self.delay);
        self.inner.list(kind, min_confidence)
    }

    fn keys(&self) -> exocortex::Result<Vec<PatternKey>> {
        self.inner.keys()
    }

    fn update(
        &self,
        key: &PatternKey,
        change: PatternChange,
        f: &mut dyn FnMut(&mut Pattern),
    ) -> exocortex::Result<Option<Pattern>> {
        self.inner.update(key, change, f)
    }

    fn reinforce(&self, seed: Pattern, f: &mut dyn FnMut(&mut Pattern)) -> exocortex::Result<Pattern> {
        self.inner.reinforce(seed, f)
    }

    fn clear(&self) -> exocortex::Result<usize> {
        self.inner.clear()
    }

    fn stats(&self) -> exocortex::Result<PatternStats> {
        self.inner.stats()
    }

    fn decay(&self, now: DateTime<Utc>, model: &PatternConfig) -> exocortex::Result<DecayReport> {
        self.inner.decay(now, model)
    }
}
