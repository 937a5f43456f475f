//! In-process [`EventStore`] for tests and embedding without SQLite.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::{EventCursor, EventFilter, EventPage, EventStats, EventStore, OperationEvent, Recorded, StoredEvent, TimeRange};
use crate::error::{Error, Result};
use crate::events::OperationKind;

#[derive(Default)]
struct Inner {
    /// Sorted by (timestamp, seq).
    events: Vec<StoredEvent>,
    by_key: HashMap<(i64, String, OperationKind), (String, i64)>,
    next_seq: i64,
}

#[derive(Default)]
pub struct MemoryEventStore {
    inner: Mutex<Inner>,
    unavailable: AtomicBool,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `StorageUnavailable` (outage simulation).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|i| i.events.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::StorageUnavailable("event store offline".into()));
        }
        Ok(())
    }
}

fn cursor_of(event: &StoredEvent) -> EventCursor {
    EventCursor::of(event)
}

impl EventStore for MemoryEventStore {
    fn record(&self, event: &OperationEvent) -> Result<Recorded> {
        self.check_available()?;
        let mut inner = self.inner.lock()?;

        let key = event.dedup_key();
        if let Some((id, seq)) = inner.by_key.get(&key) {
            return Ok(Recorded {
                id: id.clone(),
                seq: *seq,
                duplicate: true,
            });
        }

        inner.next_seq += 1;
        let seq = inner.next_seq;
        let stored = StoredEvent {
            id: uuid::Uuid::now_v7().to_string(),
            seq,
            event: event.clone(),
        };
        let position = {
            let cursor = cursor_of(&stored);
            inner.events.partition_point(|e| cursor_of(e) < cursor)
        };
        let id = stored.id.clone();
        inner.events.insert(position, stored);
        inner.by_key.insert(key, (id.clone(), seq));

        Ok(Recorded {
            id,
            seq,
            duplicate: false,
        })
    }

    fn fetch_page(
        &self,
        filter: &EventFilter,
        range: &TimeRange,
        after: Option<EventCursor>,
        limit: usize,
    ) -> Result<EventPage> {
        self.check_available()?;
        let inner = self.inner.lock()?;

        let start = match after {
            Some(cursor) => inner.events.partition_point(|e| cursor_of(e) <= cursor),
            None => 0,
        };

        let events = inner.events[start..]
            .iter()
            .filter(|e| range.contains(&e.event.timestamp) && filter.matches(&e.event))
            .take(limit)
            .cloned()
            .collect();
        Ok(EventPage::decoded(events))
    }

    fn stats(&self, since: Option<DateTime<Utc>>) -> Result<EventStats> {
        self.check_available()?;
        let inner = self.inner.lock()?;

        let window: Vec<&StoredEvent> = inner
            .events
            .iter()
            .filter(|e| since.map_or(true, |s| e.event.timestamp >= s))
            .collect();

        let files: HashSet<&str> = window.iter().map(|e| e.event.file_path.as_str()).collect();
        let dirs: HashSet<&str> = window
            .iter()
            .map(|e| e.event.directory_path.as_str())
            .collect();

        Ok(EventStats {
            total_operations: window.len() as u64,
            unique_files: files.len() as u64,
            unique_directories: dirs.len() as u64,
            oldest: window.first().map(|e| e.event.timestamp),
            newest: window.last().map(|e| e.event.timestamp),
            last_seq: window.iter().map(|e| e.seq).max(),
        })
    }
}
