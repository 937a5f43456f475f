//! Event Store: the durable, append-only log of file operations.
//!
//! [`EventStore`] is the injected storage seam: [`sqlite::SqliteEventStore`] in
//! production, [`memory::MemoryEventStore`] as an in-process fake. Reads go through
//! [`query`], a lazy keyset-paged iterator that is finite, restartable, and ordered by
//! timestamp ascending (insertion order breaks ties).

pub mod memory;
pub mod sqlite;
pub mod types;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::VecDeque;

use crate::error::Result;
pub use types::{EventId, EventInput, OperationEvent, OperationKind, Recorded, StoredEvent, Stream};

/// Rows fetched per round trip by [`EventQuery`].
pub const DEFAULT_PAGE_SIZE: usize = 256;

pub trait EventStore: Send + Sync {
    /// Append an event. Durable before returning. Duplicate (timestamp, path, kind)
    /// triples return the existing id with `duplicate = true`.
    fn record(&self, event: &OperationEvent) -> Result<Recorded>;

    /// Read up to `limit` rows strictly after `after`, ascending. Rows that fail to
    /// decode are skipped, but still move the page cursor.
    fn fetch_page(
        &self,
        filter: &EventFilter,
        range: &TimeRange,
        after: Option<EventCursor>,
        limit: usize,
    ) -> Result<EventPage>;

    /// Aggregate counts over events at or after `since` (all events when `None`).
    fn stats(&self, since: Option<DateTime<Utc>>) -> Result<EventStats>;
}

/// Equality filters applied by [`EventStore::fetch_page`]. Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventFilter {
    pub file_path: Option<String>,
    pub directory_path: Option<String>,
    pub operation_kind: Option<OperationKind>,
    pub session_id: Option<String>,
    pub device_id: Option<String>,
    pub stream: Option<Stream>,
}

impl EventFilter {
    pub fn for_stream(stream: Stream) -> Self {
        Self {
            stream: Some(stream),
            ..Default::default()
        }
    }

    pub fn for_path(path: impl Into<String>) -> Self {
        Self {
            file_path: Some(path.into()),
            ..Default::default()
        }
    }

    pub fn matches(&self, event: &OperationEvent) -> bool {
        fn eq(want: &Option<String>, have: &str) -> bool {
            want.as_deref().map_or(true, |w| w == have)
        }
        fn eq_opt(want: &Option<String>, have: &Option<String>) -> bool {
            want.is_none() || want == have
        }

        eq(&self.file_path, &event.file_path)
            && eq(&self.directory_path, &event.directory_path)
            && self
                .operation_kind
                .map_or(true, |k| k == event.operation_kind)
            && eq_opt(&self.session_id, &event.session_id)
            && eq_opt(&self.device_id, &event.device_id)
            && self.stream.as_ref().map_or(true, |s| *s == event.stream())
    }
}

/// Half-open `[start, end)` time range. Either bound may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn since(start: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: None,
        }
    }

    /// `[at - window, at + window]`, both ends inclusive.
    pub fn around(at: DateTime<Utc>, window: Duration) -> Self {
        Self::between(at - window, at + window + Duration::milliseconds(1))
    }

    pub fn contains(&self, ts: &DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| *ts >= s) && self.end.map_or(true, |e| *ts < e)
    }

    pub(crate) fn start_millis(&self) -> Option<i64> {
        self.start.map(|t| t.timestamp_millis())
    }

    pub(crate) fn end_millis(&self) -> Option<i64> {
        self.end.map(|t| t.timestamp_millis())
    }
}

/// Keyset position: the last (timestamp, seq) already delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct EventCursor {
    pub timestamp_ms: i64,
    pub seq: i64,
}

impl EventCursor {
    pub fn of(event: &StoredEvent) -> Self {
        Self {
            timestamp_ms: event.event.timestamp.timestamp_millis(),
            seq: event.seq,
        }
    }
}

/// One round trip of [`EventStore::fetch_page`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventPage {
    pub events: Vec<StoredEvent>,
    /// Position of the last row read, decoded or not.
    pub cursor: Option<EventCursor>,
    /// Rows read from storage. Fewer than the limit ends the scan.
    pub rows_read: usize,
    /// Rows that could not be decoded.
    pub skipped: usize,
}

impl EventPage {
    /// A page where every row decoded.
    pub fn decoded(events: Vec<StoredEvent>) -> Self {
        Self {
            cursor: events.last().map(EventCursor::of),
            rows_read: events.len(),
            skipped: 0,
            events,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EventStats {
    pub total_operations: u64,
    pub unique_files: u64,
    pub unique_directories: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newest: Option<DateTime<Utc>>,
    /// Highest ingestion sequence number in the window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seq: Option<i64>,
}

/// Lazily iterate events matching `filter` within `range`, oldest first.
///
/// The iterator holds no lock between pages; calling `query` again restarts it.
pub fn query<'a>(store: &'a dyn EventStore, filter: EventFilter, range: TimeRange) -> EventQuery<'a> {
    EventQuery {
        store,
        filter,
        range,
        after: None,
        buffer: VecDeque::new(),
        page_size: DEFAULT_PAGE_SIZE,
        exhausted: false,
        skipped: 0,
    }
}

pub struct EventQuery<'a> {
    store: &'a dyn EventStore,
    filter: EventFilter,
    range: TimeRange,
    after: Option<EventCursor>,
    buffer: VecDeque<StoredEvent>,
    page_size: usize,
    exhausted: bool,
    skipped: usize,
}

impl EventQuery<'_> {
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Undecodable rows passed over so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl Iterator for EventQuery<'_> {
    type Item = Result<StoredEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(event) = self.buffer.pop_front() {
                return Some(Ok(event));
            }
            if self.exhausted {
                return None;
            }
            match self
                .store
                .fetch_page(&self.filter, &self.range, self.after, self.page_size)
            {
                Ok(page) => {
                    self.exhausted = page.rows_read < self.page_size || page.cursor.is_none();
                    if page.cursor.is_some() {
                        self.after = page.cursor;
                    }
                    self.skipped += page.skipped;
                    self.buffer.extend(page.events);
                }
                Err(e) => {
                    self.exhausted = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
