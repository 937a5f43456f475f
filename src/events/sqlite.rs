//! SQLite-backed [`EventStore`] over the `file_operations` table.

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use std::collections::BTreeMap;

use super::{EventCursor, EventFilter, EventPage, EventStats, EventStore, OperationEvent, Recorded, StoredEvent, Stream, TimeRange};
use crate::db::{from_millis, to_millis, Db};
use crate::error::{Error, Result};

const SELECT_COLUMNS: &str = "id, seq, timestamp_ms, operation_kind, file_path, file_name, \
     extension, file_size, directory_path, context, session_id, device_id";

#[derive(Clone)]
pub struct SqliteEventStore {
    db: Db,
}

impl SqliteEventStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

impl EventStore for SqliteEventStore {
    fn record(&self, event: &OperationEvent) -> Result<Recorded> {
        let conn = self.db.lock()?;
        let context = if event.context.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&event.context)?)
        };
        let id = uuid::Uuid::now_v7().to_string();

        let inserted = conn.execute(
            "INSERT OR IGNORE INTO file_operations \
             (id, timestamp_ms, operation_kind, file_path, file_name, extension, file_size, \
              directory_path, context, session_id, device_id, recorded_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                id,
                to_millis(&event.timestamp),
                event.operation_kind.as_str(),
                event.file_path,
                event.file_name,
                event.extension,
                event.size.map(|s| s as i64),
                event.directory_path,
                context,
                event.session_id,
                event.device_id,
                to_millis(&Utc::now()),
            ],
        )?;

        if inserted == 1 {
            return Ok(Recorded {
                id,
                seq: conn.last_insert_rowid(),
                duplicate: false,
            });
        }

        let (existing_id, seq): (String, i64) = conn.query_row(
            "SELECT id, seq FROM file_operations \
             WHERE timestamp_ms = ?1 AND file_path = ?2 AND operation_kind = ?3",
            params![
                to_millis(&event.timestamp),
                event.file_path,
                event.operation_kind.as_str()
            ],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        tracing::debug!(id = %existing_id, path = %event.file_path, "duplicate event ignored");

        Ok(Recorded {
            id: existing_id,
            seq,
            duplicate: true,
        })
    }

    fn fetch_page(
        &self,
        filter: &EventFilter,
        range: &TimeRange,
        after: Option<EventCursor>,
        limit: usize,
    ) -> Result<EventPage> {
        let (where_clause, values) = build_where(filter, range, after);
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM file_operations {where_clause} \
             ORDER BY timestamp_ms ASC, seq ASC LIMIT {limit}"
        );

        let conn = self.db.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), read_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut page = EventPage {
            rows_read: rows.len(),
            ..Default::default()
        };
        for raw in rows {
            page.cursor = Some(EventCursor {
                timestamp_ms: raw.timestamp_ms,
                seq: raw.seq,
            });
            let id = raw.id.clone();
            match decode_row(raw) {
                Ok(stored) => page.events.push(stored),
                Err(e) => {
                    tracing::warn!(id = %id, error = %e, "undecodable event skipped");
                    page.skipped += 1;
                }
            }
        }
        Ok(page)
    }

    fn stats(&self, since: Option<DateTime<Utc>>) -> Result<EventStats> {
        let conn = self.db.lock()?;
        let since_ms = since.map(|s| to_millis(&s)).unwrap_or(i64::MIN);

        let (total, files, dirs, oldest, newest, last_seq): (i64, i64, i64, Option<i64>, Option<i64>, Option<i64>) =
            conn.query_row(
                "SELECT COUNT(*), COUNT(DISTINCT file_path), COUNT(DISTINCT directory_path), \
                 MIN(timestamp_ms), MAX(timestamp_ms), MAX(seq) \
                 FROM file_operations WHERE timestamp_ms >= ?1",
                params![since_ms],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                    ))
                },
            )?;

        Ok(EventStats {
            total_operations: total as u64,
            unique_files: files as u64,
            unique_directories: dirs as u64,
            oldest: oldest.map(from_millis),
            newest: newest.map(from_millis),
            last_seq,
        })
    }
}

impl SqliteEventStore {
    /// Look up a single event by id.
    pub fn get(&self, id: &str) -> Result<Option<StoredEvent>> {
        let conn = self.db.lock()?;
        let raw = conn
            .query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM file_operations WHERE id = ?1"),
                params![id],
                read_row,
            )
            .optional()?;
        raw.map(decode_row).transpose()
    }
}

fn build_where(
    filter: &EventFilter,
    range: &TimeRange,
    after: Option<EventCursor>,
) -> (String, Vec<Value>) {
    let mut clauses: Vec<String> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    if let Some(start) = range.start_millis() {
        let p = bind(&mut values, Value::Integer(start));
        clauses.push(format!("timestamp_ms >= {p}"));
    }
    if let Some(end) = range.end_millis() {
        let p = bind(&mut values, Value::Integer(end));
        clauses.push(format!("timestamp_ms < {p}"));
    }
    if let Some(cursor) = after {
        let ts = bind(&mut values, Value::Integer(cursor.timestamp_ms));
        let seq = bind(&mut values, Value::Integer(cursor.seq));
        clauses.push(format!(
            "(timestamp_ms > {ts} OR (timestamp_ms = {ts} AND seq > {seq}))"
        ));
    }

    let text_filters = [
        ("file_path", filter.file_path.clone()),
        ("directory_path", filter.directory_path.clone()),
        ("operation_kind", filter.operation_kind.map(|k| k.as_str().to_string())),
        ("session_id", filter.session_id.clone()),
        ("device_id", filter.device_id.clone()),
    ];
    for (column, value) in text_filters {
        if let Some(value) = value {
            let p = bind(&mut values, Value::Text(value));
            clauses.push(format!("{column} = {p}"));
        }
    }

    match &filter.stream {
        Some(Stream::Session(session)) => {
            let p = bind(&mut values, Value::Text(session.clone()));
            clauses.push(format!("session_id = {p}"));
        }
        Some(Stream::Device(device)) => {
            let p = bind(&mut values, Value::Text(device.clone()));
            clauses.push(format!("session_id IS NULL AND device_id = {p}"));
        }
        Some(Stream::Global) => {
            clauses.push("session_id IS NULL AND device_id IS NULL".into());
        }
        None => {}
    }

    let where_clause = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    (where_clause, values)
}

/// Append a parameter value and return its numbered placeholder.
fn bind(values: &mut Vec<Value>, value: Value) -> String {
    values.push(value);
    format!("?{}", values.len())
}

/// Raw column values; decoding happens outside the rusqlite row closure so
/// JSON errors surface as `Corrupt` rather than as SQL errors.
struct RawRow {
    id: String,
    seq: i64,
    timestamp_ms: i64,
    operation_kind: String,
    file_path: String,
    file_name: String,
    extension: Option<String>,
    file_size: Option<i64>,
    directory_path: String,
    context: Option<String>,
    session_id: Option<String>,
    device_id: Option<String>,
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<RawRow> {
    Ok(RawRow {
        id: row.get(0)?,
        seq: row.get(1)?,
        timestamp_ms: row.get(2)?,
        operation_kind: row.get(3)?,
        file_path: row.get(4)?,
        file_name: row.get(5)?,
        extension: row.get(6)?,
        file_size: row.get(7)?,
        directory_path: row.get(8)?,
        context: row.get(9)?,
        session_id: row.get(10)?,
        device_id: row.get(11)?,
    })
}

fn decode_row(raw: RawRow) -> Result<StoredEvent> {
    let operation_kind = raw
        .operation_kind
        .parse()
        .map_err(|e: String| Error::Corrupt(format!("event {}: {e}", raw.id)))?;
    let context: BTreeMap<String, serde_json::Value> = match raw.context {
        Some(json) => serde_json::from_str(&json)?,
        None => BTreeMap::new(),
    };

    Ok(StoredEvent {
        id: raw.id,
        seq: raw.seq,
        event: OperationEvent {
            timestamp: from_millis(raw.timestamp_ms),
            operation_kind,
            file_path: raw.file_path,
            file_name: raw.file_name,
            extension: raw.extension,
            size: raw.file_size.map(|s| s.max(0) as u64),
            directory_path: raw.directory_path,
            context,
            session_id: raw.session_id,
            device_id: raw.device_id,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::events::{query, OperationKind};
    use chrono::Duration;

    fn store() -> SqliteEventStore {
        SqliteEventStore::new(db::shared(db::open_memory_database().unwrap()))
    }

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-02-01T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn record_and_get_preserves_fields() {
        let store = store();
        let mut ev = OperationEvent::new(OperationKind::Write, "/proj/a.rs", t0())
            .with_session("s1")
            .with_size(42);
        ev.context.insert("app".into(), serde_json::json!("editor"));

        let recorded = store.record(&ev).unwrap();
        let back = store.get(&recorded.id).unwrap().unwrap();
        assert_eq!(back.event, ev);
        assert_eq!(back.seq, recorded.seq);
    }

    #[test]
    fn paging_walks_ties_in_insertion_order() {
        let store = store();
        for path in ["/c", "/a", "/b"] {
            store
                .record(&OperationEvent::new(OperationKind::Read, path, t0()))
                .unwrap();
        }
        store
            .record(&OperationEvent::new(OperationKind::Read, "/d", t0() + Duration::seconds(1)))
            .unwrap();

        let paths: Vec<String> = query(&store, EventFilter::default(), TimeRange::all())
            .page_size(1)
            .map(|e| e.unwrap().event.file_path)
            .collect();
        assert_eq!(paths, vec!["/c", "/a", "/b", "/d"]);
    }

    #[test]
    fn undecodable_rows_are_skipped_without_ending_the_scan() {
        let db = db::shared(db::open_memory_database().unwrap());
        let store = SqliteEventStore::new(db.clone());
        let mut ids = Vec::new();
        for (i, path) in ["/a", "/b", "/c", "/d"].iter().enumerate() {
            let ev = OperationEvent::new(OperationKind::Read, *path, t0() + Duration::seconds(i as i64));
            ids.push(store.record(&ev).unwrap().id);
        }
        db.lock()
            .unwrap()
            .execute(
                "UPDATE file_operations SET context = '{broken' WHERE id = ?1",
                params![ids[1]],
            )
            .unwrap();

        for page_size in [1, 2, 256] {
            let mut scan = query(&store, EventFilter::default(), TimeRange::all()).page_size(page_size);
            let paths: Vec<String> = scan.by_ref().map(|e| e.unwrap().event.file_path).collect();
            assert_eq!(paths, vec!["/a", "/c", "/d"], "page size {page_size}");
            assert_eq!(scan.skipped(), 1);
        }
        assert!(matches!(store.get(&ids[1]), Err(Error::Corrupt(_))));
    }

    #[test]
    fn stream_filters_exclude_other_streams() {
        let store = store();
        store
            .record(&OperationEvent::new(OperationKind::Read, "/s", t0()).with_session("s1"))
            .unwrap();
        store
            .record(&OperationEvent::new(OperationKind::Read, "/d", t0()).with_device("desk"))
            .unwrap();
        store
            .record(&OperationEvent::new(OperationKind::Read, "/g", t0()))
            .unwrap();

        let in_stream = |stream: Stream| -> Vec<String> {
            query(&store, EventFilter::for_stream(stream), TimeRange::all())
                .map(|e| e.unwrap().event.file_path)
                .collect()
        };
        assert_eq!(in_stream(Stream::Session("s1".into())), vec!["/s"]);
        assert_eq!(in_stream(Stream::Device("desk".into())), vec!["/d"]);
        assert_eq!(in_stream(Stream::Global), vec!["/g"]);
    }

    #[test]
    fn stats_count_distinct_files_and_directories() {
        let store = store();
        store
            .record(&OperationEvent::new(OperationKind::Read, "/p/a", t0()))
            .unwrap();
        store
            .record(&OperationEvent::new(OperationKind::Write, "/p/a", t0() + Duration::seconds(1)))
            .unwrap();
        store
            .record(&OperationEvent::new(OperationKind::Read, "/q/b", t0() + Duration::seconds(2)))
            .unwrap();

        let stats = store.stats(None).unwrap();
        assert_eq!(stats.total_operations, 3);
        assert_eq!(stats.unique_files, 2);
        assert_eq!(stats.unique_directories, 2);
        assert_eq!(stats.oldest, Some(t0()));

        let recent = store.stats(Some(t0() + Duration::seconds(2))).unwrap();
        assert_eq!(recent.total_operations, 1);
    }
}
