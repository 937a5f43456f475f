pub mod migrations;
pub mod schema;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Shared handle to the single SQLite connection used by the SQLite-backed stores.
pub type Db = Arc<Mutex<Connection>>;

/// Open (or create) the Exocortex database at the given path with the schema
/// initialized and all migrations applied.
pub fn open_database(path: impl AsRef<Path>) -> Result<Connection> {
    let path = path.as_ref();

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    let conn = Connection::open(path)
        .with_context(|| format!("failed to open database at {}", path.display()))?;

    // WAL lets prediction reads proceed while ingestion appends
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "busy_timeout", 5000)?;

    schema::init_schema(&conn).context("failed to initialize schema")?;
    migrations::run_migrations(&conn).context("failed to run migrations")?;

    tracing::info!(path = %path.display(), "database initialized");
    Ok(conn)
}

/// Open an in-memory database with schema and migrations applied.
pub fn open_memory_database() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
    schema::init_schema(&conn).context("failed to initialize schema")?;
    migrations::run_migrations(&conn).context("failed to run migrations")?;
    Ok(conn)
}

/// Wrap a connection for sharing between stores.
pub fn shared(conn: Connection) -> Db {
    Arc::new(Mutex::new(conn))
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub integrity_ok: bool,
    pub schema_version: u32,
    pub operation_count: u64,
    pub pattern_count: u64,
    pub log_count: u64,
}

/// Run SQLite's integrity check and gather row counts.
pub fn check_database_health(conn: &Connection) -> rusqlite::Result<HealthReport> {
    let integrity: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
    let count = |table: &str| -> rusqlite::Result<u64> {
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
            row.get::<_, i64>(0)
        })
        .map(|n| n as u64)
    };

    Ok(HealthReport {
        integrity_ok: integrity == "ok",
        schema_version: migrations::get_schema_version(conn)?,
        operation_count: count("file_operations")?,
        pattern_count: count("patterns")?,
        log_count: count("pattern_log")?,
    })
}

/// Timestamps are stored as epoch milliseconds.
pub fn to_millis(ts: &DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millis_round_trip_truncates_to_millisecond() {
        let ts = DateTime::parse_from_rfc3339("2026-03-01T09:30:00.123456Z")
            .unwrap()
            .with_timezone(&Utc);
        let back = from_millis(to_millis(&ts));
        assert_eq!(back.timestamp_millis(), ts.timestamp_millis());
        assert_eq!(back.timestamp_subsec_micros(), 123_000);
    }

    #[test]
    fn health_check_on_fresh_database() {
        let conn = open_memory_database().unwrap();
        let report = check_database_health(&conn).unwrap();
        assert!(report.integrity_ok);
        assert_eq!(report.schema_version, migrations::CURRENT_SCHEMA_VERSION);
        assert_eq!(report.operation_count, 0);
        assert_eq!(report.pattern_count, 0);
    }
}
