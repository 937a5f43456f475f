//! SQL DDL for all Exocortex tables.
//!
//! Defines the append-only `file_operations` log, the `patterns` table (kind
//! discriminator plus JSON payload), the `pattern_log` audit trail, and
//! `schema_meta`. All DDL uses `IF NOT EXISTS` for idempotent initialization.

use rusqlite::Connection;

const SCHEMA_SQL: &str = r#"
-- Append-only operation log
CREATE TABLE IF NOT EXISTS file_operations (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    timestamp_ms INTEGER NOT NULL,
    operation_kind TEXT NOT NULL CHECK(operation_kind IN ('create','read','write','delete','rename','move')),
    file_path TEXT NOT NULL,
    file_name TEXT NOT NULL,
    extension TEXT,
    file_size INTEGER,
    directory_path TEXT NOT NULL,
    context TEXT,
    session_id TEXT,
    device_id TEXT,
    recorded_at INTEGER NOT NULL,
    UNIQUE(timestamp_ms, file_path, operation_kind)
);

CREATE INDEX IF NOT EXISTS idx_ops_time ON file_operations(timestamp_ms, seq);
CREATE INDEX IF NOT EXISTS idx_ops_path ON file_operations(file_path);
CREATE INDEX IF NOT EXISTS idx_ops_directory ON file_operations(directory_path);
CREATE INDEX IF NOT EXISTS idx_ops_session ON file_operations(session_id, timestamp_ms);

-- Learned patterns
CREATE TABLE IF NOT EXISTS patterns (
    key TEXT PRIMARY KEY,
    kind TEXT NOT NULL CHECK(kind IN ('co_access','sequential','directory_affinity','frequency')),
    payload TEXT NOT NULL,
    confidence REAL NOT NULL CHECK(confidence >= 0.0 AND confidence <= 1.0),
    hit_count INTEGER NOT NULL DEFAULT 0,
    miss_count INTEGER NOT NULL DEFAULT 0,
    decay_weight REAL NOT NULL DEFAULT 1.0,
    last_used INTEGER NOT NULL,
    decayed_through INTEGER NOT NULL,
    retired INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_patterns_kind ON patterns(kind, retired, confidence);

-- Audit log
CREATE TABLE IF NOT EXISTS pattern_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    operation TEXT NOT NULL CHECK(operation IN ('upsert','reinforce','hit','miss','decay','retire','clear')),
    pattern_key TEXT NOT NULL,
    details TEXT,
    created_at INTEGER NOT NULL
);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    // Set initial schema version if not already present
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}
