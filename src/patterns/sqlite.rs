//! SQLite-backed [`PatternStore`] over the `patterns` table.
//!
//! Each read-modify-write runs in its own transaction covering exactly one row, so
//! the connection is never held across more than a single pattern. Hits, misses,
//! retirements, and clears are written to `pattern_log`.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;

use super::{
    decay_each, DecayReport, Pattern, PatternChange, PatternKey, PatternKind, PatternPayload,
    PatternStats, PatternStore,
};
use crate::config::PatternConfig;
use crate::db::{from_millis, to_millis, Db};
use crate::error::{Error, Result};

const SELECT_COLUMNS: &str = "key, payload, confidence, hit_count, miss_count, decay_weight, \
     last_used, decayed_through, retired, created_at";

#[derive(Clone)]
pub struct SqlitePatternStore {
    db: Db,
}

impl SqlitePatternStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

/// Append an entry to the `pattern_log` audit table.
pub fn write_audit_log(
    conn: &Connection,
    operation: &str,
    pattern_key: &str,
    details: Option<&serde_json::Value>,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO pattern_log (operation, pattern_key, details, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![
            operation,
            pattern_key,
            details.map(|d| d.to_string()),
            to_millis(&Utc::now()),
        ],
    )?;
    Ok(())
}

fn write_pattern(conn: &Connection, pattern: &Pattern) -> Result<()> {
    let payload = serde_json::to_string(&pattern.payload)?;
    conn.execute(
        "INSERT INTO patterns \
         (key, kind, payload, confidence, hit_count, miss_count, decay_weight, \
          last_used, decayed_through, retired, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12) \
         ON CONFLICT(key) DO UPDATE SET \
            payload = excluded.payload, \
            confidence = excluded.confidence, \
            hit_count = excluded.hit_count, \
            miss_count = excluded.miss_count, \
            decay_weight = excluded.decay_weight, \
            last_used = excluded.last_used, \
            decayed_through = excluded.decayed_through, \
            retired = excluded.retired, \
            updated_at = excluded.updated_at",
        params![
            pattern.key.as_str(),
            pattern.kind().as_str(),
            payload,
            pattern.confidence,
            pattern.hit_count as i64,
            pattern.miss_count as i64,
            pattern.decay_weight,
            to_millis(&pattern.last_used),
            to_millis(&pattern.decayed_through),
            pattern.retired,
            to_millis(&pattern.created_at),
            to_millis(&Utc::now()),
        ],
    )?;
    Ok(())
}

fn read_pattern(conn: &Connection, key: &PatternKey) -> Result<Option<Pattern>> {
    let raw = conn
        .query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM patterns WHERE key = ?1"),
            params![key.as_str()],
            read_row,
        )
        .optional()?;
    raw.map(decode_row).transpose()
}

/// Log the feedback and retirement transitions worth auditing.
fn audit_change(conn: &Connection, change: PatternChange, before: &Pattern, after: &Pattern) -> Result<()> {
    let details = serde_json::json!({
        "confidence_before": before.confidence,
        "confidence_after": after.confidence,
        "hit_count": after.hit_count,
        "miss_count": after.miss_count,
    });
    match change {
        PatternChange::Hit | PatternChange::Miss => {
            write_audit_log(conn, change.as_str(), after.key.as_str(), Some(&details))?;
        }
        PatternChange::Reinforce | PatternChange::Decay => {}
    }
    if after.retired && !before.retired {
        write_audit_log(conn, "retire", after.key.as_str(), Some(&details))?;
    }
    Ok(())
}

impl PatternStore for SqlitePatternStore {
    fn upsert(&self, pattern: &Pattern) -> Result<()> {
        let conn = self.db.lock()?;
        write_pattern(&conn, pattern)?;
        write_audit_log(&conn, "upsert", pattern.key.as_str(), None)?;
        Ok(())
    }

    fn get(&self, key: &PatternKey) -> Result<Option<Pattern>> {
        let conn = self.db.lock()?;
        read_pattern(&conn, key)
    }

    fn list(&self, kind: Option<PatternKind>, min_confidence: f64) -> Result<Vec<Pattern>> {
        let conn = self.db.lock()?;
        let raw = match kind {
            Some(kind) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {SELECT_COLUMNS} FROM patterns \
                     WHERE retired = 0 AND confidence >= ?1 AND kind = ?2 \
                     ORDER BY confidence DESC, key ASC"
                ))?;
                let rows = stmt
                    .query_map(params![min_confidence, kind.as_str()], read_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {SELECT_COLUMNS} FROM patterns \
                     WHERE retired = 0 AND confidence >= ?1 \
                     ORDER BY confidence DESC, key ASC"
                ))?;
                let rows = stmt
                    .query_map(params![min_confidence], read_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                rows
            }
        };
        drop(conn);

        // A corrupt payload should not hide every other pattern.
        Ok(raw
            .into_iter()
            .filter_map(|r| match decode_row(r) {
                Ok(p) => Some(p),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping undecodable pattern");
                    None
                }
            })
            .collect())
    }

    fn keys(&self) -> Result<Vec<PatternKey>> {
        let conn = self.db.lock()?;
        let mut stmt = conn.prepare("SELECT key FROM patterns ORDER BY key")?;
        let keys = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .map(|k| k.map(PatternKey::from))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(keys)
    }

    fn update(
        &self,
        key: &PatternKey,
        change: PatternChange,
        f: &mut dyn FnMut(&mut Pattern),
    ) -> Result<Option<Pattern>> {
        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;

        let Some(before) = read_pattern(&tx, key)? else {
            return Ok(None);
        };
        let mut pattern = before.clone();
        f(&mut pattern);

        write_pattern(&tx, &pattern)?;
        audit_change(&tx, change, &before, &pattern)?;
        tx.commit()?;

        Ok(Some(pattern))
    }

    fn reinforce(&self, seed: Pattern, f: &mut dyn FnMut(&mut Pattern)) -> Result<Pattern> {
        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;

        let before = read_pattern(&tx, &seed.key)?.unwrap_or(seed);
        let mut pattern = before.clone();
        f(&mut pattern);

        write_pattern(&tx, &pattern)?;
        audit_change(&tx, PatternChange::Reinforce, &before, &pattern)?;
        tx.commit()?;

        Ok(pattern)
    }

    fn clear(&self) -> Result<usize> {
        let conn = self.db.lock()?;
        let removed = conn.execute("DELETE FROM patterns", [])?;
        write_audit_log(
            &conn,
            "clear",
            "*",
            Some(&serde_json::json!({ "removed": removed })),
        )?;
        Ok(removed)
    }

    fn stats(&self) -> Result<PatternStats> {
        let conn = self.db.lock()?;

        let (total, retired, hits, misses, mean): (i64, i64, i64, i64, Option<f64>) = conn
            .query_row(
                "SELECT COUNT(*), COALESCE(SUM(retired), 0), COALESCE(SUM(hit_count), 0), \
                 COALESCE(SUM(miss_count), 0), \
                 AVG(CASE WHEN retired = 0 THEN confidence END) \
                 FROM patterns",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )?;

        let mut by_kind = BTreeMap::new();
        let mut stmt =
            conn.prepare("SELECT kind, COUNT(*) FROM patterns WHERE retired = 0 GROUP BY kind")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
        for row in rows {
            let (kind, count) = row?;
            by_kind.insert(kind, count as u64);
        }

        Ok(PatternStats {
            total_patterns: total as u64,
            active_patterns: (total - retired) as u64,
            retired_patterns: retired as u64,
            by_kind,
            total_hits: hits as u64,
            total_misses: misses as u64,
            mean_confidence: mean.unwrap_or(0.0),
        })
    }

    fn decay(&self, now: DateTime<Utc>, model: &PatternConfig) -> Result<DecayReport> {
        let report = decay_each(self, now, model)?;

        if report.decayed > 0 {
            // Synthetic key for the batch entry, like a per-run summary row
            let conn = self.db.lock()?;
            write_audit_log(
                &conn,
                "decay",
                "batch:decay",
                Some(&serde_json::json!({
                    "now": now.to_rfc3339(),
                    "factor": model.decay_factor,
                    "decayed": report.decayed,
                    "retired": report.retired,
                })),
            )?;
        }
        Ok(report)
    }
}

struct RawRow {
    key: String,
    payload: String,
    confidence: f64,
    hit_count: i64,
    miss_count: i64,
    decay_weight: f64,
    last_used: i64,
    decayed_through: i64,
    retired: bool,
    created_at: i64,
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<RawRow> {
    Ok(RawRow {
        key: row.get(0)?,
        payload: row.get(1)?,
        confidence: row.get(2)?,
        hit_count: row.get(3)?,
        miss_count: row.get(4)?,
        decay_weight: row.get(5)?,
        last_used: row.get(6)?,
        decayed_through: row.get(7)?,
        retired: row.get(8)?,
        created_at: row.get(9)?,
    })
}

fn decode_row(raw: RawRow) -> Result<Pattern> {
    let payload: PatternPayload = serde_json::from_str(&raw.payload)
        .map_err(|e| Error::Corrupt(format!("pattern {}: {e}", raw.key)))?;
    Ok(Pattern {
        key: PatternKey::from(raw.key),
        payload,
        confidence: raw.confidence,
        hit_count: raw.hit_count.max(0) as u64,
        miss_count: raw.miss_count.max(0) as u64,
        last_used: from_millis(raw.last_used),
        decay_weight: raw.decay_weight,
        decayed_through: from_millis(raw.decayed_through),
        retired: raw.retired,
        created_at: from_millis(raw.created_at),
    })
}
