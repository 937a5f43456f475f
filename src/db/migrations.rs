//! Forward-only schema migration framework.
//!
//! Tracks the schema version in `schema_meta` and runs sequential migrations
//! to bring the database up to [`CURRENT_SCHEMA_VERSION`].

use rusqlite::Connection;

/// The schema version that the current binary expects.
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// Get the current schema version from the database.
pub fn get_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT value FROM schema_meta WHERE key = 'schema_version'",
        [],
        |row| {
            let val: String = row.get(0)?;
            Ok(val.parse::<u32>().unwrap_or(0))
        },
    )
}

fn update_schema_version(conn: &Connection, version: u32) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE schema_meta SET value = ?1 WHERE key = 'schema_version'",
        [version.to_string()],
    )?;
    Ok(())
}

/// Get the decay constant this database's confidences were computed with, if recorded.
pub fn get_decay_constant(conn: &Connection) -> rusqlite::Result<Option<f64>> {
    match conn.query_row(
        "SELECT value FROM schema_meta WHERE key = 'decay_constant'",
        [],
        |row| row.get::<_, String>(0),
    ) {
        Ok(val) => Ok(val.parse::<f64>().ok()),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Pin `k` unless a constant is already recorded. Returns the constant on record.
pub fn pin_decay_constant(conn: &Connection, k: f64) -> rusqlite::Result<f64> {
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('decay_constant', ?1)",
        [k.to_string()],
    )?;
    Ok(get_decay_constant(conn)?.unwrap_or(k))
}

/// Record the decay constant in use (after a deliberate rebuild with a new constant).
pub fn set_decay_constant(conn: &Connection, k: f64) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_meta (key, value) VALUES ('decay_constant', ?1)",
        [k.to_string()],
    )?;
    Ok(())
}

/// Run any pending forward-only migrations. Each migration runs in a transaction.
pub fn run_migrations(conn: &Connection) -> rusqlite::Result<()> {
    let mut version = get_schema_version(conn)?;
    tracing::debug!(schema_version = version, target = CURRENT_SCHEMA_VERSION, "checking migrations");

    while version < CURRENT_SCHEMA_VERSION {
        let next = version + 1;
        tracing::info!(from = version, to = next, "running migration");

        let tx = conn.unchecked_transaction()?;
        match next {
            2 => migrate_v1_to_v2(&tx)?,
            _ => {
                tracing::error!(version = next, "unknown migration target");
                break;
            }
        }
        update_schema_version(&tx, next)?;
        tx.commit()?;

        version = next;
    }

    Ok(())
}

/// Migration v1 → v2: patterns learned before v2 used the default constant, so pin
/// it for them. A fresh database is pinned with the configured constant on first open.
fn migrate_v1_to_v2(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) \
         SELECT 'decay_constant', '3' WHERE EXISTS (SELECT 1 FROM patterns)",
        [],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::schema::init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn get_schema_version_returns_1_on_fresh_db() {
        let conn = test_db();
        assert_eq!(get_schema_version(&conn).unwrap(), 1);
    }

    #[test]
    fn run_migrations_upgrades_to_current() {
        let conn = test_db();
        run_migrations(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn migration_v1_to_v2_pins_default_for_existing_patterns() {
        let conn = test_db();
        conn.execute(
            "INSERT INTO patterns (key, kind, payload, confidence, last_used, decayed_through, created_at, updated_at) \
             VALUES ('frequency:/a', 'frequency', '{}', 0.5, 0, 0, 0, 0)",
            [],
        )
        .unwrap();
        assert!(get_decay_constant(&conn).unwrap().is_none());

        run_migrations(&conn).unwrap();

        assert_eq!(get_decay_constant(&conn).unwrap(), Some(3.0));
    }

    #[test]
    fn fresh_db_pins_the_configured_constant() {
        let conn = test_db();
        run_migrations(&conn).unwrap();
        assert!(get_decay_constant(&conn).unwrap().is_none());

        assert_eq!(pin_decay_constant(&conn, 5.0).unwrap(), 5.0);
        // Already pinned: a different configuration does not overwrite it
        assert_eq!(pin_decay_constant(&conn, 3.0).unwrap(), 5.0);
    }

    #[test]
    fn migrations_are_idempotent() {
        let conn = test_db();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap(); // second call should not error
        assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn set_and_get_decay_constant() {
        let conn = test_db();
        run_migrations(&conn).unwrap();

        set_decay_constant(&conn, 5.0).unwrap();
        assert_eq!(get_decay_constant(&conn).unwrap(), Some(5.0));
    }
}
