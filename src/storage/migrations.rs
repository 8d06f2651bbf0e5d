//! Database migrations for fieldqueue.
//!
//! Each migration is a function that upgrades the schema by one version.
//! Migrations are run automatically when the database is opened.

use rusqlite::Connection;

use crate::error::QueueError;

/// Current schema version.
pub const CURRENT_VERSION: i32 = 2;

/// Get the current schema version from the database.
///
/// Returns 0 if no version has been set (new database).
pub fn get_version(conn: &Connection) -> Result<i32, QueueError> {
    let version: i32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(|e| QueueError::Database(format!("Failed to get schema version: {e}")))?;

    Ok(version)
}

/// Set the schema version in the database.
fn set_version(conn: &Connection, version: i32) -> Result<(), QueueError> {
    conn.execute_batch(&format!("PRAGMA user_version = {version};"))
        .map_err(|e| QueueError::Database(format!("Failed to set schema version: {e}")))
}

/// Run all pending migrations.
pub fn run(conn: &Connection) -> Result<(), QueueError> {
    let current = get_version(conn)?;

    if current >= CURRENT_VERSION {
        return Ok(());
    }

    for version in (current + 1)..=CURRENT_VERSION {
        tracing::debug!(version, "applying queue schema migration");
        run_migration(conn, version)?;
        set_version(conn, version)?;
    }

    Ok(())
}

/// Run a specific migration.
fn run_migration(conn: &Connection, version: i32) -> Result<(), QueueError> {
    match version {
        1 => migrate_v1(conn),
        2 => migrate_v2(conn),
        _ => Err(QueueError::Database(format!(
            "Unknown migration version: {version}"
        ))),
    }
}

/// Migration v1: queued actions keyed by id, indexed by enqueue time.
///
/// `timestamp` holds unix microseconds; `headers` holds a JSON object.
fn migrate_v1(conn: &Connection) -> Result<(), QueueError> {
    conn.execute_batch(
        r"
        CREATE TABLE IF NOT EXISTS queued_actions (
            id TEXT PRIMARY KEY NOT NULL,
            url TEXT NOT NULL,
            method TEXT NOT NULL,
            headers TEXT NOT NULL DEFAULT '{}',
            body TEXT,
            timestamp INTEGER NOT NULL,
            retries INTEGER NOT NULL DEFAULT 0 CHECK (retries >= 0)
        );

        CREATE INDEX IF NOT EXISTS idx_queued_actions_timestamp
        ON queued_actions(timestamp ASC);
        ",
    )
    .map_err(|e| QueueError::Database(format!("Migration v1 failed: {e}")))
}

/// Migration v2: single-row lease serializing replay passes across processes.
///
/// `expires_at` holds unix microseconds.
fn migrate_v2(conn: &Connection) -> Result<(), QueueError> {
    conn.execute_batch(
        r"
        CREATE TABLE IF NOT EXISTS replay_lock (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            owner TEXT NOT NULL,
            expires_at INTEGER NOT NULL
        );
        ",
    )
    .map_err(|e| QueueError::Database(format!("Migration v2 failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_v1() {
        let conn = Connection::open_in_memory().unwrap();

        run(&conn).unwrap();
        assert_eq!(get_version(&conn).unwrap(), CURRENT_VERSION);

        conn.execute(
            "INSERT INTO queued_actions (id, url, method, timestamp)
             VALUES ('a1', '/api/status', 'POST', 100)",
            [],
        )
        .unwrap();

        let retries: i64 = conn
            .query_row("SELECT retries FROM queued_actions WHERE id = 'a1'", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(retries, 0);
    }

    #[test]
    fn test_primary_key_rejects_duplicates() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();

        let insert = "INSERT INTO queued_actions (id, url, method, timestamp)
                      VALUES ('dup', '/x', 'POST', 1)";
        conn.execute(insert, []).unwrap();
        assert!(conn.execute(insert, []).is_err());
    }

    #[test]
    fn test_negative_retries_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO queued_actions (id, url, method, timestamp, retries)
             VALUES ('neg', '/x', 'POST', 1, -1)",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_migration_v2_single_lock_row() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();

        conn.execute(
            "INSERT INTO replay_lock (id, owner, expires_at) VALUES (1, 'a', 10)",
            [],
        )
        .unwrap();
        assert!(conn
            .execute(
                "INSERT INTO replay_lock (id, owner, expires_at) VALUES (2, 'b', 10)",
                [],
            )
            .is_err());
    }

    #[test]
    fn test_migration_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        run(&conn).unwrap();
        run(&conn).unwrap();

        assert_eq!(get_version(&conn).unwrap(), CURRENT_VERSION);
    }

    #[test]
    fn test_get_version_new_database() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(get_version(&conn).unwrap(), 0);
    }
}
