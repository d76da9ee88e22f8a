//! Database migrations

use crate::error::Result;
use rusqlite::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 3;

/// Run all pending migrations
pub fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        migrate_v1(conn)?;
    }
    if version < 2 {
        migrate_v2(conn)?;
    }
    if version < 3 {
        migrate_v3(conn)?;
    }

    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    Ok(version)
}

/// Run a list of statements atomically
fn apply(conn: &Connection, statements: &[&str]) -> Result<()> {
    conn.execute_batch("BEGIN TRANSACTION")?;

    for stmt in statements {
        if let Err(e) = conn.execute_batch(stmt) {
            conn.execute_batch("ROLLBACK").ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn.execute_batch("COMMIT") {
        conn.execute_batch("ROLLBACK").ok();
        return Err(e.into());
    }

    Ok(())
}

/// Migration to version 1: Outbox table
fn migrate_v1(conn: &Connection) -> Result<()> {
    apply(
        conn,
        &[
            // Schema version tracking
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            )",
            "CREATE TABLE IF NOT EXISTS sync_queue (
                id TEXT PRIMARY KEY,
                data_type TEXT NOT NULL,
                data_id TEXT NOT NULL,
                payload BLOB NOT NULL,
                priority INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                retry_count INTEGER NOT NULL DEFAULT 0,
                last_retry_at INTEGER,
                next_retry_at INTEGER,
                error_message TEXT
            )",
            "CREATE INDEX IF NOT EXISTS idx_sync_queue_drain ON sync_queue(priority DESC, created_at ASC)",
            "CREATE INDEX IF NOT EXISTS idx_sync_queue_next_retry ON sync_queue(next_retry_at)",
            "INSERT INTO schema_version (version) VALUES (1)",
        ],
    )?;

    tracing::info!("Migrated database to version 1");
    Ok(())
}

/// Migration to version 2: Persisted connectivity state
fn migrate_v2(conn: &Connection) -> Result<()> {
    apply(
        conn,
        &[
            "CREATE TABLE IF NOT EXISTS connectivity_state (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                is_online INTEGER NOT NULL,
                last_online_at INTEGER,
                offline_since INTEGER
            )",
            "INSERT INTO schema_version (version) VALUES (2)",
        ],
    )?;

    tracing::info!("Migrated database to version 2");
    Ok(())
}

/// Migration to version 3: Per-row revision so a re-enqueued id is never
/// dequeued by the delivery of its older payload
fn migrate_v3(conn: &Connection) -> Result<()> {
    apply(
        conn,
        &[
            "ALTER TABLE sync_queue ADD COLUMN revision INTEGER NOT NULL DEFAULT 0",
            "INSERT INTO schema_version (version) VALUES (3)",
        ],
    )?;

    tracing::info!("Migrated database to version {CURRENT_VERSION}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?)",
            [name],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn test_migrations() {
        let conn = setup();
        run(&conn).unwrap();

        let version = get_version(&conn).unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_migrations_idempotent() {
        let conn = setup();
        run(&conn).unwrap();
        run(&conn).unwrap(); // Should not fail

        let version = get_version(&conn).unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_migrations_create_tables() {
        let conn = setup();
        run(&conn).unwrap();

        assert!(table_exists(&conn, "sync_queue"));
        assert!(table_exists(&conn, "connectivity_state"));
    }

    #[test]
    fn test_v2_store_gains_revision_column() {
        let conn = setup();
        migrate_v1(&conn).unwrap();
        migrate_v2(&conn).unwrap();
        conn.execute(
            "INSERT INTO sync_queue (id, data_type, data_id, payload, priority, created_at)
             VALUES ('a1', 'ASSESSMENT', 'assess-1', x'', 50, 1)",
            [],
        )
        .unwrap();

        run(&conn).unwrap();

        let revision: u32 = conn
            .query_row("SELECT revision FROM sync_queue WHERE id = 'a1'", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(revision, 0);
        assert_eq!(get_version(&conn).unwrap(), CURRENT_VERSION);
    }
}
