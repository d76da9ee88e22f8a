//! Database connection management

use crate::error::Result;
use rusqlite::Connection;
use std::path::Path;

use super::migrations;

/// Database wrapper for the local outbox store
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the store at the given path, creating it if it doesn't exist
    ///
    /// Runs migrations automatically.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let database = Self {
            conn: Connection::open(path)?,
        };
        database.configure(true)?;
        database.migrate()?;
        tracing::debug!("Opened outbox store at {}", path.display());
        Ok(database)
    }

    /// Open an in-memory database (useful for testing)
    pub fn open_in_memory() -> Result<Self> {
        let database = Self {
            conn: Connection::open_in_memory()?,
        };
        database.configure(false)?;
        database.migrate()?;
        Ok(database)
    }

    /// Configure `SQLite` for a single-writer embedded store
    fn configure(&self, file_backed: bool) -> Result<()> {
        // journal_mode returns a row, so it goes through pragma_update_and_check
        let journal_mode = self.conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        });
        if let Some(warning) = journal_mode_warning(file_backed, journal_mode) {
            tracing::warn!("{warning}");
        }
        self.conn.pragma_update(None, "synchronous", "NORMAL")?;
        self.conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(())
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        migrations::run(&self.conn)
    }

    /// Get a reference to the underlying connection
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }
}

/// In-memory databases stay on the MEMORY journal, so only file-backed
/// stores report a missing WAL.
fn journal_mode_warning(
    file_backed: bool,
    outcome: rusqlite::Result<String>,
) -> Option<String> {
    if !file_backed {
        return None;
    }
    match outcome {
        Ok(mode) if mode.eq_ignore_ascii_case("wal") => None,
        Ok(mode) => Some(format!("Outbox store is using the {mode} journal instead of WAL")),
        Err(error) => Some(format!("Could not enable WAL for the outbox store: {error}")),
    }
}
