//! Connectivity state repository implementation

use crate::error::Result;
use crate::models::ConnectivityState;
use rusqlite::{params, Connection, OptionalExtension};

/// Trait for persisted connectivity state
pub trait ConnectivityRepository {
    /// Load the last saved state, if any
    fn load(&self) -> Result<Option<ConnectivityState>>;

    /// Save the current state
    fn save(&self, state: &ConnectivityState) -> Result<()>;
}

/// `SQLite` implementation of `ConnectivityRepository`
pub struct SqliteConnectivityRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteConnectivityRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl ConnectivityRepository for SqliteConnectivityRepository<'_> {
    fn load(&self) -> Result<Option<ConnectivityState>> {
        let state = self
            .conn
            .query_row(
                "SELECT is_online, last_online_at, offline_since FROM connectivity_state WHERE id = 1",
                [],
                |row| {
                    Ok(ConnectivityState {
                        is_online: row.get(0)?,
                        last_online_at: row.get(1)?,
                        offline_since: row.get(2)?,
                    })
                },
            )
            .optional()?;

        // A row that breaks the online/offline_since pairing is discarded
        Ok(state.filter(|state| state.is_online == state.offline_since.is_none()))
    }

    fn save(&self, state: &ConnectivityState) -> Result<()> {
        self.conn.execute(
            "INSERT INTO connectivity_state (id, is_online, last_online_at, offline_since)
             VALUES (1, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 is_online = excluded.is_online,
                 last_online_at = excluded.last_online_at,
                 offline_since = excluded.offline_since",
            params![state.is_online, state.last_online_at, state.offline_since],
        )?;
        Ok(())
    }
}
