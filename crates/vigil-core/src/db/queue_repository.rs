//! Outbox repository implementation

use std::collections::BTreeMap;

use crate::error::Result;
use crate::models::{QueueStats, SyncDataType, SyncQueueItem};
use rusqlite::{params, Connection};

const ITEM_COLUMNS: &str = "id, data_type, data_id, payload, priority, created_at, \
     retry_count, last_retry_at, next_retry_at, error_message, revision";

/// Drain order: priority lane, then FIFO, then insertion order for same-ms ties
const DRAIN_ORDER: &str = "ORDER BY priority DESC, created_at ASC, rowid ASC";

/// Trait for outbox storage operations
pub trait QueueRepository {
    /// Insert an item, replacing the contents of any existing item with the
    /// same id and bumping its revision
    fn upsert(&self, item: &SyncQueueItem) -> Result<()>;

    /// Get an item by id
    fn get(&self, id: &str) -> Result<Option<SyncQueueItem>>;

    /// All items in drain order
    fn list(&self) -> Result<Vec<SyncQueueItem>>;

    /// Items eligible at `now_ms`, in drain order
    fn list_eligible(&self, now_ms: i64) -> Result<Vec<SyncQueueItem>>;

    /// Delete the stored row for `item` unless it was re-enqueued after
    /// `item` was read; returns whether a row was removed
    fn delete(&self, item: &SyncQueueItem) -> Result<bool>;

    /// Persist a failed attempt and its retry schedule on the same revision
    /// of `item`; returns whether a row was updated
    fn record_failure(
        &self,
        item: &SyncQueueItem,
        retry_count: u32,
        last_retry_at: i64,
        next_retry_at: i64,
        error_message: &str,
    ) -> Result<bool>;

    /// Delete every item; returns the number removed
    fn clear(&self) -> Result<usize>;

    /// Number of queued items
    fn count(&self) -> Result<usize>;

    /// Aggregate counts as of `now_ms`
    fn stats(&self, now_ms: i64) -> Result<QueueStats>;

    /// Delete items whose retry budget is already spent
    fn delete_exhausted(&self, max_attempts: u32) -> Result<usize>;

    /// Pull `next_retry_at` values later than `latest_ms` back to `latest_ms`,
    /// moving `last_retry_at` no later than `now_ms` on the same rows
    fn clamp_next_retry(&self, now_ms: i64, latest_ms: i64) -> Result<usize>;
}

/// `SQLite` implementation of `QueueRepository`
pub struct SqliteQueueRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteQueueRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse an item from a database row
    fn parse_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<SyncQueueItem> {
        let data_type: String = row.get(1)?;
        Ok(SyncQueueItem {
            id: row.get(0)?,
            data_type: SyncDataType::parse(&data_type),
            data_id: row.get(2)?,
            payload: row.get(3)?,
            priority: row.get(4)?,
            created_at: row.get(5)?,
            retry_count: row.get(6)?,
            last_retry_at: row.get(7)?,
            next_retry_at: row.get(8)?,
            error_message: row.get(9)?,
            revision: row.get(10)?,
        })
    }
}

impl QueueRepository for SqliteQueueRepository<'_> {
    fn upsert(&self, item: &SyncQueueItem) -> Result<()> {
        self.conn.execute(
            &format!(
                "INSERT INTO sync_queue ({ITEM_COLUMNS})
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                    data_type = excluded.data_type,
                    data_id = excluded.data_id,
                    payload = excluded.payload,
                    priority = excluded.priority,
                    created_at = excluded.created_at,
                    retry_count = excluded.retry_count,
                    last_retry_at = excluded.last_retry_at,
                    next_retry_at = excluded.next_retry_at,
                    error_message = excluded.error_message,
                    revision = sync_queue.revision + 1"
            ),
            params![
                item.id,
                item.data_type.as_str(),
                item.data_id,
                item.payload,
                item.priority,
                item.created_at,
                item.retry_count,
                item.last_retry_at,
                item.next_retry_at,
                item.error_message,
                item.revision,
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<SyncQueueItem>> {
        let result = self.conn.query_row(
            &format!("SELECT {ITEM_COLUMNS} FROM sync_queue WHERE id = ?"),
            params![id],
            Self::parse_item,
        );

        match result {
            Ok(item) => Ok(Some(item)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self) -> Result<Vec<SyncQueueItem>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {ITEM_COLUMNS} FROM sync_queue {DRAIN_ORDER}"))?;

        let items = stmt
            .query_map([], Self::parse_item)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(items)
    }

    fn list_eligible(&self, now_ms: i64) -> Result<Vec<SyncQueueItem>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ITEM_COLUMNS} FROM sync_queue
             WHERE next_retry_at IS NULL OR next_retry_at <= ?
             {DRAIN_ORDER}"
        ))?;

        let items = stmt
            .query_map(params![now_ms], Self::parse_item)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(items)
    }

    fn delete(&self, item: &SyncQueueItem) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM sync_queue WHERE id = ? AND revision = ?",
            params![item.id, item.revision],
        )?;
        Ok(rows > 0)
    }

    fn record_failure(
        &self,
        item: &SyncQueueItem,
        retry_count: u32,
        last_retry_at: i64,
        next_retry_at: i64,
        error_message: &str,
    ) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE sync_queue
             SET retry_count = ?, last_retry_at = ?, next_retry_at = ?, error_message = ?
             WHERE id = ? AND revision = ?",
            params![
                retry_count,
                last_retry_at,
                next_retry_at,
                error_message,
                item.id,
                item.revision
            ],
        )?;
        Ok(rows > 0)
    }

    fn clear(&self) -> Result<usize> {
        Ok(self.conn.execute("DELETE FROM sync_queue", [])?)
    }

    fn count(&self) -> Result<usize> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM sync_queue", [], |row| row.get(0))?)
    }

    fn stats(&self, now_ms: i64) -> Result<QueueStats> {
        let (total_items, items_ready_for_sync): (usize, usize) = self.conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(
                        CASE WHEN next_retry_at IS NULL OR next_retry_at <= ? THEN 1 ELSE 0 END
                    ), 0)
             FROM sync_queue",
            params![now_ms],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let mut stmt = self.conn.prepare(
            "SELECT data_type, COUNT(*) FROM sync_queue GROUP BY data_type ORDER BY data_type",
        )?;
        let items_by_type = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, usize>(1)?))
            })?
            .collect::<rusqlite::Result<BTreeMap<_, _>>>()?;

        Ok(QueueStats {
            total_items,
            items_by_type,
            items_ready_for_sync,
            items_waiting_for_retry: total_items - items_ready_for_sync,
        })
    }

    fn delete_exhausted(&self, max_attempts: u32) -> Result<usize> {
        Ok(self.conn.execute(
            "DELETE FROM sync_queue WHERE retry_count >= ?",
            params![max_attempts],
        )?)
    }

    fn clamp_next_retry(&self, now_ms: i64, latest_ms: i64) -> Result<usize> {
        Ok(self.conn.execute(
            "UPDATE sync_queue
             SET next_retry_at = ?1, last_retry_at = MIN(last_retry_at, ?2)
             WHERE next_retry_at > ?1",
            params![latest_ms, now_ms],
        )?)
    }
}
