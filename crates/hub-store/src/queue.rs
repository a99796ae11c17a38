//! Persistent data queue: a durable, ordered FIFO of opaque records, backing
//! the hit queue in `hub-queue`.
//!
//! Schema is exactly `queue(seq INTEGER PRIMARY KEY AUTOINCREMENT, uniqueID
//! TEXT, timestamp INTEGER, data BLOB)` -- `seq` here is this queue's own
//! monotonic row id, unrelated to a hub [`Event`]'s `seq`.

use std::sync::Mutex;

use rusqlite::params;

use crate::connection::{self, SqliteConfig};
use crate::error::StoreResult;

#[derive(Debug, Clone, PartialEq)]
pub struct QueuedItem {
    pub seq: i64,
    pub unique_id: String,
    pub timestamp: i64,
    pub data: Vec<u8>,
}

pub struct SqliteDataQueue {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteDataQueue {
    pub fn open(config: &SqliteConfig) -> StoreResult<Self> {
        let conn = connection::open(config)?;
        Self::init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn init_schema(conn: &rusqlite::Connection) -> StoreResult<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS queue (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                uniqueID TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                data BLOB NOT NULL
            );",
        )?;
        Ok(())
    }

    /// Appends a record, returning its assigned `seq`.
    pub fn push(&self, unique_id: &str, timestamp: i64, data: &[u8]) -> StoreResult<i64> {
        let conn = self.conn.lock().expect("data queue mutex poisoned");
        conn.execute(
            "INSERT INTO queue (uniqueID, timestamp, data) VALUES (?1, ?2, ?3)",
            params![unique_id, timestamp, data],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Returns up to `limit` records in FIFO order, without removing them.
    pub fn peek(&self, limit: usize) -> StoreResult<Vec<QueuedItem>> {
        let conn = self.conn.lock().expect("data queue mutex poisoned");
        let mut stmt =
            conn.prepare("SELECT seq, uniqueID, timestamp, data FROM queue ORDER BY seq ASC LIMIT ?1")?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(QueuedItem {
                seq: row.get(0)?,
                unique_id: row.get(1)?,
                timestamp: row.get(2)?,
                data: row.get(3)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Removes one record by `seq`.
    pub fn remove(&self, seq: i64) -> StoreResult<()> {
        let conn = self.conn.lock().expect("data queue mutex poisoned");
        conn.execute("DELETE FROM queue WHERE seq = ?1", params![seq])?;
        Ok(())
    }

    /// Removes a batch of records in one transaction -- used after a
    /// successful batched hit send.
    pub fn remove_batch(&self, seqs: &[i64]) -> StoreResult<()> {
        if seqs.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock().expect("data queue mutex poisoned");
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare("DELETE FROM queue WHERE seq = ?1")?;
            for seq in seqs {
                stmt.execute(params![seq])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn count(&self) -> StoreResult<usize> {
        let conn = self.conn.lock().expect("data queue mutex poisoned");
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM queue", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn clear(&self) -> StoreResult<()> {
        let conn = self.conn.lock().expect("data queue mutex poisoned");
        conn.execute("DELETE FROM queue", [])?;
        Ok(())
    }
}
