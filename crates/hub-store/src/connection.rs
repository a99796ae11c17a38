//! Connection setup shared by the collection store and the data queue.
//!
//! Both open the same kind of `SQLite` file: WAL journaling so readers never
//! block the single writer, and a busy timeout so a writer under lock
//! contention retries instead of failing immediately.

use std::path::PathBuf;
use std::time::Duration;

use rusqlite::Connection;

use crate::error::StoreResult;

#[derive(Debug, Clone)]
pub struct SqliteConfig {
    pub path: PathBuf,
    pub busy_timeout_ms: u64,
}

impl SqliteConfig {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), busy_timeout_ms: 5_000 }
    }
}

pub(crate) fn open(config: &SqliteConfig) -> StoreResult<Connection> {
    let conn = Connection::open(&config.path)?;
    apply_pragmas(&conn, config)?;
    Ok(conn)
}

pub(crate) fn open_in_memory() -> StoreResult<Connection> {
    let conn = Connection::open_in_memory()?;
    conn.busy_timeout(Duration::from_millis(5_000))?;
    Ok(conn)
}

fn apply_pragmas(conn: &Connection, config: &SqliteConfig) -> StoreResult<()> {
    conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
    conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
    Ok(())
}

/// `SQLite` has no placeholder syntax for identifiers, so any name destined
/// for a `format!`-built statement (table and column names) must be
/// validated up front rather than escaped.
pub(crate) fn validate_identifier(name: &str) -> StoreResult<()> {
    let mut chars = name.chars();
    let ok = match chars.next() {
        Some(c) => c.is_ascii_alphabetic() && chars.all(|c| c.is_ascii_alphanumeric() || c == '_'),
        None => false,
    };
    if ok {
        Ok(())
    } else {
        Err(crate::error::StoreError::InvalidIdentifier(name.to_string()))
    }
}
