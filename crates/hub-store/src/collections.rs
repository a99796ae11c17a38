//! Named collection store: one `key -> value` table per named collection,
//! each row an opaque blob. Extensions use this for small durable records
//! (visitor IDs, last-seen timestamps, cached configuration) that need to
//! survive a restart but don't need the ordering guarantees of the data
//! queue.

use std::sync::Mutex;

use rusqlite::{params, OptionalExtension};

use crate::connection::{self, validate_identifier, SqliteConfig};
use crate::error::StoreResult;

pub struct NamedCollectionStore {
    conn: Mutex<rusqlite::Connection>,
}

impl NamedCollectionStore {
    pub fn open(config: &SqliteConfig) -> StoreResult<Self> {
        Ok(Self { conn: Mutex::new(connection::open(config)?) })
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Ok(Self { conn: Mutex::new(connection::open_in_memory()?) })
    }

    /// Creates the backing table for `collection` if it doesn't exist yet.
    /// Idempotent; cheap enough to call before every operation.
    pub fn ensure_collection(&self, collection: &str) -> StoreResult<()> {
        validate_identifier(collection)?;
        let conn = self.conn.lock().expect("collection store mutex poisoned");
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS coll_{collection} (key TEXT PRIMARY KEY, value BLOB NOT NULL);"
        ))?;
        Ok(())
    }

    pub fn put(&self, collection: &str, key: &str, value: &[u8]) -> StoreResult<()> {
        self.ensure_collection(collection)?;
        let conn = self.conn.lock().expect("collection store mutex poisoned");
        conn.execute(
            &format!("INSERT INTO coll_{collection} (key, value) VALUES (?1, ?2) ON CONFLICT(key) DO UPDATE SET value = excluded.value"),
            params![key, value],
        )?;
        Ok(())
    }

    pub fn get(&self, collection: &str, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.ensure_collection(collection)?;
        let conn = self.conn.lock().expect("collection store mutex poisoned");
        let value = conn
            .query_row(
                &format!("SELECT value FROM coll_{collection} WHERE key = ?1"),
                params![key],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn delete(&self, collection: &str, key: &str) -> StoreResult<()> {
        self.ensure_collection(collection)?;
        let conn = self.conn.lock().expect("collection store mutex poisoned");
        conn.execute(&format!("DELETE FROM coll_{collection} WHERE key = ?1"), params![key])?;
        Ok(())
    }

    pub fn keys(&self, collection: &str) -> StoreResult<Vec<String>> {
        self.ensure_collection(collection)?;
        let conn = self.conn.lock().expect("collection store mutex poisoned");
        let mut stmt = conn.prepare(&format!("SELECT key FROM coll_{collection} ORDER BY key"))?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn clear(&self, collection: &str) -> StoreResult<()> {
        self.ensure_collection(collection)?;
        let conn = self.conn.lock().expect("collection store mutex poisoned");
        conn.execute(&format!("DELETE FROM coll_{collection}"), [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let store = NamedCollectionStore::open_in_memory().unwrap();
        store.put("visitors", "id", b"abc-123").unwrap();
        assert_eq!(store.get("visitors", "id").unwrap(), Some(b"abc-123".to_vec()));
    }

    #[test]
    fn missing_key_is_none() {
        let store = NamedCollectionStore::open_in_memory().unwrap();
        assert_eq!(store.get("visitors", "missing").unwrap(), None);
    }

    #[test]
    fn put_overwrites_existing_key() {
        let store = NamedCollectionStore::open_in_memory().unwrap();
        store.put("c", "k", b"one").unwrap();
        store.put("c", "k", b"two").unwrap();
        assert_eq!(store.get("c", "k").unwrap(), Some(b"two".to_vec()));
    }

    #[test]
    fn delete_removes_key() {
        let store = NamedCollectionStore::open_in_memory().unwrap();
        store.put("c", "k", b"v").unwrap();
        store.delete("c", "k").unwrap();
        assert_eq!(store.get("c", "k").unwrap(), None);
    }

    #[test]
    fn keys_lists_everything_in_a_collection() {
        let store = NamedCollectionStore::open_in_memory().unwrap();
        store.put("c", "b", b"2").unwrap();
        store.put("c", "a", b"1").unwrap();
        assert_eq!(store.keys("c").unwrap(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn collections_are_independent() {
        let store = NamedCollectionStore::open_in_memory().unwrap();
        store.put("a", "k", b"1").unwrap();
        store.put("b", "k", b"2").unwrap();
        assert_eq!(store.get("a", "k").unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.get("b", "k").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn invalid_collection_name_is_rejected() {
        let store = NamedCollectionStore::open_in_memory().unwrap();
        let err = store.put("1bad; DROP TABLE x", "k", b"v").unwrap_err();
        assert!(matches!(err, crate::error::StoreError::InvalidIdentifier(_)));
    }
}
