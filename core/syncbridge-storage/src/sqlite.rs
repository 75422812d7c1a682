//! SQLite-backed key-value store.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::error::StorageResult;
use crate::kv::{KvOp, KvStore};

/// Key-value store in a single SQLite table.
#[derive(Clone)]
pub struct SqliteKv {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteKv {
    /// Opens (or creates) a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        debug!(path = %path.display(), "opened kv store");
        Self::with_connection(conn)
    }

    /// Opens an in-memory store (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StorageResult<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StorageResult<()> {
        let conn = self.conn.lock()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL
            );
            ",
        )?;
        Ok(())
    }
}

fn apply(conn: &Connection, op: KvOp) -> rusqlite::Result<()> {
    match op {
        KvOp::Put { key, value } => {
            conn.execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )?;
        }
        KvOp::Delete { key } => {
            conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        }
        KvOp::DeletePrefix { prefix } => {
            conn.execute(
                "DELETE FROM kv WHERE substr(key, 1, length(?1)) = ?1",
                params![prefix],
            )?;
        }
    }
    Ok(())
}

impl KvStore for SqliteKv {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let conn = self.conn.lock()?;
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    fn put(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        let conn = self.conn.lock()?;
        apply(&conn, KvOp::put(key, value))?;
        Ok(())
    }

    fn delete(&self, key: &str) -> StorageResult<()> {
        let conn = self.conn.lock()?;
        apply(&conn, KvOp::delete(key))?;
        Ok(())
    }

    fn scan(&self, prefix: &str) -> StorageResult<Vec<(String, Vec<u8>)>> {
        let conn = self.conn.lock()?;
        let mut stmt = conn.prepare(
            "SELECT key, value FROM kv WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key",
        )?;
        let rows = stmt
            .query_map(params![prefix], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn write_batch(&self, ops: Vec<KvOp>) -> StorageResult<()> {
        let mut conn = self.conn.lock()?;
        let tx = conn.transaction()?;
        let count = ops.len();
        for op in ops {
            apply(&tx, op)?;
        }
        tx.commit()?;
        debug!(ops = count, "committed kv batch");
        Ok(())
    }
}
