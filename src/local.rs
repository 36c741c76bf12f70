//! Local persistence: a durable key-value store on the device. Each
//! collection is written under its own key, independently; there is no
//! cross-key transaction. Failures are logged and non-fatal, and the
//! in-memory state stays authoritative for the session.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection};
use tracing::warn;

use crate::error::{Error, Result};

pub const ITEMS_KEY: &str = "kanaku_items";
pub const ORDERS_KEY: &str = "kanaku_orders";
pub const USERS_KEY: &str = "kanaku_users";

pub trait LocalStore: Send + Sync {
    /// Returns the stored value, or `None` when absent or on error.
    fn read(&self, key: &str) -> Option<String>;
    /// Returns whether the write succeeded.
    fn write(&self, key: &str, value: &str) -> bool;
}

/// SQLite-backed key-value store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| Error::Storage(e.to_string()))?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::Storage(e.to_string()))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )
        .map_err(|e| Error::Storage(e.to_string()))?;

        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }
}

impl LocalStore for SqliteStore {
    fn read(&self, key: &str) -> Option<String> {
        let conn = self.conn.lock().ok()?;
        match conn.query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| {
            row.get(0)
        }) {
            Ok(value) => Some(value),
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(e) => {
                warn!("local read failed for {key}: {e}");
                None
            }
        }
    }

    fn write(&self, key: &str, value: &str) -> bool {
        let conn = match self.conn.lock() {
            Ok(conn) => conn,
            Err(_) => return false,
        };
        match conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        ) {
            Ok(_) => true,
            Err(e) => {
                warn!("local write failed for {key}: {e}");
                false
            }
        }
    }
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryLocal {
    map: parking_lot::Mutex<HashMap<String, String>>,
}

impl LocalStore for MemoryLocal {
    fn read(&self, key: &str) -> Option<String> {
        self.map.lock().get(key).cloned()
    }

    fn write(&self, key: &str, value: &str) -> bool {
        self.map.lock().insert(key.to_string(), value.to_string());
        true
    }
}
