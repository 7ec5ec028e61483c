//! Key/blob persistence contracts and implementations.
//!
//! # Responsibility
//! - Provide a minimal `load_blob`/`save_blob` store for whole-document state.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - `save_blob` replaces the full value stored under `key`.
//! - A missing key loads as `None`, never as an error.

use crate::db::{open_db, open_db_in_memory, DbError};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::sync::{Arc, Mutex};

pub type StoreResult<T> = Result<T, StoreError>;

/// Failure while reading, writing or decoding persisted state.
#[derive(Debug)]
pub enum StoreError {
    Db(DbError),
    Serialize(serde_json::Error),
    /// Persisted bytes exist but do not decode to the expected shape.
    InvalidData(String),
    /// Backend is temporarily unusable (e.g. poisoned lock, closed handle).
    Unavailable(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Serialize(err) => write!(f, "serialization failed: {err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::Unavailable(message) => write!(f, "blob store unavailable: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Serialize(err) => Some(err),
            Self::InvalidData(_) | Self::Unavailable(_) => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialize(value)
    }
}

/// Whole-value key/blob persistence.
pub trait BlobStore: Send + Sync {
    fn load_blob(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;
    fn save_blob(&self, key: &str, bytes: &[u8]) -> StoreResult<()>;
}

/// SQLite-backed blob store.
pub struct SqliteBlobStore {
    conn: Mutex<Connection>,
}

impl SqliteBlobStore {
    /// Opens (and migrates) the store file at `path`.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Ok(Self::from_connection(open_db(path)?))
    }

    /// Opens a process-local store.
    pub fn in_memory() -> StoreResult<Self> {
        Ok(Self::from_connection(open_db_in_memory()?))
    }

    /// Wraps a connection returned by [`open_db`] or [`open_db_in_memory`].
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn with_conn<T>(
        &self,
        op: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> StoreResult<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::Unavailable("sqlite connection lock poisoned".to_string()))?;
        Ok(op(&conn)?)
    }
}

impl BlobStore for SqliteBlobStore {
    fn load_blob(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT value FROM blobs WHERE key = ?1;",
                params![key],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()
        })
    }

    fn save_blob(&self, key: &str, bytes: &[u8]) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO blobs (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = (strftime('%s', 'now') * 1000);",
                params![key, bytes],
            )
        })?;
        Ok(())
    }
}

/// Map-backed blob store.
///
/// Clones share the same map, which lets one clone outlive a session and be
/// handed to the next one.
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<String> {
        self.blobs
            .lock()
            .map(|blobs| blobs.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl BlobStore for MemoryBlobStore {
    fn load_blob(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let blobs = self
            .blobs
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))?;
        Ok(blobs.get(key).cloned())
    }

    fn save_blob(&self, key: &str, bytes: &[u8]) -> StoreResult<()> {
        let mut blobs = self
            .blobs
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))?;
        blobs.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{BlobStore, MemoryBlobStore, SqliteBlobStore};

    #[test]
    fn sqlite_store_upserts_whole_values() {
        let store = SqliteBlobStore::in_memory().unwrap();
        assert_eq!(store.load_blob("k").unwrap(), None);

        store.save_blob("k", b"first").unwrap();
        store.save_blob("k", b"second").unwrap();
        assert_eq!(store.load_blob("k").unwrap().as_deref(), Some(&b"second"[..]));
    }

    #[test]
    fn memory_store_clones_share_state() {
        let store = MemoryBlobStore::new();
        let other = store.clone();
        store.save_blob("a", b"1").unwrap();
        assert_eq!(other.load_blob("a").unwrap().as_deref(), Some(&b"1"[..]));
        assert_eq!(other.keys(), vec!["a".to_string()]);
    }
}
