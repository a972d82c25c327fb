//! Cache storage trait with SQLite and in-memory implementations.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use super::traits::Cacheable;
use crate::error::StoreError;

/// A single cached record.
#[derive(Debug, Clone)]
pub struct CachedEntity<T> {
  /// The cached record
  pub entity: T,
  /// When the record was last written
  pub cached_at: Option<DateTime<Utc>>,
}

/// Trait for cache storage backends.
///
/// Each write replaces the full record under its key. Writes to different
/// keys are independent; there are no cross-record transactions.
pub trait CacheStorage: Send + Sync {
  /// Get a single record by key.
  fn get_entity<T: Cacheable>(&self, key: i64) -> Result<Option<CachedEntity<T>>, StoreError>;

  /// Get every record of a collection in ascending key order.
  fn get_all<T: Cacheable>(&self) -> Result<Vec<T>, StoreError>;

  /// Store a single record under `key`.
  fn store_entity<T: Cacheable>(&self, key: i64, entity: &T) -> Result<(), StoreError>;
}

/// In-memory storage, used for ephemeral runs and tests.
///
/// Records are kept serialized so every read hands out an independent copy,
/// the same as the SQLite backend.
#[derive(Default)]
pub struct MemoryStorage {
  records: Mutex<MemoryRecords>,
}

type MemoryRecords = BTreeMap<(&'static str, i64), (Vec<u8>, DateTime<Utc>)>;

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }

  fn records(&self) -> Result<MutexGuard<'_, MemoryRecords>, StoreError> {
    self.records.lock().map_err(|_| StoreError::Poisoned)
  }
}

impl CacheStorage for MemoryStorage {
  fn get_entity<T: Cacheable>(&self, key: i64) -> Result<Option<CachedEntity<T>>, StoreError> {
    let records = self.records()?;
    match records.get(&(T::entity_type(), key)) {
      Some((data, cached_at)) => Ok(Some(CachedEntity {
        entity: serde_json::from_slice(data)?,
        cached_at: Some(*cached_at),
      })),
      None => Ok(None),
    }
  }

  fn get_all<T: Cacheable>(&self) -> Result<Vec<T>, StoreError> {
    let records = self.records()?;
    let entity_type = T::entity_type();

    records
      .range((entity_type, i64::MIN)..=(entity_type, i64::MAX))
      .map(|(_, (data, _))| serde_json::from_slice(data).map_err(StoreError::from))
      .collect()
  }

  fn store_entity<T: Cacheable>(&self, key: i64, entity: &T) -> Result<(), StoreError> {
    let data = serde_json::to_vec(entity)?;
    self
      .records()?
      .insert((T::entity_type(), key), (data, Utc::now()));
    Ok(())
  }
}

/// Current schema version, tracked in `PRAGMA user_version`.
const SCHEMA_VERSION: i64 = 1;

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- Keyed record collections (stores serialized JSON)
CREATE TABLE IF NOT EXISTS entity_cache (
    entity_type TEXT NOT NULL,
    entity_key INTEGER NOT NULL,
    data BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (entity_type, entity_key)
);
"#;

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open (or create) the store at the default location.
  pub fn open_default() -> Result<Self, StoreError> {
    Self::open(&Self::default_path()?)
  }

  /// Open (or create) the store at `path`, upgrading the schema if needed.
  pub fn open(path: &Path) -> Result<Self, StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
      std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
        path: parent.to_path_buf(),
        source,
      })?;
    }

    let conn = Connection::open(path).map_err(|source| StoreError::Open {
      path: path.to_path_buf(),
      source,
    })?;

    Self::with_connection(conn)
  }

  /// Open a private in-memory database.
  pub fn open_in_memory() -> Result<Self, StoreError> {
    let conn = Connection::open_in_memory().map_err(|source| StoreError::Open {
      path: PathBuf::from(":memory:"),
      source,
    })?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self, StoreError> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf, StoreError> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or(StoreError::NoDataDir)?;

    Ok(data_dir.join("restodir").join("cache.db"))
  }

  /// Schema version recorded in the database.
  pub fn schema_version(&self) -> Result<i64, StoreError> {
    let conn = self.conn()?;
    Ok(conn.query_row("PRAGMA user_version", [], |row| row.get(0))?)
  }

  /// Upgrade the schema when the recorded version is older than ours.
  fn run_migrations(&self) -> Result<(), StoreError> {
    let conn = self.conn()?;
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    if version < SCHEMA_VERSION {
      debug!(from = version, to = SCHEMA_VERSION, "Upgrading local store schema");
      conn.execute_batch(CACHE_SCHEMA)?;
      conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    }

    Ok(())
  }

  fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
    self.conn.lock().map_err(|_| StoreError::Poisoned)
  }
}

impl CacheStorage for SqliteStorage {
  fn get_entity<T: Cacheable>(&self, key: i64) -> Result<Option<CachedEntity<T>>, StoreError> {
    let conn = self.conn()?;

    let row: Option<(Vec<u8>, String)> = conn
      .query_row(
        "SELECT data, cached_at FROM entity_cache
         WHERE entity_type = ? AND entity_key = ?",
        params![T::entity_type(), key],
        |row| Ok((row.get(0)?, row.get(1)?)),
      )
      .optional()?;

    match row {
      Some((data, cached_at)) => Ok(Some(CachedEntity {
        entity: serde_json::from_slice(&data)?,
        cached_at: parse_datetime(&cached_at),
      })),
      None => Ok(None),
    }
  }

  fn get_all<T: Cacheable>(&self) -> Result<Vec<T>, StoreError> {
    let conn = self.conn()?;

    let mut stmt = conn.prepare(
      "SELECT data FROM entity_cache
       WHERE entity_type = ?
       ORDER BY entity_key",
    )?;

    let rows = stmt.query_map(params![T::entity_type()], |row| row.get::<_, Vec<u8>>(0))?;

    let mut entities = Vec::new();
    for data in rows {
      entities.push(serde_json::from_slice(&data?)?);
    }
    Ok(entities)
  }

  fn store_entity<T: Cacheable>(&self, key: i64, entity: &T) -> Result<(), StoreError> {
    let data = serde_json::to_vec(entity)?;
    let conn = self.conn()?;

    conn.execute(
      "INSERT OR REPLACE INTO entity_cache (entity_type, entity_key, data, cached_at)
       VALUES (?, ?, ?, datetime('now'))",
      params![T::entity_type(), key, data],
    )?;

    Ok(())
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .ok()
}
