//! Cache storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::Mutex;

use super::key::QueryKey;

/// A persisted cache entry.
#[derive(Debug, Clone)]
pub struct StoredEntry {
  pub data: Value,
  /// When the entry was written
  pub cached_at: DateTime<Utc>,
}

/// Trait for cache storage backends.
///
/// Only server-confirmed values reach the storage; optimistic writes stay in memory.
pub trait CacheStorage: Send + Sync {
  /// Get a stored entry by key.
  fn load(&self, key: &QueryKey) -> Result<Option<StoredEntry>>;

  /// Store (or replace) an entry.
  fn store(&self, key: &QueryKey, data: &Value) -> Result<()>;

  /// Forget an entry.
  fn remove(&self, key: &QueryKey) -> Result<()>;
}

/// Storage implementation that doesn't persist anything.
/// Used when persistence is disabled - all operations are no-ops.
pub struct NoopStorage;

impl CacheStorage for NoopStorage {
  fn load(&self, _key: &QueryKey) -> Result<Option<StoredEntry>> {
    Ok(None) // Always miss
  }

  fn store(&self, _key: &QueryKey, _data: &Value) -> Result<()> {
    Ok(()) // Discard
  }

  fn remove(&self, _key: &QueryKey) -> Result<()> {
    Ok(())
  }
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open (or create) the cache database at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Open a throwaway in-memory database.
  #[cfg(test)]
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS query_cache (
    query_hash TEXT PRIMARY KEY,
    query_description TEXT NOT NULL,
    data BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl CacheStorage for SqliteStorage {
  fn load(&self, key: &QueryKey) -> Result<Option<StoredEntry>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let row: Option<(Vec<u8>, String)> = conn
      .query_row(
        "SELECT data, cached_at FROM query_cache WHERE query_hash = ?",
        params![key.cache_hash()],
        |row| Ok((row.get(0)?, row.get(1)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to query cache entry {}: {}", key, e))?;

    match row {
      Some((data, cached_at_str)) => {
        let data: Value = serde_json::from_slice(&data)
          .map_err(|e| eyre!("Failed to deserialize cache entry {}: {}", key, e))?;
        let cached_at = parse_datetime(&cached_at_str)?;
        Ok(Some(StoredEntry { data, cached_at }))
      }
      None => Ok(None),
    }
  }

  fn store(&self, key: &QueryKey, data: &Value) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let data = serde_json::to_vec(data).map_err(|e| eyre!("Failed to serialize entry: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO query_cache (query_hash, query_description, data, cached_at)
         VALUES (?, ?, ?, datetime('now'))",
        params![key.cache_hash(), key.to_string(), data],
      )
      .map_err(|e| eyre!("Failed to store cache entry {}: {}", key, e))?;

    Ok(())
  }

  fn remove(&self, key: &QueryKey) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "DELETE FROM query_cache WHERE query_hash = ?",
        params![key.cache_hash()],
      )
      .map_err(|e| eyre!("Failed to remove cache entry {}: {}", key, e))?;

    Ok(())
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn key(id: &str) -> QueryKey {
    QueryKey::new("events").param("id", id)
  }

  #[test]
  fn test_store_and_load() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let value = json!({"id": "42", "title": "Old"});

    storage.store(&key("42"), &value).unwrap();
    let loaded = storage.load(&key("42")).unwrap().unwrap();

    assert_eq!(loaded.data, value);
    assert!((Utc::now() - loaded.cached_at).num_seconds().abs() < 5);
    assert!(storage.load(&key("7")).unwrap().is_none());
  }

  #[test]
  fn test_store_replaces_and_remove_forgets() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.store(&key("1"), &json!({"title": "a"})).unwrap();
    storage.store(&key("1"), &json!({"title": "b"})).unwrap();
    assert_eq!(
      storage.load(&key("1")).unwrap().unwrap().data,
      json!({"title": "b"})
    );

    storage.remove(&key("1")).unwrap();
    assert!(storage.load(&key("1")).unwrap().is_none());
  }

  #[test]
  fn test_file_database_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("cache.db");

    SqliteStorage::open(&path)
      .unwrap()
      .store(&key("9"), &json!([1, 2, 3]))
      .unwrap();

    let reopened = SqliteStorage::open(&path).unwrap();
    assert_eq!(
      reopened.load(&key("9")).unwrap().unwrap().data,
      json!([1, 2, 3])
    );
  }

  #[test]
  fn test_parse_datetime() {
    let dt = parse_datetime("2026-10-19 08:30:00").unwrap();
    assert_eq!(dt.to_rfc3339(), "2026-10-19T08:30:00+00:00");
    assert!(parse_datetime("yesterday").is_err());
  }
}
