//! Large local tier backed by SQLite.
//!
//! Calls run on the blocking pool so the async caller never stalls on disk I/O.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::traits::{CacheEntry, Tier, TierStats, WriteMode};
use crate::error::TierError;

pub const FILE_NAME: &str = "cache.db";

/// Schema for the entry table.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS cache_entries (
    cache_key TEXT PRIMARY KEY,
    data BLOB NOT NULL,
    stored_at TEXT NOT NULL
);
"#;

/// SQLite-based tier.
pub struct SqliteTier {
  conn: Arc<Mutex<Connection>>,
}

impl SqliteTier {
  /// Open (or create) the database inside `dir`.
  pub fn open(dir: &Path) -> Result<Self, TierError> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(FILE_NAME);
    Self::init(Connection::open(path)?)
  }

  /// Non-persistent database, for tests.
  pub fn open_in_memory() -> Result<Self, TierError> {
    Self::init(Connection::open_in_memory()?)
  }

  fn init(conn: Connection) -> Result<Self, TierError> {
    conn.execute_batch(CACHE_SCHEMA)?;
    Ok(Self {
      conn: Arc::new(Mutex::new(conn)),
    })
  }

  /// Run `f` against the connection on the blocking pool.
  async fn with_conn<T, F>(&self, f: F) -> Result<T, TierError>
  where
    T: Send + 'static,
    F: FnOnce(&mut Connection) -> Result<T, TierError> + Send + 'static,
  {
    let conn = Arc::clone(&self.conn);
    tokio::task::spawn_blocking(move || {
      let mut conn = conn.lock().map_err(|e| TierError::Poisoned(e.to_string()))?;
      f(&mut conn)
    })
    .await?
  }
}

#[async_trait]
impl Tier for SqliteTier {
  fn name(&self) -> &'static str {
    "sqlite"
  }

  fn write_mode(&self) -> WriteMode {
    WriteMode::Detached
  }

  async fn read(&self, key: &str) -> Result<Option<CacheEntry>, TierError> {
    let key = key.to_string();
    self
      .with_conn(move |conn| {
        let row: Option<(Vec<u8>, String)> = conn
          .query_row(
            "SELECT data, stored_at FROM cache_entries WHERE cache_key = ?",
            params![key],
            |row| Ok((row.get(0)?, row.get(1)?)),
          )
          .optional()?;

        let Some((data, stored_at)) = row else {
          return Ok(None);
        };
        let value = serde_json::from_slice(&data)?;
        let stored_at = DateTime::parse_from_rfc3339(&stored_at)
          .map(|dt| dt.with_timezone(&Utc))
          .map_err(|e| {
            TierError::Io(std::io::Error::new(
              std::io::ErrorKind::InvalidData,
              format!("bad stored_at '{}': {}", stored_at, e),
            ))
          })?;
        Ok(Some(CacheEntry::with_timestamp(value, stored_at)))
      })
      .await
  }

  async fn write(&self, key: &str, entry: &CacheEntry) -> Result<(), TierError> {
    let key = key.to_string();
    let data = serde_json::to_vec(&entry.value)?;
    let stored_at = entry.stored_at.to_rfc3339();

    self
      .with_conn(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT OR REPLACE INTO cache_entries (cache_key, data, stored_at) VALUES (?, ?, ?)",
          params![key, data, stored_at],
        )?;
        tx.commit()?;
        Ok(())
      })
      .await
  }

  async fn remove(&self, key: &str) -> Result<(), TierError> {
    let key = key.to_string();
    self
      .with_conn(move |conn| {
        conn.execute("DELETE FROM cache_entries WHERE cache_key = ?", params![key])?;
        Ok(())
      })
      .await
  }

  async fn clear(&self) -> Result<(), TierError> {
    self
      .with_conn(|conn| {
        conn.execute("DELETE FROM cache_entries", [])?;
        Ok(())
      })
      .await
  }

  async fn stats(&self) -> Result<TierStats, TierError> {
    let (entries, approx_bytes) = self
      .with_conn(|conn| {
        let stats: (i64, i64) = conn.query_row(
          "SELECT COUNT(*), COALESCE(SUM(LENGTH(cache_key) + LENGTH(data)), 0) FROM cache_entries",
          [],
          |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(stats)
      })
      .await?;

    Ok(TierStats {
      name: self.name(),
      entries: entries as usize,
      approx_bytes: approx_bytes as usize,
      available: true,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[tokio::test]
  async fn test_write_then_read() {
    let tier = SqliteTier::open_in_memory().unwrap();
    let entry = CacheEntry::new(json!({"items": [1, 2, 3]}));

    tier.write("products:page:1:abc", &entry).await.unwrap();
    let read = tier.read("products:page:1:abc").await.unwrap().unwrap();

    assert_eq!(read.value, entry.value);
    assert_eq!(read.stored_at, entry.stored_at);
  }

  #[tokio::test]
  async fn test_missing_key() {
    let tier = SqliteTier::open_in_memory().unwrap();
    assert_eq!(tier.read("nope").await.unwrap(), None);
  }

  #[tokio::test]
  async fn test_remove_and_clear() {
    let tier = SqliteTier::open_in_memory().unwrap();
    tier.write("a", &CacheEntry::new(json!(1))).await.unwrap();
    tier.write("b", &CacheEntry::new(json!(2))).await.unwrap();

    tier.remove("a").await.unwrap();
    assert_eq!(tier.stats().await.unwrap().entries, 1);

    tier.clear().await.unwrap();
    let stats = tier.stats().await.unwrap();
    assert_eq!(stats.entries, 0);
    assert_eq!(stats.approx_bytes, 0);
  }

  #[tokio::test]
  async fn test_persists_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    {
      let tier = SqliteTier::open(dir.path()).unwrap();
      tier.write("banners", &CacheEntry::new(json!(["a"]))).await.unwrap();
    }
    let tier = SqliteTier::open(dir.path()).unwrap();
    assert_eq!(tier.read("banners").await.unwrap().unwrap().value, json!(["a"]));
  }
}
