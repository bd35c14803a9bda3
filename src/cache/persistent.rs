//! Small, synchronous, size-limited tier persisted as one JSON file.
//!
//! Each key maps to the serialized text of its [`CacheEntry`]. The whole map
//! is rewritten on every mutation, so this tier is only meant for a handful of
//! small values; larger payloads belong in the SQLite tier.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use super::traits::{CacheEntry, Tier, TierStats};
use crate::error::TierError;

pub const FILE_NAME: &str = "local-storage.json";

#[derive(Debug)]
pub struct PersistentTier {
  path: PathBuf,
  quota_bytes: usize,
  /// Entries older than this are evicted when room is needed
  ttl: Duration,
  items: Mutex<BTreeMap<String, String>>,
}

fn footprint(items: &BTreeMap<String, String>) -> usize {
  items.iter().map(|(k, v)| k.len() + v.len()).sum()
}

/// Drop expired or unreadable entries. Returns how many went.
fn evict_stale(items: &mut BTreeMap<String, String>, ttl: Duration) -> usize {
  let before = items.len();
  items.retain(|_, text| {
    serde_json::from_str::<CacheEntry>(text).is_ok_and(|entry| entry.is_fresh(ttl))
  });
  before - items.len()
}

impl PersistentTier {
  /// Open (or create) the store file inside `dir`.
  ///
  /// A corrupt file is discarded rather than failing startup.
  pub fn open(dir: &Path, quota_bytes: usize, ttl: Duration) -> Result<Self, TierError> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(FILE_NAME);

    let items = match std::fs::read(&path) {
      Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
        tracing::warn!(path = %path.display(), error = %e, "discarding unreadable local storage file");
        BTreeMap::new()
      }),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
      Err(e) => return Err(e.into()),
    };

    Ok(Self {
      path,
      quota_bytes,
      ttl,
      items: Mutex::new(items),
    })
  }

  fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<String, String>>, TierError> {
    self
      .items
      .lock()
      .map_err(|e| TierError::Poisoned(e.to_string()))
  }

  fn persist(&self, items: &BTreeMap<String, String>) -> Result<(), TierError> {
    let tmp = self.path.with_extension("json.tmp");
    std::fs::write(&tmp, serde_json::to_vec(items)?)?;
    std::fs::rename(&tmp, &self.path)?;
    Ok(())
  }
}

#[async_trait]
impl Tier for PersistentTier {
  fn name(&self) -> &'static str {
    "persistent"
  }

  async fn read(&self, key: &str) -> Result<Option<CacheEntry>, TierError> {
    let items = self.lock()?;
    match items.get(key) {
      Some(text) => Ok(Some(serde_json::from_str(text)?)),
      None => Ok(None),
    }
  }

  async fn write(&self, key: &str, entry: &CacheEntry) -> Result<(), TierError> {
    let text = serde_json::to_string(entry)?;
    let mut items = self.lock()?;

    let evicted = evict_stale(&mut items, self.ttl);
    if evicted > 0 {
      tracing::debug!(evicted, "evicted expired local storage entries");
    }

    let previous = items.get(key).map_or(0, |v| key.len() + v.len());
    let needed = footprint(&items) - previous + key.len() + text.len();
    if needed > self.quota_bytes {
      if evicted > 0 {
        self.persist(&items)?;
      }
      return Err(TierError::QuotaExceeded {
        needed,
        quota: self.quota_bytes,
      });
    }

    items.insert(key.to_string(), text);
    self.persist(&items)
  }

  async fn remove(&self, key: &str) -> Result<(), TierError> {
    let mut items = self.lock()?;
    if items.remove(key).is_some() {
      self.persist(&items)?;
    }
    Ok(())
  }

  async fn clear(&self) -> Result<(), TierError> {
    let mut items = self.lock()?;
    items.clear();
    match std::fs::remove_file(&self.path) {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(e.into()),
    }
  }

  async fn stats(&self) -> Result<TierStats, TierError> {
    let items = self.lock()?;
    Ok(TierStats {
      name: self.name(),
      entries: items.len(),
      approx_bytes: footprint(&items),
      available: true,
    })
  }
}
