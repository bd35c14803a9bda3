//! Process-lifetime tier backed by a plain map.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::traits::{CacheEntry, Tier, TierStats};
use crate::error::TierError;

#[derive(Debug, Default)]
pub struct MemoryTier {
  entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryTier {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, CacheEntry>>, TierError> {
    self
      .entries
      .lock()
      .map_err(|e| TierError::Poisoned(e.to_string()))
  }
}

#[async_trait]
impl Tier for MemoryTier {
  fn name(&self) -> &'static str {
    "memory"
  }

  async fn read(&self, key: &str) -> Result<Option<CacheEntry>, TierError> {
    Ok(self.lock()?.get(key).cloned())
  }

  async fn write(&self, key: &str, entry: &CacheEntry) -> Result<(), TierError> {
    self.lock()?.insert(key.to_string(), entry.clone());
    Ok(())
  }

  async fn remove(&self, key: &str) -> Result<(), TierError> {
    self.lock()?.remove(key);
    Ok(())
  }

  async fn clear(&self) -> Result<(), TierError> {
    self.lock()?.clear();
    Ok(())
  }

  async fn stats(&self) -> Result<TierStats, TierError> {
    let entries = self.lock()?;
    let approx_bytes = entries
      .iter()
      .map(|(k, e)| k.len() + e.value.to_string().len())
      .sum();

    Ok(TierStats {
      name: self.name(),
      entries: entries.len(),
      approx_bytes,
      available: true,
    })
  }
}
