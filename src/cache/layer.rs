//! Cache layer that cascades reads across local tiers.

use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::memory::MemoryTier;
use super::persistent::PersistentTier;
use super::storage::SqliteTier;
use super::traits::{CacheEntry, CacheHit, Tier, TierStats, WriteMode};
use crate::background::BackgroundWriter;
use crate::error::TierError;

/// Ordered set of local tiers behind one read/write facade.
///
/// Tiers are consulted fastest first. A hit in a slower tier is copied into
/// every faster tier before returning. Only a failure to serialize the value
/// is reported to callers; tier failures are logged and skipped.
#[derive(Clone)]
pub struct TieredCache {
  tiers: Vec<Arc<dyn Tier>>,
  /// How long an entry stays fresh, shared by every tier
  ttl: Duration,
  writer: BackgroundWriter,
}

impl TieredCache {
  /// Create a cache over `tiers`, ordered fastest first.
  pub fn new(tiers: Vec<Arc<dyn Tier>>, ttl: Duration, writer: BackgroundWriter) -> Self {
    Self { tiers, ttl, writer }
  }

  /// Memory, JSON-file and SQLite tiers rooted at `dir`.
  pub fn open(
    dir: &Path,
    persistent_quota_bytes: usize,
    ttl: Duration,
    writer: BackgroundWriter,
  ) -> Result<Self, TierError> {
    let tiers: Vec<Arc<dyn Tier>> = vec![
      Arc::new(MemoryTier::new()),
      Arc::new(PersistentTier::open(dir, persistent_quota_bytes, ttl)?),
      Arc::new(SqliteTier::open(dir)?),
    ];
    Ok(Self::new(tiers, ttl, writer))
  }

  pub fn ttl(&self) -> Duration {
    self.ttl
  }

  pub fn tiers(&self) -> &[Arc<dyn Tier>] {
    &self.tiers
  }

  /// Find a fresh value, recording which tier answered.
  pub async fn lookup<T: DeserializeOwned>(&self, key: &str) -> Option<CacheHit<T>> {
    for (depth, tier) in self.tiers.iter().enumerate() {
      let entry = match tier.read(key).await {
        Ok(Some(entry)) if entry.is_fresh(self.ttl) => entry,
        Ok(Some(_)) => {
          tracing::debug!(key = %key, tier = tier.name(), "stale entry dropped");
          self.discard(tier, key).await;
          continue;
        }
        Ok(None) => continue,
        Err(e) => {
          tracing::warn!(key = %key, tier = tier.name(), error = %e, "tier read failed");
          continue;
        }
      };

      let value = match serde_json::from_value::<T>(entry.value.clone()) {
        Ok(value) => value,
        Err(e) => {
          tracing::warn!(key = %key, tier = tier.name(), error = %e, "cached value has unexpected shape");
          continue;
        }
      };

      tracing::debug!(key = %key, tier = tier.name(), "local cache hit");
      for faster in &self.tiers[..depth] {
        self.write_to(faster, key, &entry).await;
      }

      return Some(CacheHit {
        value,
        tier: tier.name(),
        depth,
        stored_at: entry.stored_at,
      });
    }

    tracing::debug!(key = %key, "local cache miss");
    None
  }

  /// Fresh value for `key`, if any tier has one.
  pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
    self.lookup(key).await.map(|hit| hit.value)
  }

  /// Store `value` in every tier.
  ///
  /// Inline tiers are written before this returns; detached tiers are written
  /// in the background.
  pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), TierError> {
    let entry = CacheEntry::new(serde_json::to_value(value)?);
    for tier in &self.tiers {
      self.write_to(tier, key, &entry).await;
    }
    Ok(())
  }

  /// Cache-first fetch.
  ///
  /// 1. Return a fresh local value if one exists
  /// 2. Otherwise call `fetcher`, returning its error unchanged
  /// 3. Store the fetched value without letting storage failures reach the caller
  pub async fn fetch<T, F, Fut, E>(&self, key: &str, fetcher: F) -> Result<T, E>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
  {
    if let Some(value) = self.get(key).await {
      return Ok(value);
    }

    let data = fetcher().await?;
    if let Err(e) = self.set(key, &data).await {
      tracing::warn!(key = %key, error = %e, "failed to cache fetched value");
    }
    Ok(data)
  }

  /// Drop `key` from every tier. Returns the names of tiers that failed.
  pub async fn remove(&self, key: &str) -> Vec<&'static str> {
    let mut failed = Vec::new();
    for tier in &self.tiers {
      if let Err(e) = tier.remove(key).await {
        tracing::warn!(key = %key, tier = tier.name(), error = %e, "tier remove failed");
        failed.push(tier.name());
      }
    }
    failed
  }

  /// Empty every tier. Returns the names of tiers that failed.
  pub async fn clear(&self) -> Vec<&'static str> {
    let mut failed = Vec::new();
    for tier in &self.tiers {
      match tier.clear().await {
        Ok(()) => tracing::info!(tier = tier.name(), "tier cleared"),
        Err(e) => {
          tracing::warn!(tier = tier.name(), error = %e, "tier clear failed");
          failed.push(tier.name());
        }
      }
    }
    failed
  }

  /// Per-tier sizes; a tier that cannot report is marked unavailable.
  pub async fn stats(&self) -> Vec<TierStats> {
    let reports = futures::future::join_all(self.tiers.iter().map(|tier| tier.stats())).await;

    self
      .tiers
      .iter()
      .zip(reports)
      .map(|(tier, report)| {
        report.unwrap_or_else(|e| {
          tracing::warn!(tier = tier.name(), error = %e, "tier stats unavailable");
          TierStats {
            name: tier.name(),
            entries: 0,
            approx_bytes: 0,
            available: false,
          }
        })
      })
      .collect()
  }

  async fn discard(&self, tier: &Arc<dyn Tier>, key: &str) {
    match tier.write_mode() {
      WriteMode::Inline => {
        if let Err(e) = tier.remove(key).await {
          tracing::warn!(key = %key, tier = tier.name(), error = %e, "tier remove failed");
        }
      }
      WriteMode::Detached => {
        let tier = Arc::clone(tier);
        let key_owned = key.to_string();
        self.writer.spawn(tier.name(), key, async move {
          tier.remove(&key_owned).await
        });
      }
    }
  }

  async fn write_to(&self, tier: &Arc<dyn Tier>, key: &str, entry: &CacheEntry) {
    match tier.write_mode() {
      WriteMode::Inline => {
        if let Err(e) = tier.write(key, entry).await {
          tracing::warn!(key = %key, tier = tier.name(), error = %e, "tier write failed");
        }
      }
      WriteMode::Detached => {
        let tier = Arc::clone(tier);
        let key_owned = key.to_string();
        let entry = entry.clone();
        self.writer.spawn(tier.name(), key, async move {
          tier.write(&key_owned, &entry).await
        });
      }
    }
  }
}
