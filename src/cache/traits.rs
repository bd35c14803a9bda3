//! Core traits and types for the local tier cascade.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::TierError;

/// A value together with the moment it was stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
  pub value: serde_json::Value,
  pub stored_at: DateTime<Utc>,
}

impl CacheEntry {
  pub fn new(value: serde_json::Value) -> Self {
    Self {
      value,
      stored_at: Utc::now(),
    }
  }

  pub fn with_timestamp(value: serde_json::Value, stored_at: DateTime<Utc>) -> Self {
    Self { value, stored_at }
  }

  /// An entry is fresh iff `now - stored_at < ttl`.
  pub fn is_fresh(&self, ttl: Duration) -> bool {
    let age = Utc::now() - self.stored_at;
    match chrono::Duration::from_std(ttl) {
      Ok(ttl) => age < ttl,
      // TTL too large to represent: never expires
      Err(_) => true,
    }
  }
}

/// How the facade should perform writes into a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
  /// Cheap enough to complete before `set` returns.
  Inline,
  /// Spawned on the background writer; failures are only logged.
  Detached,
}

/// Size and availability snapshot for one tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierStats {
  pub name: &'static str,
  pub entries: usize,
  pub approx_bytes: usize,
  pub available: bool,
}

/// One layer of the local cache cascade.
///
/// Tiers store whatever they are given; freshness is judged by the caller.
#[async_trait]
pub trait Tier: Send + Sync {
  fn name(&self) -> &'static str;

  fn write_mode(&self) -> WriteMode {
    WriteMode::Inline
  }

  async fn read(&self, key: &str) -> Result<Option<CacheEntry>, TierError>;

  async fn write(&self, key: &str, entry: &CacheEntry) -> Result<(), TierError>;

  async fn remove(&self, key: &str) -> Result<(), TierError>;

  async fn clear(&self) -> Result<(), TierError>;

  async fn stats(&self) -> Result<TierStats, TierError>;
}

/// Where a cached value was found.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheHit<T> {
  pub value: T,
  /// Name of the tier that answered
  pub tier: &'static str,
  /// Position of that tier in the cascade, 0 being fastest
  pub depth: usize,
  pub stored_at: DateTime<Utc>,
}
