//! Thin client for the remote, TTL-capable key/value store.
//!
//! The store is reached through a [`KvBackend`]. [`RemoteStore`] records at
//! construction time whether a backend is connected or caching is disabled,
//! so callers never have to check for a missing handle themselves.
//!
//! No operation here retries; callers decide how to degrade.

mod glob;
mod memory;
mod rest;
#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::RemoteConfig;
use crate::error::StoreError;

pub use glob::GlobPattern;
pub use memory::MemoryKv;
pub use rest::RestKvClient;

/// One bound of a sorted-set score range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScoreBound {
  NegInf,
  PosInf,
  Inclusive(f64),
  Exclusive(f64),
}

impl ScoreBound {
  /// Whether `score` lies on the allowed side of this bound when used as a minimum.
  pub fn admits_as_min(&self, score: f64) -> bool {
    match *self {
      ScoreBound::NegInf => true,
      ScoreBound::PosInf => false,
      ScoreBound::Inclusive(b) => score >= b,
      ScoreBound::Exclusive(b) => score > b,
    }
  }

  /// Whether `score` lies on the allowed side of this bound when used as a maximum.
  pub fn admits_as_max(&self, score: f64) -> bool {
    match *self {
      ScoreBound::NegInf => false,
      ScoreBound::PosInf => true,
      ScoreBound::Inclusive(b) => score <= b,
      ScoreBound::Exclusive(b) => score < b,
    }
  }
}

impl fmt::Display for ScoreBound {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ScoreBound::NegInf => write!(f, "-inf"),
      ScoreBound::PosInf => write!(f, "+inf"),
      ScoreBound::Inclusive(b) => write!(f, "{}", b),
      ScoreBound::Exclusive(b) => write!(f, "({}", b),
    }
  }
}

/// A sorted-set member together with its score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMember {
  pub member: String,
  pub score: f64,
}

/// Primitive operations offered by a remote key/value store.
///
/// Ranges passed to `zrange*` follow Redis index semantics: negative indices
/// count from the end and `stop` is inclusive.
#[async_trait]
pub trait KvBackend: Send + Sync {
  async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

  async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

  /// Returns the number of keys removed (0 or 1).
  async fn delete(&self, key: &str) -> Result<u64, StoreError>;

  /// Removes every key matching a Redis-style glob and returns how many went.
  async fn delete_by_pattern(&self, pattern: &str) -> Result<u64, StoreError>;

  async fn increment(&self, key: &str) -> Result<i64, StoreError>;

  /// Returns false when the key does not exist.
  async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

  /// Remaining time to live; `None` when the key is absent or never expires.
  async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError>;

  /// Returns the number of newly added members.
  async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<u64, StoreError>;

  async fn zcard(&self, key: &str) -> Result<u64, StoreError>;

  async fn zrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, StoreError>;

  async fn zrange_with_scores(
    &self,
    key: &str,
    start: i64,
    stop: i64,
  ) -> Result<Vec<ScoredMember>, StoreError>;

  async fn zremrangebyscore(
    &self,
    key: &str,
    min: ScoreBound,
    max: ScoreBound,
  ) -> Result<u64, StoreError>;

  async fn ping(&self) -> Result<(), StoreError>;
}

/// Handle to the remote store, fixed at startup.
#[derive(Clone)]
pub enum RemoteStore {
  Connected(Arc<dyn KvBackend>),
  /// No connection parameters were configured; every operation is a no-op.
  Disabled,
}

impl fmt::Debug for RemoteStore {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      RemoteStore::Connected(_) => write!(f, "RemoteStore::Connected"),
      RemoteStore::Disabled => write!(f, "RemoteStore::Disabled"),
    }
  }
}

impl RemoteStore {
  /// Build the store from configuration.
  ///
  /// Missing endpoint or token disables the store rather than failing.
  pub fn from_config(config: &RemoteConfig) -> Result<Self, StoreError> {
    match (&config.url, &config.token) {
      (Some(url), Some(token)) => {
        let client = RestKvClient::new(url.clone(), token, config.timeout())?;
        tracing::debug!(endpoint = %url, "remote store configured");
        Ok(Self::connected(client))
      }
      _ => {
        tracing::info!("remote store credentials not configured, caching and rate limiting disabled");
        Ok(RemoteStore::Disabled)
      }
    }
  }

  pub fn connected(backend: impl KvBackend + 'static) -> Self {
    RemoteStore::Connected(Arc::new(backend))
  }

  pub fn is_enabled(&self) -> bool {
    matches!(self, RemoteStore::Connected(_))
  }

  pub async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
    match self {
      RemoteStore::Connected(b) => b.get(key).await,
      RemoteStore::Disabled => Ok(None),
    }
  }

  pub async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
    match self {
      RemoteStore::Connected(b) => b.set(key, value, ttl).await,
      RemoteStore::Disabled => Ok(()),
    }
  }

  pub async fn delete(&self, key: &str) -> Result<u64, StoreError> {
    match self {
      RemoteStore::Connected(b) => b.delete(key).await,
      RemoteStore::Disabled => Ok(0),
    }
  }

  pub async fn delete_by_pattern(&self, pattern: &str) -> Result<u64, StoreError> {
    match self {
      RemoteStore::Connected(b) => b.delete_by_pattern(pattern).await,
      RemoteStore::Disabled => Ok(0),
    }
  }

  pub async fn increment(&self, key: &str) -> Result<Option<i64>, StoreError> {
    match self {
      RemoteStore::Connected(b) => b.increment(key).await.map(Some),
      RemoteStore::Disabled => Ok(None),
    }
  }

  pub async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
    match self {
      RemoteStore::Connected(b) => b.expire(key, ttl).await,
      RemoteStore::Disabled => Ok(false),
    }
  }

  pub async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
    match self {
      RemoteStore::Connected(b) => b.ttl(key).await,
      RemoteStore::Disabled => Ok(None),
    }
  }

  pub async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<u64, StoreError> {
    match self {
      RemoteStore::Connected(b) => b.zadd(key, score, member).await,
      RemoteStore::Disabled => Ok(0),
    }
  }

  pub async fn zcard(&self, key: &str) -> Result<u64, StoreError> {
    match self {
      RemoteStore::Connected(b) => b.zcard(key).await,
      RemoteStore::Disabled => Ok(0),
    }
  }

  pub async fn zrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, StoreError> {
    match self {
      RemoteStore::Connected(b) => b.zrange(key, start, stop).await,
      RemoteStore::Disabled => Ok(Vec::new()),
    }
  }

  pub async fn zrange_with_scores(
    &self,
    key: &str,
    start: i64,
    stop: i64,
  ) -> Result<Vec<ScoredMember>, StoreError> {
    match self {
      RemoteStore::Connected(b) => b.zrange_with_scores(key, start, stop).await,
      RemoteStore::Disabled => Ok(Vec::new()),
    }
  }

  pub async fn zremrangebyscore(
    &self,
    key: &str,
    min: ScoreBound,
    max: ScoreBound,
  ) -> Result<u64, StoreError> {
    match self {
      RemoteStore::Connected(b) => b.zremrangebyscore(key, min, max).await,
      RemoteStore::Disabled => Ok(0),
    }
  }

  /// True when a backend is connected and answers `PING`.
  pub async fn is_available(&self) -> bool {
    match self {
      RemoteStore::Connected(b) => match b.ping().await {
        Ok(()) => true,
        Err(e) => {
          tracing::warn!(error = %e, "remote store ping failed");
          false
        }
      },
      RemoteStore::Disabled => false,
    }
  }
}
