//! Cache-aside access to the remote store.
//!
//! Store failures never reach callers of this service: reads degrade to a
//! miss, writes to `false`, invalidations to zero. The only error that
//! propagates is the one produced by a caller's own compute function.

use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::time::Duration;

use crate::background::BackgroundWriter;
use crate::error::StoreError;
use crate::kv::RemoteStore;

/// Freshness presets for common classes of data.
pub mod ttl {
  use std::time::Duration;

  /// Catalog data: listings, product pages.
  pub const PRODUCT_DATA: Duration = Duration::from_secs(5 * 60);
  /// Per-user data such as carts.
  pub const USER_DATA: Duration = Duration::from_secs(60);
  /// Rarely changing content: banners, static pages.
  pub const STATIC_CONTENT: Duration = Duration::from_secs(60 * 60);
}

#[derive(Debug, Clone)]
pub struct CacheService {
  store: RemoteStore,
  writer: BackgroundWriter,
}

impl CacheService {
  pub fn new(store: RemoteStore, writer: BackgroundWriter) -> Self {
    Self { store, writer }
  }

  pub fn is_enabled(&self) -> bool {
    self.store.is_enabled()
  }

  pub fn store(&self) -> &RemoteStore {
    &self.store
  }

  /// Read and decode `key`, surfacing store and decode errors.
  async fn try_get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
    match self.store.get(key).await? {
      Some(text) => Ok(Some(serde_json::from_str(&text)?)),
      None => Ok(None),
    }
  }

  /// Cached value for `key`, or `None` on a miss, a failure, or when disabled.
  pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
    match self.try_get(key).await {
      Ok(value) => {
        tracing::debug!(key = %key, hit = value.is_some(), "cache get");
        value
      }
      Err(e) => {
        tracing::warn!(key = %key, error = %e, "cache get failed");
        None
      }
    }
  }

  /// Store `value` for `ttl`. Returns false on failure or when disabled.
  pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) -> bool {
    if !self.store.is_enabled() {
      return false;
    }
    match write(&self.store, key, value, ttl).await {
      Ok(()) => {
        tracing::debug!(key = %key, ttl_secs = ttl.as_secs(), "cache set");
        true
      }
      Err(e) => {
        tracing::warn!(key = %key, error = %e, "cache set failed");
        false
      }
    }
  }

  /// Remove `key`. Returns false on failure or when disabled.
  pub async fn invalidate(&self, key: &str) -> bool {
    if !self.store.is_enabled() {
      return false;
    }
    match self.store.delete(key).await {
      Ok(removed) => {
        tracing::debug!(key = %key, removed, "cache invalidated");
        true
      }
      Err(e) => {
        tracing::warn!(key = %key, error = %e, "cache invalidate failed");
        false
      }
    }
  }

  /// Remove every key matching a glob such as `products:*`. Returns how many
  /// keys were removed, 0 on failure.
  pub async fn invalidate_pattern(&self, pattern: &str) -> u64 {
    match self.store.delete_by_pattern(pattern).await {
      Ok(removed) => {
        tracing::info!(pattern = %pattern, removed, "cache pattern invalidated");
        removed
      }
      Err(e) => {
        tracing::warn!(pattern = %pattern, error = %e, "cache pattern invalidate failed");
        0
      }
    }
  }

  /// Cache-aside read.
  ///
  /// A hit returns without calling `compute`. A miss, or a failed read, calls
  /// `compute` exactly once and returns its result straight away; the value is
  /// written back on the background writer so a slow or failing store never
  /// delays or fails the caller. An error from `compute` is returned as-is.
  ///
  /// Concurrent misses on the same key each call their own `compute`.
  pub async fn get_or_set<T, F, Fut, E>(&self, key: &str, compute: F, ttl: Duration) -> Result<T, E>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
  {
    match self.try_get::<T>(key).await {
      Ok(Some(value)) => {
        tracing::debug!(key = %key, "cache hit");
        return Ok(value);
      }
      Ok(None) => tracing::debug!(key = %key, "cache miss"),
      Err(e) => tracing::warn!(key = %key, error = %e, "cache read failed, computing value"),
    }

    let value = compute().await?;

    if self.store.is_enabled() {
      match serde_json::to_string(&value) {
        Ok(text) => {
          let store = self.store.clone();
          let owned_key = key.to_string();
          self.writer.spawn("cache set", key, async move {
            store.set(&owned_key, &text, ttl).await
          });
        }
        Err(e) => tracing::warn!(key = %key, error = %e, "computed value is not serializable"),
      }
    }

    Ok(value)
  }

  /// Cache catalog data for [`ttl::PRODUCT_DATA`].
  pub async fn cache_product_data<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> bool {
    self.set(key, value, ttl::PRODUCT_DATA).await
  }

  /// Cache per-user data for [`ttl::USER_DATA`].
  pub async fn cache_user_data<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> bool {
    self.set(key, value, ttl::USER_DATA).await
  }

  /// Cache static content for [`ttl::STATIC_CONTENT`].
  pub async fn cache_static_content<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> bool {
    self.set(key, value, ttl::STATIC_CONTENT).await
  }

  /// Wait for pending background writes.
  pub async fn flush(&self) {
    self.writer.drain().await;
  }
}

async fn write<T: Serialize + ?Sized>(
  store: &RemoteStore,
  key: &str,
  value: &T,
  ttl: Duration,
) -> Result<(), StoreError> {
  let text = serde_json::to_string(value)?;
  store.set(key, &text, ttl).await
}
