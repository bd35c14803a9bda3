//! Cache key construction.
//!
//! Keys are `{version}:{resource}:{part}:...`. Bumping the version makes every
//! previously written key unreachable, which is how schema changes invalidate
//! old entries without touching the store.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Prefix applied to every key built here.
pub const KEY_VERSION: &str = "v1";

/// A fully-qualified cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
  /// Start a key for `resource` under the current version.
  pub fn builder(resource: &str) -> CacheKeyBuilder {
    CacheKeyBuilder::new(KEY_VERSION, resource)
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// Glob matching every key of `resource` under the current version.
  pub fn resource_pattern(resource: &str) -> String {
    format!("{}:{}:*", KEY_VERSION, resource)
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl AsRef<str> for CacheKey {
  fn as_ref(&self) -> &str {
    &self.0
  }
}

#[derive(Debug, Clone)]
pub struct CacheKeyBuilder {
  parts: Vec<String>,
}

impl CacheKeyBuilder {
  fn new(version: &str, resource: &str) -> Self {
    Self {
      parts: vec![version.to_string(), resource.to_string()],
    }
  }

  /// Append a literal segment, e.g. a slug or page number.
  pub fn part(mut self, part: impl fmt::Display) -> Self {
    self.parts.push(part.to_string());
    self
  }

  /// Append a digest of filter parameters.
  ///
  /// Parameters are sorted and trimmed first so equal filters always yield
  /// the same segment. Empty filters yield `all`.
  pub fn filters<'a, I>(self, filters: I) -> Self
  where
    I: IntoIterator<Item = (&'a str, &'a str)>,
  {
    let normalized: BTreeMap<&str, &str> = filters
      .into_iter()
      .map(|(k, v)| (k.trim(), v.trim()))
      .filter(|(_, v)| !v.is_empty())
      .collect();

    if normalized.is_empty() {
      return self.part("all");
    }

    let mut hasher = Sha256::new();
    for (k, v) in &normalized {
      hasher.update(k.as_bytes());
      hasher.update(b"=");
      hasher.update(v.as_bytes());
      hasher.update(b"&");
    }
    let digest = hex::encode(hasher.finalize());
    // 16 hex chars keep keys short with negligible collision risk
    self.part(&digest[..16])
  }

  pub fn build(self) -> CacheKey {
    CacheKey(self.parts.join(":"))
  }
}
