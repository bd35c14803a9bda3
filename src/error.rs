//! Error types shared across the crate.
//!
//! Store and tier errors are recovered locally by the cache and limiter APIs;
//! they only surface through the lower-level [`crate::kv`] and [`crate::cache`]
//! interfaces. [`RateLimitExceeded`] is the one deliberate, user-facing error.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Failure talking to the remote key/value store.
#[derive(Debug, Error)]
pub enum StoreError {
  #[error("request to remote store failed: {0}")]
  Transport(#[from] reqwest::Error),

  #[error("remote store returned HTTP {status}: {body}")]
  Status { status: u16, body: String },

  #[error("remote store rejected {command}: {message}")]
  Command { command: String, message: String },

  #[error("unexpected response to {command}: {found}")]
  UnexpectedResponse { command: String, found: String },

  #[error("failed to (de)serialize cached value: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("invalid key pattern '{pattern}': {reason}")]
  InvalidPattern { pattern: String, reason: String },
}

/// Failure inside one local cache tier.
#[derive(Debug, Error)]
pub enum TierError {
  #[error("tier I/O failed: {0}")]
  Io(#[from] std::io::Error),

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("failed to (de)serialize entry: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("write of {needed} bytes exceeds quota of {quota} bytes")]
  QuotaExceeded { needed: usize, quota: usize },

  #[error("background tier task failed: {0}")]
  Join(#[from] tokio::task::JoinError),

  #[error("lock poisoned: {0}")]
  Poisoned(String),
}

/// Raised when a principal has used up its request quota.
///
/// Carries the fields callers translate into a 429 response and the
/// `X-RateLimit-*` headers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("rate limit exceeded: {limit} requests allowed, retry after {reset_time}")]
pub struct RateLimitExceeded {
  pub status_code: u16,
  pub reset_time: DateTime<Utc>,
  pub limit: u32,
  pub remaining: u32,
}

impl RateLimitExceeded {
  pub const STATUS_CODE: u16 = 429;

  pub fn new(limit: u32, remaining: u32, reset_time: DateTime<Utc>) -> Self {
    Self {
      status_code: Self::STATUS_CODE,
      reset_time,
      limit,
      remaining,
    }
  }

  /// Seconds until the window frees a slot, rounded up, never negative.
  pub fn retry_after_secs(&self) -> u64 {
    let millis = (self.reset_time - Utc::now()).num_milliseconds().max(0) as u64;
    millis.div_ceil(1000)
  }

  /// Response headers describing the exhausted quota.
  pub fn headers(&self) -> Vec<(&'static str, String)> {
    crate::ratelimit::rate_limit_headers(self.limit, self.remaining, self.reset_time)
  }
}
