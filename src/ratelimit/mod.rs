//! Distributed sliding-window rate limiting.
//!
//! - [`SlidingWindowLimiter`]: per-identifier accounting in a remote sorted set.
//! - [`apply_rate_limit`] / [`with_rate_limit`]: turn a denial into a typed
//!   [`RateLimitExceeded`](crate::error::RateLimitExceeded) error.
//!
//! The limiter fails open: when the store is unreachable or not configured,
//! requests are allowed.

mod limiter;
mod middleware;

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub use limiter::{SlidingWindowLimiter, KEY_PREFIX};
pub use middleware::{
  apply_rate_limit, with_rate_limit, Principal, RateLimitInfo, RateLimited, Role, ANONYMOUS_IDENTIFIER,
};

/// `remaining` reported when the store is disabled and nothing is counted.
pub const UNLIMITED_REMAINING: u32 = u32::MAX;

const FIFTEEN_MINUTES: Duration = Duration::from_secs(15 * 60);

/// Quota classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitTier {
  Anonymous,
  Authenticated,
  Admin,
}

/// Request budget for one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
  pub limit: u32,
  pub window: Duration,
}

impl RateLimitPolicy {
  pub fn window_ms(&self) -> i64 {
    self.window.as_millis() as i64
  }
}

impl RateLimitTier {
  pub fn policy(self) -> RateLimitPolicy {
    let limit = match self {
      RateLimitTier::Anonymous => 100,
      RateLimitTier::Authenticated => 300,
      RateLimitTier::Admin => 1000,
    };
    RateLimitPolicy {
      limit,
      window: FIFTEEN_MINUTES,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      RateLimitTier::Anonymous => "anonymous",
      RateLimitTier::Authenticated => "authenticated",
      RateLimitTier::Admin => "admin",
    }
  }
}

impl fmt::Display for RateLimitTier {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for RateLimitTier {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "anonymous" | "anon" => Ok(RateLimitTier::Anonymous),
      "authenticated" | "auth" | "user" => Ok(RateLimitTier::Authenticated),
      "admin" => Ok(RateLimitTier::Admin),
      other => Err(format!("unknown rate limit tier '{}'", other)),
    }
  }
}

/// Outcome of one `check_limit` call. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDecision {
  pub allowed: bool,
  pub remaining: u32,
  pub limit: u32,
  pub reset_time: DateTime<Utc>,
}

impl RateLimitDecision {
  pub fn headers(&self) -> Vec<(&'static str, String)> {
    rate_limit_headers(self.limit, self.remaining, self.reset_time)
  }
}

/// Read-only view of an identifier's usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
  pub count: u32,
  pub remaining: u32,
  pub limit: u32,
}

/// `X-RateLimit-*` headers; the reset is epoch milliseconds.
pub fn rate_limit_headers(
  limit: u32,
  remaining: u32,
  reset_time: DateTime<Utc>,
) -> Vec<(&'static str, String)> {
  vec![
    ("X-RateLimit-Limit", limit.to_string()),
    ("X-RateLimit-Remaining", remaining.to_string()),
    ("X-RateLimit-Reset", reset_time.timestamp_millis().to_string()),
  ]
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_tier_policies() {
    assert_eq!(RateLimitTier::Anonymous.policy().limit, 100);
    assert_eq!(RateLimitTier::Authenticated.policy().limit, 300);
    assert_eq!(RateLimitTier::Admin.policy().limit, 1000);
    assert_eq!(RateLimitTier::Admin.policy().window_ms(), 900_000);
  }

  #[test]
  fn test_tier_parsing() {
    assert_eq!("Admin".parse::<RateLimitTier>(), Ok(RateLimitTier::Admin));
    assert_eq!("anon".parse::<RateLimitTier>(), Ok(RateLimitTier::Anonymous));
    assert!("root".parse::<RateLimitTier>().is_err());
  }
}
