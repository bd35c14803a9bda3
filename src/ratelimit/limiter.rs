//! Sliding-window limiter over a remote sorted set.
//!
//! Each identifier owns the set `ratelimit:{identifier}` whose members are
//! request timestamps. A check prunes members older than the window, counts
//! what is left, and records the new request if there is room.
//!
//! Prune, count and add are three separate round trips, not one atomic
//! script. Concurrent checks for the same identifier can therefore overshoot
//! the limit slightly. This is a soft throttle, not a hard quota.

use chrono::{DateTime, Utc};

use super::{
  RateLimitDecision, RateLimitPolicy, RateLimitStatus, RateLimitTier, UNLIMITED_REMAINING,
};
use crate::error::StoreError;
use crate::kv::{RemoteStore, ScoreBound};

pub const KEY_PREFIX: &str = "ratelimit:";

#[derive(Debug, Clone)]
pub struct SlidingWindowLimiter {
  store: RemoteStore,
}

fn millis_to_time(millis: i64) -> DateTime<Utc> {
  DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
}

impl SlidingWindowLimiter {
  pub fn new(store: RemoteStore) -> Self {
    Self { store }
  }

  pub fn key_for(identifier: &str) -> String {
    format!("{}{}", KEY_PREFIX, identifier)
  }

  /// Count this request against `identifier` if the window has room.
  ///
  /// Store failures allow the request with a full `remaining`; a disabled
  /// store allows it with [`UNLIMITED_REMAINING`].
  pub async fn check_limit(&self, identifier: &str, tier: RateLimitTier) -> RateLimitDecision {
    let policy = tier.policy();
    let now = Utc::now().timestamp_millis();

    if !self.store.is_enabled() {
      return RateLimitDecision {
        allowed: true,
        remaining: UNLIMITED_REMAINING,
        limit: policy.limit,
        reset_time: millis_to_time(now + policy.window_ms()),
      };
    }

    match self.try_check(identifier, policy, now).await {
      Ok(decision) => {
        if !decision.allowed {
          tracing::info!(identifier = %identifier, tier = %tier, limit = policy.limit, "rate limit exceeded");
        }
        decision
      }
      Err(e) => {
        tracing::warn!(identifier = %identifier, error = %e, "rate limit check failed, allowing request");
        RateLimitDecision {
          allowed: true,
          remaining: policy.limit,
          limit: policy.limit,
          reset_time: millis_to_time(now + policy.window_ms()),
        }
      }
    }
  }

  async fn try_check(
    &self,
    identifier: &str,
    policy: RateLimitPolicy,
    now: i64,
  ) -> Result<RateLimitDecision, StoreError> {
    let key = Self::key_for(identifier);
    let window_ms = policy.window_ms();
    let count = self.prune_and_count(&key, now - window_ms).await?;

    if count >= policy.limit as u64 {
      let oldest = self.store.zrange_with_scores(&key, 0, 0).await?;
      let reset_ms = oldest
        .first()
        .map(|m| m.score as i64 + window_ms)
        .unwrap_or(now + window_ms);

      return Ok(RateLimitDecision {
        allowed: false,
        remaining: 0,
        limit: policy.limit,
        reset_time: millis_to_time(reset_ms),
      });
    }

    // Unique even when two requests land in the same millisecond.
    let member = format!("{}-{:08x}", now, rand::random::<u32>());
    self.store.zadd(&key, now as f64, &member).await?;
    self.store.expire(&key, policy.window).await?;

    Ok(RateLimitDecision {
      allowed: true,
      remaining: policy.limit - count as u32 - 1,
      limit: policy.limit,
      reset_time: millis_to_time(now + window_ms),
    })
  }

  async fn prune_and_count(&self, key: &str, window_start: i64) -> Result<u64, StoreError> {
    self
      .store
      .zremrangebyscore(key, ScoreBound::NegInf, ScoreBound::Exclusive(window_start as f64))
      .await?;
    self.store.zcard(key).await
  }

  /// Forget every recorded request for `identifier`.
  pub async fn reset_limit(&self, identifier: &str) -> bool {
    if !self.store.is_enabled() {
      return false;
    }
    match self.store.delete(&Self::key_for(identifier)).await {
      Ok(_) => {
        tracing::info!(identifier = %identifier, "rate limit reset");
        true
      }
      Err(e) => {
        tracing::warn!(identifier = %identifier, error = %e, "rate limit reset failed");
        false
      }
    }
  }

  /// Current usage without recording a request.
  ///
  /// Expired members are still pruned so they never show up in `count`.
  pub async fn get_status(&self, identifier: &str, tier: RateLimitTier) -> RateLimitStatus {
    let policy = tier.policy();
    if !self.store.is_enabled() {
      return RateLimitStatus {
        count: 0,
        remaining: UNLIMITED_REMAINING,
        limit: policy.limit,
      };
    }

    let now = Utc::now().timestamp_millis();
    let key = Self::key_for(identifier);
    match self.prune_and_count(&key, now - policy.window_ms()).await {
      Ok(count) => {
        let count = count.min(u32::MAX as u64) as u32;
        RateLimitStatus {
          count,
          remaining: policy.limit.saturating_sub(count),
          limit: policy.limit,
        }
      }
      Err(e) => {
        tracing::warn!(identifier = %identifier, error = %e, "rate limit status unavailable");
        RateLimitStatus {
          count: 0,
          remaining: policy.limit,
          limit: policy.limit,
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::kv::testing::{FailOn, FailingKv};
  use crate::kv::{KvBackend, MemoryKv};
  use std::sync::Arc;
  use std::time::Duration;

  fn limiter() -> (SlidingWindowLimiter, Arc<MemoryKv>) {
    let kv = Arc::new(MemoryKv::new());
    (SlidingWindowLimiter::new(RemoteStore::Connected(kv.clone())), kv)
  }

  #[tokio::test]
  async fn test_anonymous_boundary() {
    let (limiter, _) = limiter();

    for expected_remaining in (0..100).rev() {
      let decision = limiter.check_limit("ip:1", RateLimitTier::Anonymous).await;
      assert!(decision.allowed);
      assert_eq!(decision.remaining, expected_remaining);
      assert_eq!(decision.limit, 100);
    }

    let denied = limiter.check_limit("ip:1", RateLimitTier::Anonymous).await;
    assert!(!denied.allowed);
    assert_eq!(denied.remaining, 0);
    assert!(denied.reset_time > Utc::now());
    assert_eq!(
      denied.headers(),
      vec![
        ("X-RateLimit-Limit", "100".to_string()),
        ("X-RateLimit-Remaining", "0".to_string()),
        ("X-RateLimit-Reset", denied.reset_time.timestamp_millis().to_string()),
      ]
    );
  }

  #[tokio::test]
  async fn test_denied_reset_follows_oldest_request() {
    let (limiter, kv) = limiter();
    let now = Utc::now().timestamp_millis();
    let oldest = now - 10 * 60 * 1000;
    let key = SlidingWindowLimiter::key_for("user:7");

    for n in 0..100 {
      kv.zadd(&key, (oldest + n) as f64, &format!("seed-{}", n))
        .await
        .unwrap();
    }

    let denied = limiter.check_limit("user:7", RateLimitTier::Anonymous).await;
    assert!(!denied.allowed);
    assert_eq!(denied.reset_time.timestamp_millis(), oldest + 15 * 60 * 1000);
  }

  #[tokio::test]
  async fn test_old_requests_slide_out_of_window() {
    let (limiter, kv) = limiter();
    let now = Utc::now().timestamp_millis();
    let key = SlidingWindowLimiter::key_for("user:9");

    for n in 0..100 {
      kv.zadd(&key, (now - 16 * 60 * 1000 + n) as f64, &format!("old-{}", n))
        .await
        .unwrap();
    }
    kv.zadd(&key, (now - 1000) as f64, "recent").await.unwrap();

    let status = limiter.get_status("user:9", RateLimitTier::Anonymous).await;
    assert_eq!(status.count, 1);
    assert_eq!(status.remaining, 99);

    let decision = limiter.check_limit("user:9", RateLimitTier::Anonymous).await;
    assert!(decision.allowed);
    assert_eq!(decision.remaining, 98);
  }

  #[tokio::test]
  async fn test_record_expiry_is_refreshed() {
    let (limiter, kv) = limiter();
    limiter.check_limit("user:1", RateLimitTier::Authenticated).await;

    let ttl = kv
      .ttl(&SlidingWindowLimiter::key_for("user:1"))
      .await
      .unwrap()
      .unwrap();
    assert!(ttl > Duration::from_secs(898) && ttl <= Duration::from_secs(900));
  }

  #[tokio::test]
  async fn test_status_does_not_record() {
    let (limiter, kv) = limiter();
    limiter.check_limit("user:2", RateLimitTier::Admin).await;

    let status = limiter.get_status("user:2", RateLimitTier::Admin).await;
    let again = limiter.get_status("user:2", RateLimitTier::Admin).await;
    assert_eq!(status, again);
    assert_eq!(status.count, 1);
    assert_eq!(status.remaining, 999);
    assert_eq!(
      kv.zcard(&SlidingWindowLimiter::key_for("user:2")).await.unwrap(),
      1
    );
  }

  #[tokio::test]
  async fn test_reset_clears_record() {
    let (limiter, _) = limiter();
    for _ in 0..5 {
      limiter.check_limit("user:3", RateLimitTier::Anonymous).await;
    }

    assert!(limiter.reset_limit("user:3").await);
    let status = limiter.get_status("user:3", RateLimitTier::Anonymous).await;
    assert_eq!(status.count, 0);
  }

  #[tokio::test]
  async fn test_fails_open_on_any_store_error() {
    for command in ["ZREMRANGEBYSCORE", "ZCARD", "ZADD", "EXPIRE"] {
      let limiter = SlidingWindowLimiter::new(RemoteStore::connected(FailOn::new(command)));
      let decision = limiter.check_limit("user:4", RateLimitTier::Authenticated).await;

      assert!(decision.allowed, "{} failure should allow", command);
      assert_eq!(decision.remaining, 300, "{} failure should report full quota", command);
    }
  }

  #[tokio::test]
  async fn test_fails_open_when_denial_lookup_fails() {
    let backend = FailOn::new("ZRANGE");
    let key = SlidingWindowLimiter::key_for("user:5");
    let now = Utc::now().timestamp_millis();
    for n in 0..100 {
      backend
        .inner
        .zadd(&key, (now - n) as f64, &format!("m-{}", n))
        .await
        .unwrap();
    }

    let limiter = SlidingWindowLimiter::new(RemoteStore::connected(backend));
    let decision = limiter.check_limit("user:5", RateLimitTier::Anonymous).await;
    assert!(decision.allowed);
    assert_eq!(decision.remaining, 100);
  }

  #[tokio::test]
  async fn test_unreachable_store() {
    let limiter = SlidingWindowLimiter::new(RemoteStore::connected(FailingKv));

    let decision = limiter.check_limit("anonymous", RateLimitTier::Anonymous).await;
    assert!(decision.allowed);
    assert_eq!(decision.remaining, 100);

    let status = limiter.get_status("anonymous", RateLimitTier::Anonymous).await;
    assert_eq!(status.remaining, 100);
    assert!(!limiter.reset_limit("anonymous").await);
  }

  #[tokio::test]
  async fn test_disabled_store_is_unlimited() {
    let limiter = SlidingWindowLimiter::new(RemoteStore::Disabled);

    for _ in 0..150 {
      let decision = limiter.check_limit("anonymous", RateLimitTier::Anonymous).await;
      assert!(decision.allowed);
      assert_eq!(decision.remaining, UNLIMITED_REMAINING);
    }
    assert_eq!(
      limiter.get_status("anonymous", RateLimitTier::Anonymous).await.remaining,
      UNLIMITED_REMAINING
    );
  }
}
