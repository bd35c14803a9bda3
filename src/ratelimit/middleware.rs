//! Rate limit enforcement around arbitrary async operations.

use chrono::{DateTime, Utc};
use std::future::Future;

use super::{rate_limit_headers, RateLimitTier, SlidingWindowLimiter};
use crate::error::RateLimitExceeded;

/// Shared bucket for every unauthenticated caller.
pub const ANONYMOUS_IDENTIFIER: &str = "anonymous";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Role {
  #[default]
  Customer,
  Admin,
}

/// Who is making the request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Principal {
  /// `None` for anonymous callers
  pub user_id: Option<String>,
  pub role: Role,
}

impl Principal {
  pub fn anonymous() -> Self {
    Self::default()
  }

  pub fn user(id: impl Into<String>) -> Self {
    Self {
      user_id: Some(id.into()),
      role: Role::Customer,
    }
  }

  pub fn admin(id: impl Into<String>) -> Self {
    Self {
      user_id: Some(id.into()),
      role: Role::Admin,
    }
  }

  /// `user:{id}` when authenticated, the shared anonymous bucket otherwise.
  pub fn identifier(&self) -> String {
    match &self.user_id {
      Some(id) => format!("user:{}", id),
      None => ANONYMOUS_IDENTIFIER.to_string(),
    }
  }

  /// Admin beats authenticated beats anonymous.
  pub fn tier(&self) -> RateLimitTier {
    match (&self.user_id, self.role) {
      (Some(_), Role::Admin) => RateLimitTier::Admin,
      (Some(_), Role::Customer) => RateLimitTier::Authenticated,
      (None, _) => RateLimitTier::Anonymous,
    }
  }
}

/// Rate limit state attached to an allowed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitInfo {
  pub limit: u32,
  pub remaining: u32,
  pub reset_time: DateTime<Utc>,
}

impl RateLimitInfo {
  pub fn headers(&self) -> Vec<(&'static str, String)> {
    rate_limit_headers(self.limit, self.remaining, self.reset_time)
  }
}

/// A successful result together with the limit state it was admitted under.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimited<T> {
  pub value: T,
  pub rate_limit: RateLimitInfo,
}

/// Count one request for `principal`, failing with [`RateLimitExceeded`]
/// once its quota is spent.
pub async fn apply_rate_limit(
  limiter: &SlidingWindowLimiter,
  principal: &Principal,
) -> Result<RateLimitInfo, RateLimitExceeded> {
  let decision = limiter
    .check_limit(&principal.identifier(), principal.tier())
    .await;

  if decision.allowed {
    Ok(RateLimitInfo {
      limit: decision.limit,
      remaining: decision.remaining,
      reset_time: decision.reset_time,
    })
  } else {
    Err(RateLimitExceeded::new(
      decision.limit,
      decision.remaining,
      decision.reset_time,
    ))
  }
}

/// Run `operation` only if `principal` is within its quota.
///
/// The limit is checked first; a denial is converted into `E` and the
/// operation never runs. Errors from the operation pass through unchanged.
pub async fn with_rate_limit<T, E, F, Fut>(
  limiter: &SlidingWindowLimiter,
  principal: &Principal,
  operation: F,
) -> Result<RateLimited<T>, E>
where
  E: From<RateLimitExceeded>,
  F: FnOnce() -> Fut,
  Fut: Future<Output = Result<T, E>>,
{
  let rate_limit = apply_rate_limit(limiter, principal).await?;
  let value = operation().await?;
  Ok(RateLimited { value, rate_limit })
}
