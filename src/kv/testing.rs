//! Backends for exercising failure paths in tests.

use async_trait::async_trait;
use std::time::Duration;

use super::{KvBackend, ScoreBound, ScoredMember};
use crate::error::StoreError;

/// Backend whose every call fails as if the network were down.
pub struct FailingKv;

fn down(command: &str) -> StoreError {
  StoreError::Status {
    status: 503,
    body: format!("{} unavailable", command),
  }
}

#[async_trait]
impl KvBackend for FailingKv {
  async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
    Err(down("GET"))
  }

  async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), StoreError> {
    Err(down("SET"))
  }

  async fn delete(&self, _key: &str) -> Result<u64, StoreError> {
    Err(down("DEL"))
  }

  async fn delete_by_pattern(&self, _pattern: &str) -> Result<u64, StoreError> {
    Err(down("SCAN"))
  }

  async fn increment(&self, _key: &str) -> Result<i64, StoreError> {
    Err(down("INCR"))
  }

  async fn expire(&self, _key: &str, _ttl: Duration) -> Result<bool, StoreError> {
    Err(down("EXPIRE"))
  }

  async fn ttl(&self, _key: &str) -> Result<Option<Duration>, StoreError> {
    Err(down("TTL"))
  }

  async fn zadd(&self, _key: &str, _score: f64, _member: &str) -> Result<u64, StoreError> {
    Err(down("ZADD"))
  }

  async fn zcard(&self, _key: &str) -> Result<u64, StoreError> {
    Err(down("ZCARD"))
  }

  async fn zrange(&self, _key: &str, _start: i64, _stop: i64) -> Result<Vec<String>, StoreError> {
    Err(down("ZRANGE"))
  }

  async fn zrange_with_scores(
    &self,
    _key: &str,
    _start: i64,
    _stop: i64,
  ) -> Result<Vec<ScoredMember>, StoreError> {
    Err(down("ZRANGE"))
  }

  async fn zremrangebyscore(
    &self,
    _key: &str,
    _min: ScoreBound,
    _max: ScoreBound,
  ) -> Result<u64, StoreError> {
    Err(down("ZREMRANGEBYSCORE"))
  }

  async fn ping(&self) -> Result<(), StoreError> {
    Err(down("PING"))
  }
}

/// Delegates to an in-memory store but fails one named command.
pub struct FailOn {
  pub inner: super::MemoryKv,
  pub command: &'static str,
}

impl FailOn {
  pub fn new(command: &'static str) -> Self {
    Self {
      inner: super::MemoryKv::new(),
      command,
    }
  }

  fn check(&self, command: &str) -> Result<(), StoreError> {
    if self.command == command {
      Err(down(command))
    } else {
      Ok(())
    }
  }
}

#[async_trait]
impl KvBackend for FailOn {
  async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
    self.check("GET")?;
    self.inner.get(key).await
  }

  async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
    self.check("SET")?;
    self.inner.set(key, value, ttl).await
  }

  async fn delete(&self, key: &str) -> Result<u64, StoreError> {
    self.check("DEL")?;
    self.inner.delete(key).await
  }

  async fn delete_by_pattern(&self, pattern: &str) -> Result<u64, StoreError> {
    self.check("SCAN")?;
    self.inner.delete_by_pattern(pattern).await
  }

  async fn increment(&self, key: &str) -> Result<i64, StoreError> {
    self.check("INCR")?;
    self.inner.increment(key).await
  }

  async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
    self.check("EXPIRE")?;
    self.inner.expire(key, ttl).await
  }

  async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
    self.check("TTL")?;
    self.inner.ttl(key).await
  }

  async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<u64, StoreError> {
    self.check("ZADD")?;
    self.inner.zadd(key, score, member).await
  }

  async fn zcard(&self, key: &str) -> Result<u64, StoreError> {
    self.check("ZCARD")?;
    self.inner.zcard(key).await
  }

  async fn zrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, StoreError> {
    self.check("ZRANGE")?;
    self.inner.zrange(key, start, stop).await
  }

  async fn zrange_with_scores(
    &self,
    key: &str,
    start: i64,
    stop: i64,
  ) -> Result<Vec<ScoredMember>, StoreError> {
    self.check("ZRANGE")?;
    self.inner.zrange_with_scores(key, start, stop).await
  }

  async fn zremrangebyscore(
    &self,
    key: &str,
    min: ScoreBound,
    max: ScoreBound,
  ) -> Result<u64, StoreError> {
    self.check("ZREMRANGEBYSCORE")?;
    self.inner.zremrangebyscore(key, min, max).await
  }

  async fn ping(&self) -> Result<(), StoreError> {
    self.check("PING")?;
    self.inner.ping().await
  }
}
