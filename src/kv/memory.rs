//! In-process key/value backend with the same semantics as the remote store.
//!
//! Used for local development without credentials and as the test double for
//! the cache service and rate limiter.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::glob::GlobPattern;
use super::{KvBackend, ScoreBound, ScoredMember};
use crate::error::StoreError;

#[derive(Debug, Clone)]
enum Value {
  Str(String),
  /// Kept sorted by (score, member).
  ZSet(Vec<ScoredMember>),
}

#[derive(Debug, Clone)]
struct Slot {
  value: Value,
  expires_at: Option<Instant>,
}

impl Slot {
  fn is_expired(&self, now: Instant) -> bool {
    self.expires_at.is_some_and(|at| at <= now)
  }
}

/// Thread-safe in-memory store with lazy TTL expiry.
#[derive(Debug, Default)]
pub struct MemoryKv {
  slots: Mutex<HashMap<String, Slot>>,
}

impl MemoryKv {
  pub fn new() -> Self {
    Self::default()
  }

  /// Number of live keys.
  pub fn len(&self) -> usize {
    let now = Instant::now();
    self
      .lock()
      .map(|slots| slots.values().filter(|s| !s.is_expired(now)).count())
      .unwrap_or(0)
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Slot>>, StoreError> {
    let mut slots = self.slots.lock().map_err(|e| StoreError::Command {
      command: "LOCK".to_string(),
      message: e.to_string(),
    })?;
    let now = Instant::now();
    slots.retain(|_, slot| !slot.is_expired(now));
    Ok(slots)
  }
}

fn wrong_type(command: &str) -> StoreError {
  StoreError::Command {
    command: command.to_string(),
    message: "WRONGTYPE Operation against a key holding the wrong kind of value".to_string(),
  }
}

/// Resolve Redis-style inclusive, possibly negative, indices against `len`.
fn resolve_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
  let len = len as i64;
  let start = if start < 0 { (len + start).max(0) } else { start };
  let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
  if len == 0 || start > stop || start >= len {
    return None;
  }
  Some((start as usize, stop as usize))
}

impl MemoryKv {
  fn zset_range(&self, key: &str, start: i64, stop: i64) -> Result<Vec<ScoredMember>, StoreError> {
    let slots = self.lock()?;
    match slots.get(key).map(|s| &s.value) {
      None => Ok(Vec::new()),
      Some(Value::ZSet(members)) => Ok(
        resolve_range(members.len(), start, stop)
          .map(|(from, to)| members[from..=to].to_vec())
          .unwrap_or_default(),
      ),
      Some(Value::Str(_)) => Err(wrong_type("ZRANGE")),
    }
  }
}

#[async_trait]
impl KvBackend for MemoryKv {
  async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
    let slots = self.lock()?;
    match slots.get(key).map(|s| &s.value) {
      None => Ok(None),
      Some(Value::Str(v)) => Ok(Some(v.clone())),
      Some(Value::ZSet(_)) => Err(wrong_type("GET")),
    }
  }

  async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
    let mut slots = self.lock()?;
    slots.insert(
      key.to_string(),
      Slot {
        value: Value::Str(value.to_string()),
        expires_at: Some(Instant::now() + ttl),
      },
    );
    Ok(())
  }

  async fn delete(&self, key: &str) -> Result<u64, StoreError> {
    let mut slots = self.lock()?;
    Ok(slots.remove(key).map_or(0, |_| 1))
  }

  async fn delete_by_pattern(&self, pattern: &str) -> Result<u64, StoreError> {
    let glob = GlobPattern::new(pattern)?;
    let mut slots = self.lock()?;
    let before = slots.len();
    slots.retain(|key, _| !glob.matches(key));
    Ok((before - slots.len()) as u64)
  }

  async fn increment(&self, key: &str) -> Result<i64, StoreError> {
    let mut slots = self.lock()?;
    let slot = slots.entry(key.to_string()).or_insert_with(|| Slot {
      value: Value::Str("0".to_string()),
      expires_at: None,
    });
    let Value::Str(current) = &slot.value else {
      return Err(wrong_type("INCR"));
    };
    let next = current
      .parse::<i64>()
      .map_err(|_| StoreError::Command {
        command: "INCR".to_string(),
        message: "value is not an integer or out of range".to_string(),
      })?
      + 1;
    slot.value = Value::Str(next.to_string());
    Ok(next)
  }

  async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
    let mut slots = self.lock()?;
    match slots.get_mut(key) {
      Some(slot) => {
        slot.expires_at = Some(Instant::now() + ttl);
        Ok(true)
      }
      None => Ok(false),
    }
  }

  async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
    let slots = self.lock()?;
    let now = Instant::now();
    Ok(
      slots
        .get(key)
        .and_then(|s| s.expires_at)
        .map(|at| at.saturating_duration_since(now)),
    )
  }

  async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<u64, StoreError> {
    let mut slots = self.lock()?;
    let slot = slots.entry(key.to_string()).or_insert_with(|| Slot {
      value: Value::ZSet(Vec::new()),
      expires_at: None,
    });
    let Value::ZSet(members) = &mut slot.value else {
      return Err(wrong_type("ZADD"));
    };

    let existed = match members.iter().position(|m| m.member == member) {
      Some(idx) => {
        members.remove(idx);
        true
      }
      None => false,
    };
    let entry = ScoredMember {
      member: member.to_string(),
      score,
    };
    let idx = members.partition_point(|m| {
      m.score < score || (m.score == score && m.member.as_str() < member)
    });
    members.insert(idx, entry);

    Ok(if existed { 0 } else { 1 })
  }

  async fn zcard(&self, key: &str) -> Result<u64, StoreError> {
    let slots = self.lock()?;
    match slots.get(key).map(|s| &s.value) {
      None => Ok(0),
      Some(Value::ZSet(members)) => Ok(members.len() as u64),
      Some(Value::Str(_)) => Err(wrong_type("ZCARD")),
    }
  }

  async fn zrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, StoreError> {
    Ok(
      self
        .zset_range(key, start, stop)?
        .into_iter()
        .map(|m| m.member)
        .collect(),
    )
  }

  async fn zrange_with_scores(
    &self,
    key: &str,
    start: i64,
    stop: i64,
  ) -> Result<Vec<ScoredMember>, StoreError> {
    self.zset_range(key, start, stop)
  }

  async fn zremrangebyscore(
    &self,
    key: &str,
    min: ScoreBound,
    max: ScoreBound,
  ) -> Result<u64, StoreError> {
    let mut slots = self.lock()?;
    let Some(slot) = slots.get_mut(key) else {
      return Ok(0);
    };
    let Value::ZSet(members) = &mut slot.value else {
      return Err(wrong_type("ZREMRANGEBYSCORE"));
    };

    let before = members.len();
    members.retain(|m| !(min.admits_as_min(m.score) && max.admits_as_max(m.score)));
    let removed = (before - members.len()) as u64;

    // Redis drops empty sorted sets.
    if members.is_empty() {
      slots.remove(key);
    }
    Ok(removed)
  }

  async fn ping(&self) -> Result<(), StoreError> {
    self.lock().map(|_| ())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_set_get_and_ttl() {
    let kv = MemoryKv::new();
    kv.set("product:shoe", "{\"id\":1}", Duration::from_secs(300))
      .await
      .unwrap();

    assert_eq!(kv.get("product:shoe").await.unwrap().as_deref(), Some("{\"id\":1}"));
    let ttl = kv.ttl("product:shoe").await.unwrap().unwrap();
    assert!(ttl <= Duration::from_secs(300));
    assert!(ttl > Duration::from_secs(298));
  }

  #[tokio::test]
  async fn test_expired_keys_are_absent() {
    let kv = MemoryKv::new();
    kv.set("short", "v", Duration::from_millis(5)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(kv.get("short").await.unwrap(), None);
    assert!(kv.is_empty());
  }

  #[tokio::test]
  async fn test_delete_by_pattern_counts() {
    let kv = MemoryKv::new();
    for n in 0..4 {
      kv.set(&format!("p:{}", n), "v", Duration::from_secs(60))
        .await
        .unwrap();
    }
    kv.set("q:0", "v", Duration::from_secs(60)).await.unwrap();

    assert_eq!(kv.delete_by_pattern("p:*").await.unwrap(), 4);
    assert_eq!(kv.len(), 1);
  }

  #[tokio::test]
  async fn test_increment() {
    let kv = MemoryKv::new();
    assert_eq!(kv.increment("views").await.unwrap(), 1);
    assert_eq!(kv.increment("views").await.unwrap(), 2);

    kv.set("name", "abc", Duration::from_secs(60)).await.unwrap();
    assert!(kv.increment("name").await.is_err());
  }

  #[tokio::test]
  async fn test_sorted_set_ordering_and_ranges() {
    let kv = MemoryKv::new();
    kv.zadd("z", 30.0, "c").await.unwrap();
    kv.zadd("z", 10.0, "a").await.unwrap();
    kv.zadd("z", 20.0, "b").await.unwrap();
    assert_eq!(kv.zadd("z", 5.0, "c").await.unwrap(), 0);

    assert_eq!(kv.zcard("z").await.unwrap(), 3);
    assert_eq!(kv.zrange("z", 0, -1).await.unwrap(), vec!["c", "a", "b"]);
    assert_eq!(kv.zrange("z", -1, -1).await.unwrap(), vec!["b"]);
    assert!(kv.zrange("z", 5, 10).await.unwrap().is_empty());

    let first = kv.zrange_with_scores("z", 0, 0).await.unwrap();
    assert_eq!(first[0].score, 5.0);
  }

  #[tokio::test]
  async fn test_zremrangebyscore_exclusive_bound() {
    let kv = MemoryKv::new();
    kv.zadd("z", 1.0, "old").await.unwrap();
    kv.zadd("z", 2.0, "edge").await.unwrap();
    kv.zadd("z", 3.0, "new").await.unwrap();

    let removed = kv
      .zremrangebyscore("z", ScoreBound::NegInf, ScoreBound::Exclusive(2.0))
      .await
      .unwrap();

    assert_eq!(removed, 1);
    assert_eq!(kv.zrange("z", 0, -1).await.unwrap(), vec!["edge", "new"]);
  }

  #[tokio::test]
  async fn test_wrong_type() {
    let kv = MemoryKv::new();
    kv.zadd("z", 1.0, "m").await.unwrap();
    assert!(kv.get("z").await.is_err());
  }
}
