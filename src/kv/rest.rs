//! REST client for a Redis-compatible HTTP key/value service.
//!
//! Each call POSTs a JSON array such as `["SET","k","v","EX","300"]` with a
//! bearer token and reads back `{"result": ...}` or `{"error": "..."}`.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use url::Url;

use super::{KvBackend, ScoreBound, ScoredMember};
use crate::error::StoreError;

const SCAN_BATCH: &str = "100";

#[derive(Debug, Deserialize)]
struct CommandResponse {
  #[serde(default)]
  result: Option<Value>,
  #[serde(default)]
  error: Option<String>,
}

/// HTTP client for the remote store. Cheap to clone.
#[derive(Clone)]
pub struct RestKvClient {
  http: reqwest::Client,
  endpoint: Url,
  token: String,
}

impl std::fmt::Debug for RestKvClient {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("RestKvClient")
      .field("endpoint", &self.endpoint.as_str())
      .finish_non_exhaustive()
  }
}

impl RestKvClient {
  pub fn new(endpoint: Url, token: &str, timeout: Duration) -> Result<Self, StoreError> {
    let http = reqwest::Client::builder().timeout(timeout).build()?;
    Ok(Self {
      http,
      endpoint,
      token: token.to_string(),
    })
  }

  /// Send one command and return its `result` payload.
  async fn command(&self, args: &[&str]) -> Result<Value, StoreError> {
    let name = args.first().copied().unwrap_or_default().to_string();

    let response = self
      .http
      .post(self.endpoint.clone())
      .bearer_auth(&self.token)
      .json(args)
      .send()
      .await?;

    let status = response.status();
    let body = response.text().await?;

    match serde_json::from_str::<CommandResponse>(&body) {
      Ok(CommandResponse {
        error: Some(message),
        ..
      }) => Err(StoreError::Command {
        command: name,
        message,
      }),
      Ok(CommandResponse { result, .. }) if status.is_success() => {
        Ok(result.unwrap_or(Value::Null))
      }
      _ => Err(StoreError::Status {
        status: status.as_u16(),
        body,
      }),
    }
  }
}

fn unexpected(command: &str, found: &Value) -> StoreError {
  StoreError::UnexpectedResponse {
    command: command.to_string(),
    found: found.to_string(),
  }
}

fn as_int(command: &str, value: &Value) -> Result<i64, StoreError> {
  match value {
    Value::Number(n) => n.as_i64().ok_or_else(|| unexpected(command, value)),
    Value::String(s) => s.parse().map_err(|_| unexpected(command, value)),
    _ => Err(unexpected(command, value)),
  }
}

fn as_float(command: &str, value: &Value) -> Result<f64, StoreError> {
  match value {
    Value::Number(n) => n.as_f64().ok_or_else(|| unexpected(command, value)),
    Value::String(s) => s.parse().map_err(|_| unexpected(command, value)),
    _ => Err(unexpected(command, value)),
  }
}

fn as_string_list(command: &str, value: &Value) -> Result<Vec<String>, StoreError> {
  match value {
    Value::Array(items) => items
      .iter()
      .map(|item| match item {
        Value::String(s) => Ok(s.clone()),
        other => Err(unexpected(command, other)),
      })
      .collect(),
    Value::Null => Ok(Vec::new()),
    _ => Err(unexpected(command, value)),
  }
}

fn secs(ttl: Duration) -> String {
  ttl.as_secs().max(1).to_string()
}

#[async_trait]
impl KvBackend for RestKvClient {
  async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
    match self.command(&["GET", key]).await? {
      Value::Null => Ok(None),
      Value::String(s) => Ok(Some(s)),
      other => Err(unexpected("GET", &other)),
    }
  }

  async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
    self.command(&["SET", key, value, "EX", &secs(ttl)]).await?;
    Ok(())
  }

  async fn delete(&self, key: &str) -> Result<u64, StoreError> {
    let result = self.command(&["DEL", key]).await?;
    Ok(as_int("DEL", &result)? as u64)
  }

  async fn delete_by_pattern(&self, pattern: &str) -> Result<u64, StoreError> {
    let mut cursor = "0".to_string();
    let mut removed = 0u64;

    loop {
      let page = self
        .command(&["SCAN", &cursor, "MATCH", pattern, "COUNT", SCAN_BATCH])
        .await?;
      let Value::Array(parts) = &page else {
        return Err(unexpected("SCAN", &page));
      };
      let (Some(next), Some(keys)) = (parts.first(), parts.get(1)) else {
        return Err(unexpected("SCAN", &page));
      };

      let keys = as_string_list("SCAN", keys)?;
      if !keys.is_empty() {
        let mut args = Vec::with_capacity(keys.len() + 1);
        args.push("DEL");
        args.extend(keys.iter().map(String::as_str));
        let result = self.command(&args).await?;
        removed += as_int("DEL", &result)? as u64;
      }

      cursor = as_int("SCAN", next)?.to_string();
      if cursor == "0" {
        break;
      }
    }

    tracing::debug!(pattern = %pattern, removed, "deleted keys by pattern");
    Ok(removed)
  }

  async fn increment(&self, key: &str) -> Result<i64, StoreError> {
    let result = self.command(&["INCR", key]).await?;
    as_int("INCR", &result)
  }

  async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
    let result = self.command(&["EXPIRE", key, &secs(ttl)]).await?;
    Ok(as_int("EXPIRE", &result)? == 1)
  }

  async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
    let result = self.command(&["TTL", key]).await?;
    let secs = as_int("TTL", &result)?;
    // -2: no such key, -1: no expiry
    Ok((secs >= 0).then(|| Duration::from_secs(secs as u64)))
  }

  async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<u64, StoreError> {
    let result = self
      .command(&["ZADD", key, &score.to_string(), member])
      .await?;
    Ok(as_int("ZADD", &result)? as u64)
  }

  async fn zcard(&self, key: &str) -> Result<u64, StoreError> {
    let result = self.command(&["ZCARD", key]).await?;
    Ok(as_int("ZCARD", &result)? as u64)
  }

  async fn zrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, StoreError> {
    let result = self
      .command(&["ZRANGE", key, &start.to_string(), &stop.to_string()])
      .await?;
    as_string_list("ZRANGE", &result)
  }

  async fn zrange_with_scores(
    &self,
    key: &str,
    start: i64,
    stop: i64,
  ) -> Result<Vec<ScoredMember>, StoreError> {
    let result = self
      .command(&[
        "ZRANGE",
        key,
        &start.to_string(),
        &stop.to_string(),
        "WITHSCORES",
      ])
      .await?;

    let Value::Array(flat) = &result else {
      return as_string_list("ZRANGE", &result).map(|_| Vec::new());
    };
    if flat.len() % 2 != 0 {
      return Err(unexpected("ZRANGE", &result));
    }

    flat
      .chunks(2)
      .map(|pair| {
        let member = match &pair[0] {
          Value::String(s) => s.clone(),
          other => return Err(unexpected("ZRANGE", other)),
        };
        Ok(ScoredMember {
          member,
          score: as_float("ZRANGE", &pair[1])?,
        })
      })
      .collect()
  }

  async fn zremrangebyscore(
    &self,
    key: &str,
    min: ScoreBound,
    max: ScoreBound,
  ) -> Result<u64, StoreError> {
    let result = self
      .command(&["ZREMRANGEBYSCORE", key, &min.to_string(), &max.to_string()])
      .await?;
    Ok(as_int("ZREMRANGEBYSCORE", &result)? as u64)
  }

  async fn ping(&self) -> Result<(), StoreError> {
    self.command(&["PING"]).await.map(|_| ())
  }
}
