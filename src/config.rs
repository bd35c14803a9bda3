use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Environment variables holding the remote store endpoint, in lookup order.
const URL_VARS: &[&str] = &["KV_REST_API_URL", "UPSTASH_REDIS_REST_URL"];
/// Environment variables holding the remote store token, in lookup order.
const TOKEN_VARS: &[&str] = &["KV_REST_API_TOKEN", "UPSTASH_REDIS_REST_TOKEN"];

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub remote: RemoteConfig,
  #[serde(default)]
  pub local: LocalConfig,
  #[serde(default)]
  pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
  /// REST endpoint of the key/value store. Overridden by the environment.
  pub url: Option<Url>,
  /// Never read from the config file; environment only.
  #[serde(skip)]
  pub token: Option<String>,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

impl Default for RemoteConfig {
  fn default() -> Self {
    Self {
      url: None,
      token: None,
      timeout_secs: default_timeout_secs(),
    }
  }
}

impl RemoteConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }
}

fn default_timeout_secs() -> u64 {
  10
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocalConfig {
  /// Directory for the persistent tiers (default: $XDG_DATA_HOME/sfcache)
  pub data_dir: Option<PathBuf>,
  /// Byte quota for the small persistent tier
  #[serde(default = "default_persistent_quota")]
  pub persistent_quota_bytes: usize,
  /// Freshness window shared by all local tiers
  #[serde(default = "default_local_ttl_secs")]
  pub ttl_secs: u64,
}

impl Default for LocalConfig {
  fn default() -> Self {
    Self {
      data_dir: None,
      persistent_quota_bytes: default_persistent_quota(),
      ttl_secs: default_local_ttl_secs(),
    }
  }
}

impl LocalConfig {
  pub fn ttl(&self) -> Duration {
    Duration::from_secs(self.ttl_secs)
  }

  /// Resolve the data directory, falling back to the platform data dir.
  pub fn data_dir(&self) -> Result<PathBuf> {
    if let Some(dir) = &self.data_dir {
      return Ok(dir.clone());
    }
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("sfcache"))
  }
}

fn default_persistent_quota() -> usize {
  5 * 1024 * 1024
}

fn default_local_ttl_secs() -> u64 {
  300
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
  /// Directory for daily-rolling log files; stderr only when unset
  pub dir: Option<PathBuf>,
}

impl Config {
  /// Load configuration from file, then apply the environment.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./sfcache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/sfcache/config.yaml
  ///
  /// A missing file is not an error; the remote store can be configured from
  /// the environment alone.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Config::default(),
    };
    config.apply_env(|name| std::env::var(name).ok())?;

    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("sfcache.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("sfcache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    // An empty file parses as null.
    if contents.trim().is_empty() {
      return Ok(Config::default());
    }
    Ok(serde_yaml::from_str(contents)?)
  }

  /// Overlay endpoint and token from the environment.
  ///
  /// Takes a lookup function so tests don't have to mutate process state.
  pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
    let first = |names: &[&str]| {
      names
        .iter()
        .filter_map(|name| lookup(*name))
        .find(|v| !v.trim().is_empty())
    };

    if let Some(raw) = first(URL_VARS) {
      let url = Url::parse(raw.trim()).map_err(|e| eyre!("Invalid remote store URL '{}': {}", raw, e))?;
      self.remote.url = Some(url);
    }
    if let Some(token) = first(TOKEN_VARS) {
      self.remote.token = Some(token.trim().to_string());
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;

  #[test]
  fn test_defaults_without_file() {
    let config = Config::from_yaml("").unwrap();
    assert_eq!(config.remote.timeout_secs, 10);
    assert_eq!(config.local.persistent_quota_bytes, 5 * 1024 * 1024);
    assert_eq!(config.local.ttl(), Duration::from_secs(300));
    assert!(config.remote.url.is_none());
  }

  #[test]
  fn test_yaml_overrides() {
    let config = Config::from_yaml(
      r#"
remote:
  url: https://kv.example.com
  timeout_secs: 3
local:
  data_dir: /tmp/sfcache
  ttl_secs: 60
"#,
    )
    .unwrap();

    assert_eq!(config.remote.url.as_ref().unwrap().as_str(), "https://kv.example.com/");
    assert_eq!(config.remote.timeout(), Duration::from_secs(3));
    assert_eq!(config.local.data_dir().unwrap(), PathBuf::from("/tmp/sfcache"));
    assert_eq!(config.local.ttl_secs, 60);
  }

  #[test]
  fn test_env_takes_precedence_and_falls_back() {
    let env: HashMap<&str, &str> = [
      ("UPSTASH_REDIS_REST_URL", "https://fallback.example.com"),
      ("KV_REST_API_URL", "https://primary.example.com"),
      ("UPSTASH_REDIS_REST_TOKEN", "tok"),
    ]
    .into_iter()
    .collect();

    let mut config = Config::default();
    config
      .apply_env(|name| env.get(name).map(|v| v.to_string()))
      .unwrap();

    assert_eq!(config.remote.url.as_ref().unwrap().host_str(), Some("primary.example.com"));
    assert_eq!(config.remote.token.as_deref(), Some("tok"));
  }

  #[test]
  fn test_invalid_env_url_is_error() {
    let mut config = Config::default();
    assert!(config
      .apply_env(|name| (name == "KV_REST_API_URL").then(|| "not a url".to_string()))
      .is_err());
  }
}
