use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;

use storefront_cache::cache::{preload_images, TieredCache};
use storefront_cache::config::Config;
use storefront_cache::ratelimit::{RateLimitTier, SlidingWindowLimiter};
use storefront_cache::{logging, BackgroundWriter, CacheService, RemoteStore};

#[derive(Parser, Debug)]
#[command(name = "sfcache")]
#[command(about = "Operate the storefront cache tiers and rate limiter")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/sfcache/config.yaml)
  #[arg(short, long, env = "SFCACHE_CONFIG")]
  config: Option<PathBuf>,

  /// Log at debug level unless SFCACHE_LOG is set
  #[arg(short, long)]
  verbose: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Print the remote value stored under a key
  Get { key: String },
  /// Remove one key from the remote store
  Invalidate { key: String },
  /// Remove every remote key matching a glob, e.g. 'products:*'
  InvalidatePattern { pattern: String },
  /// Clear every local cache tier
  Clear,
  /// Report per-tier sizes and remote availability
  Stats,
  /// Inspect or reset rate limit records
  Ratelimit {
    #[command(subcommand)]
    action: RatelimitAction,
  },
  /// Warm image URLs in the background
  Preload {
    #[arg(required = true)]
    urls: Vec<String>,
  },
}

#[derive(Subcommand, Debug)]
enum RatelimitAction {
  /// Show current usage for an identifier such as 'user:42' or 'anonymous'
  Status {
    identifier: String,
    #[arg(long, default_value = "anonymous")]
    tier: RateLimitTier,
  },
  /// Forget every recorded request for an identifier
  Reset { identifier: String },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let config = Config::load(args.config.as_deref())?;
  let _guard = logging::init(config.logging.dir.as_deref(), args.verbose)?;

  let writer = BackgroundWriter::new();
  let store = RemoteStore::from_config(&config.remote)
    .map_err(|e| eyre!("Failed to create remote store client: {}", e))?;

  let result = run(args.command, &config, store, writer.clone()).await;

  // Let detached writes finish instead of dropping them with the runtime.
  writer.drain().await;
  result
}

async fn run(
  command: Command,
  config: &Config,
  store: RemoteStore,
  writer: BackgroundWriter,
) -> Result<()> {
  match command {
    Command::Get { key } => {
      require_remote(&store)?;
      let service = CacheService::new(store, writer);
      match service.get::<serde_json::Value>(&key).await {
        Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        None => println!("(miss)"),
      }
    }
    Command::Invalidate { key } => {
      require_remote(&store)?;
      let service = CacheService::new(store, writer);
      if !service.invalidate(&key).await {
        return Err(eyre!("Failed to invalidate {}", key));
      }
      println!("invalidated {}", key);
    }
    Command::InvalidatePattern { pattern } => {
      require_remote(&store)?;
      let service = CacheService::new(store, writer);
      let removed = service.invalidate_pattern(&pattern).await;
      println!("removed {} keys matching {}", removed, pattern);
    }
    Command::Clear => {
      let cache = open_local(config, writer)?;
      let failed = cache.clear().await;
      if failed.is_empty() {
        println!("cleared all local tiers");
      } else {
        println!("cleared local tiers; failed: {}", failed.join(", "));
      }
    }
    Command::Stats => {
      let cache = open_local(config, writer)?;
      println!("{:<12} {:>8} {:>12} {:>10}", "TIER", "ENTRIES", "BYTES", "AVAILABLE");
      for tier in cache.stats().await {
        println!(
          "{:<12} {:>8} {:>12} {:>10}",
          tier.name, tier.entries, tier.approx_bytes, tier.available
        );
      }
      let remote = if !store.is_enabled() {
        "disabled"
      } else if store.is_available().await {
        "available"
      } else {
        "unreachable"
      };
      println!("{:<12} {:>8} {:>12} {:>10}", "remote", "-", "-", remote);
    }
    Command::Ratelimit { action } => {
      require_remote(&store)?;
      let limiter = SlidingWindowLimiter::new(store);
      match action {
        RatelimitAction::Status { identifier, tier } => {
          let status = limiter.get_status(&identifier, tier).await;
          println!(
            "{} ({}): {} used, {} remaining of {}",
            identifier, tier, status.count, status.remaining, status.limit
          );
        }
        RatelimitAction::Reset { identifier } => {
          if !limiter.reset_limit(&identifier).await {
            return Err(eyre!("Failed to reset rate limit for {}", identifier));
          }
          println!("reset rate limit for {}", identifier);
        }
      }
    }
    Command::Preload { urls } => {
      let http = reqwest::Client::builder()
        .timeout(config.remote.timeout())
        .build()?;
      let started = preload_images(&http, &urls, &writer);
      println!("preloading {} of {} urls", started, urls.len());
    }
  }

  Ok(())
}

fn open_local(config: &Config, writer: BackgroundWriter) -> Result<TieredCache> {
  let dir = config.local.data_dir()?;
  TieredCache::open(&dir, config.local.persistent_quota_bytes, config.local.ttl(), writer)
    .map_err(|e| eyre!("Failed to open local cache at {}: {}", dir.display(), e))
}

fn require_remote(store: &RemoteStore) -> Result<()> {
  if store.is_enabled() {
    Ok(())
  } else {
    Err(eyre!(
      "Remote store not configured. Set KV_REST_API_URL and KV_REST_API_TOKEN."
    ))
  }
}
