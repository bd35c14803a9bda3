//! Tracing subscriber setup.

use color_eyre::{eyre::eyre, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Variable controlling the log filter, e.g. `SFCACHE_LOG=storefront_cache=debug`.
pub const FILTER_ENV: &str = "SFCACHE_LOG";

/// Install a stderr logger, plus a daily-rolling file when `log_dir` is set.
///
/// The returned guard flushes the file writer on drop; hold it until exit.
pub fn init(log_dir: Option<&Path>, verbose: bool) -> Result<Option<WorkerGuard>> {
  let default = if verbose { "debug" } else { "info" };
  let filter = EnvFilter::try_from_env(FILTER_ENV).unwrap_or_else(|_| EnvFilter::new(default));

  let stderr = fmt::layer().with_writer(std::io::stderr).with_target(false);

  let (file, guard) = match log_dir {
    Some(dir) => {
      std::fs::create_dir_all(dir)
        .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;
      let appender = tracing_appender::rolling::daily(dir, "sfcache.log");
      let (writer, guard) = tracing_appender::non_blocking(appender);
      (
        Some(fmt::layer().with_writer(writer).with_ansi(false)),
        Some(guard),
      )
    }
    None => (None, None),
  };

  tracing_subscriber::registry()
    .with(filter)
    .with(stderr)
    .with(file)
    .try_init()
    .map_err(|e| eyre!("Failed to install logger: {}", e))?;

  Ok(guard)
}
