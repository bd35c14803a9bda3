//! Detached, fire-and-forget work.
//!
//! Cache writes that must not delay the caller are spawned through a
//! [`BackgroundWriter`]. Their outcome only ever reaches the log. The writer
//! tracks every task so a process can [`drain`](BackgroundWriter::drain)
//! pending writes before exiting instead of having the runtime cancel them.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::task::TaskTracker;

#[derive(Debug, Clone, Default)]
pub struct BackgroundWriter {
  tracker: TaskTracker,
  /// Serializes drains; a reopen must not race another caller's wait.
  draining: Arc<Mutex<()>>,
}

impl BackgroundWriter {
  pub fn new() -> Self {
    Self::default()
  }

  /// Spawn `work` without waiting for it.
  ///
  /// `what` and `key` label the log line emitted if the work fails.
  pub fn spawn<F, E>(&self, what: &'static str, key: impl Into<String>, work: F)
  where
    F: Future<Output = Result<(), E>> + Send + 'static,
    E: Display + Send + 'static,
  {
    let key = key.into();
    self.tracker.spawn(async move {
      match work.await {
        Ok(()) => tracing::trace!(key = %key, what, "background write completed"),
        Err(e) => tracing::warn!(key = %key, what, error = %e, "background write failed"),
      }
    });
  }

  /// Number of tasks still running.
  pub fn pending(&self) -> usize {
    self.tracker.len()
  }

  /// Wait for every task spawned so far. New tasks may still be spawned afterwards.
  ///
  /// Concurrent drains run one after another.
  pub async fn drain(&self) {
    let _draining = self.draining.lock().await;
    self.tracker.close();
    self.tracker.wait().await;
    self.tracker.reopen();
  }
}
