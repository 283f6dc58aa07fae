use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use toolflow_engine::FlowExecutionResult;
use tracing::debug;

/// Fingerprint-keyed store of finished executions.
///
/// Entries expire `ttl` after insertion and are never mutated; a lookup never
/// returns an expired entry. Concurrent loads of the same key are coalesced
/// into a single call of the init future.
#[derive(Clone)]
pub struct ResultCache {
  inner: Cache<String, Arc<FlowExecutionResult>>,
  ttl: Duration,
}

impl ResultCache {
  pub fn new(ttl: Duration, capacity: u64) -> Self {
    let inner = Cache::builder()
      .time_to_live(ttl)
      .max_capacity(capacity)
      .build();
    Self { inner, ttl }
  }

  pub fn ttl(&self) -> Duration {
    self.ttl
  }

  pub async fn get(&self, fingerprint: &str) -> Option<Arc<FlowExecutionResult>> {
    self.inner.get(fingerprint).await
  }

  pub async fn insert(&self, fingerprint: String, result: Arc<FlowExecutionResult>) {
    self.inner.insert(fingerprint, result).await;
  }

  /// Return the cached entry or run `init` to produce one.
  ///
  /// Only one `init` runs per key at a time; other callers wait for it and
  /// share its outcome. Errors are handed to every waiter and not cached.
  pub async fn try_get_with<F, E>(&self, fingerprint: String, init: F) -> Result<Arc<FlowExecutionResult>, Arc<E>>
  where
    F: Future<Output = Result<Arc<FlowExecutionResult>, E>>,
    E: Send + Sync + 'static,
  {
    self.inner.try_get_with(fingerprint, init).await
  }

  pub async fn invalidate(&self, fingerprint: &str) {
    self.inner.invalidate(fingerprint).await;
  }

  pub fn invalidate_all(&self) {
    self.inner.invalidate_all();
  }

  /// Approximate number of live entries; exact after [`ResultCache::sweep`].
  pub fn entry_count(&self) -> u64 {
    self.inner.entry_count()
  }

  /// Drop expired entries now instead of waiting for the next lookup.
  pub async fn sweep(&self) {
    self.inner.run_pending_tasks().await;
    debug!(entries = self.inner.entry_count(), "cache_swept");
  }

  /// Sweep every `interval` on a background task until `cancel` fires.
  pub fn spawn_sweeper(&self, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
    let cache = self.clone();
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(interval);
      ticker.tick().await;
      loop {
        tokio::select! {
          _ = cancel.cancelled() => break,
          _ = ticker.tick() => cache.sweep().await,
        }
      }
    })
  }
}

impl std::fmt::Debug for ResultCache {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ResultCache")
      .field("ttl", &self.ttl)
      .field("entries", &self.inner.entry_count())
      .finish()
  }
}
