//! Per-endpoint handle: fetch controller, dedupe gate, retries and mutation.

use color_eyre::Result;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::client::ClientInner;
use super::options::{MutateOptions, QueryConfig, RefetchOptions};
use super::registry::ResourceEntry;
use super::state::ResourceState;
use crate::cache::Freshness;
use crate::error::FetchError;

/// Handle to one registered endpoint.
///
/// Cheap to clone; every clone drives the same entry. The operations run with
/// the configuration that was resolved when the endpoint was first registered.
#[derive(Clone)]
pub struct Resource {
  client: Arc<ClientInner>,
  entry: Arc<ResourceEntry>,
}

impl Resource {
  pub(crate) fn new(client: Arc<ClientInner>, entry: Arc<ResourceEntry>) -> Self {
    Self { client, entry }
  }

  pub fn endpoint(&self) -> &str {
    &self.entry.endpoint
  }

  pub fn group(&self) -> Option<String> {
    self.entry.read(|s| s.group.clone())
  }

  pub fn groups(&self) -> Option<Vec<String>> {
    self.entry.read(|s| s.groups.clone())
  }

  pub fn data(&self) -> Option<Value> {
    self.entry.read(|s| s.data.clone())
  }

  pub fn is_error(&self) -> Option<FetchError> {
    self.entry.read(|s| s.is_error.clone())
  }

  pub fn is_loading(&self) -> bool {
    self.entry.read(|s| s.is_loading)
  }

  /// Copy of the full state.
  pub fn snapshot(&self) -> ResourceState {
    self.entry.snapshot()
  }

  /// Receiver notified on every state change.
  pub fn subscribe(&self) -> watch::Receiver<ResourceState> {
    self.entry.subscribe()
  }

  /// The configuration this resource runs with.
  pub fn config(&self) -> &QueryConfig {
    &self.entry.config
  }

  /// Fetch through the dedupe gate.
  ///
  /// Only the first call of a burst performs the fetch and waits for it.
  /// Calls arriving while it is in flight return at once without a result.
  ///
  /// The fetch runs on its own task: dropping the returned future stops the
  /// wait, not the fetch, so the gate reopens and the loading flag clears
  /// either way.
  pub async fn fetch(&self) {
    let endpoint = self.endpoint();
    if self.client.dedupe.hit(endpoint) > 1 {
      debug!(endpoint, "fetch already in flight, skipping");
      return;
    }
    self.fetch_data(true).await;
  }

  /// Drop the cached record and fetch again, bypassing the dedupe gate.
  pub async fn refetch(&self, options: RefetchOptions) {
    self.entry.control().disable_loading = options.disable_loading;
    self.client.cache.invalidate(self.endpoint());
    self.fetch_data(false).await;
  }

  /// Apply a local update and optionally refetch.
  ///
  /// The new value is visible in the cache and the state before this returns
  /// or suspends. Errors from `populate_cache` are returned unchanged and
  /// nothing is written.
  pub async fn mutate(&self, options: MutateOptions) -> Result<()> {
    let refetch = options.should_refetch();
    let MutateOptions {
      data,
      populate_cache,
      ..
    } = options;

    let data = match populate_cache {
      Some(populate) => {
        let current = self.data();
        Some(populate(current.as_ref())?)
      }
      None => data,
    };

    if let Some(data) = data {
      debug!(endpoint = self.endpoint(), "applying local update");
      self.client.cache.store(self.endpoint(), data.clone());
      self.entry.update(|s| s.data = Some(data));
    }

    if refetch {
      self.refetch(RefetchOptions::default()).await;
    }
    Ok(())
  }

  /// Reset this endpoint's cache, state and dedupe counter.
  pub fn clear(&self) {
    self.client.reset_entry(&self.entry);
  }

  // Boxed so the retry task, which calls back into `refetch`, has a
  // concrete future type to spawn. `release_gate` resets the dedupe counter
  // once the cycle ends.
  fn fetch_data(&self, release_gate: bool) -> BoxFuture<'static, ()> {
    let this = self.clone();
    let cycle = tokio::spawn(async move {
      this.run_fetch().await;
      if release_gate {
        this.client.dedupe.reset(this.endpoint());
      }
    });
    let endpoint = self.endpoint().to_string();
    async move {
      if let Err(error) = cycle.await {
        warn!(endpoint = endpoint.as_str(), %error, "fetch cycle did not complete");
      }
    }
    .boxed()
  }

  async fn run_fetch(&self) {
    let config = Arc::clone(&self.entry.config);
    let endpoint = self.endpoint();

    if config.on_loading_slow.is_some() {
      self.arm_slow_timer();
    }

    let outcome = match self.client.cache.get(endpoint) {
      Some(record) => {
        self.entry.update(|s| s.data = Some(record.data.clone()));
        match record.freshness(config.cache_timeout) {
          Freshness::Fresh => {
            debug!(endpoint, "serving cached data");
            None
          }
          Freshness::Stale => {
            debug!(
              endpoint,
              age_ms = record.age().as_millis() as u64,
              "revalidating stale data"
            );
            Some(config.fetch(endpoint).await)
          }
        }
      }
      None => {
        let suppressed = self.entry.control().disable_loading;
        if !suppressed {
          self.entry.update(|s| s.is_loading = true);
        }
        debug!(endpoint, suppressed, "fetching");
        Some(config.fetch(endpoint).await)
      }
    };

    match outcome {
      Some(Ok(data)) => self.on_fetched(&config, data),
      Some(Err(error)) => self.on_failed(&config, error),
      None => {}
    }

    self.entry.update(|s| s.is_loading = false);
  }

  fn on_fetched(&self, config: &QueryConfig, data: Value) {
    self.client.cache.store(self.endpoint(), data.clone());
    self.entry.update(|s| {
      s.data = Some(data);
      s.is_error = None;
    });
    if let Some(on_success) = &config.on_success {
      on_success(&self.entry.snapshot());
    }
  }

  fn on_failed(&self, config: &QueryConfig, error: FetchError) {
    warn!(endpoint = self.endpoint(), %error, "fetch failed");
    self.client.cache.invalidate(self.endpoint());
    self.entry.update(|s| {
      s.is_error = Some(error.clone());
      s.data = None;
    });
    if let Some(on_error) = &config.on_error {
      on_error(&self.entry.snapshot(), &error);
    }
    if config.should_retry_when_error {
      self.arm_retry_timer(config);
    }
  }

  fn arm_slow_timer(&self) {
    let timeout = self.entry.config.loading_slow_timeout;
    let mut control = self.entry.control();
    let generation = control.slow_timer.rearm();

    let this = self.clone();
    let handle = tokio::spawn(async move {
      tokio::time::sleep(timeout).await;
      if !this.entry.control().slow_timer.release(generation) {
        return;
      }
      let snapshot = this.entry.snapshot();
      if !snapshot.is_loading {
        return;
      }
      if let Some(on_loading_slow) = &this.entry.config.on_loading_slow {
        warn!(
          endpoint = this.endpoint(),
          timeout_ms = timeout.as_millis() as u64,
          "loading is slow"
        );
        on_loading_slow(&snapshot);
      }
    });
    control.slow_timer.set(handle);
  }

  fn arm_retry_timer(&self, config: &QueryConfig) {
    let delay = config.effective_retry_delay();
    let retry_count = config.retry_count;
    let mut control = self.entry.control();
    let generation = control.retry_timer.rearm();
    debug!(
      endpoint = self.endpoint(),
      attempt = control.retry_attempt,
      delay_ms = delay.as_millis() as u64,
      "retry scheduled"
    );

    let this = self.clone();
    let handle = tokio::spawn(async move {
      tokio::time::sleep(delay).await;
      if this.next_retry(generation, retry_count) {
        this.refetch(RefetchOptions::silent()).await;
      }
    });
    control.retry_timer.set(handle);
  }

  /// Decide, on retry timer expiry, whether another attempt runs.
  fn next_retry(&self, generation: u64, retry_count: u32) -> bool {
    let mut control = self.entry.control();
    if !control.retry_timer.release(generation) {
      return false;
    }
    if control.retry_attempt >= retry_count {
      debug!(endpoint = self.endpoint(), retry_count, "retries exhausted");
      control.retry_attempt = 0;
      control.disable_loading = false;
      return false;
    }
    control.retry_attempt += 1;
    info!(
      endpoint = self.endpoint(),
      attempt = control.retry_attempt,
      "retrying fetch"
    );
    true
  }

  #[cfg(test)]
  pub(crate) fn retry_attempt(&self) -> u32 {
    self.entry.control().retry_attempt
  }

  #[cfg(test)]
  pub(crate) fn loading_disabled(&self) -> bool {
    self.entry.control().disable_loading
  }
}

impl std::fmt::Debug for Resource {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Resource")
      .field("state", &self.entry.snapshot())
      .finish_non_exhaustive()
  }
}
