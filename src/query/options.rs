//! Query configuration, per-resource overrides and operation options.

use color_eyre::Result;
use futures::future::BoxFuture;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::state::ResourceState;
use crate::error::FetchError;
use crate::fetcher::{fetcher_fn, FetchResult, Fetcher, HttpFetcher, RequestInit};

/// Default age after which cached data is revalidated.
pub const DEFAULT_CACHE_TIMEOUT: Duration = Duration::from_millis(2000);
/// Default delay before `on_loading_slow` fires.
pub const DEFAULT_LOADING_SLOW_TIMEOUT: Duration = Duration::from_millis(30_000);
/// Default number of retries after a failed fetch.
pub const DEFAULT_RETRY_COUNT: u32 = 5;
/// Shortest accepted retry delay.
pub const MIN_RETRY_DELAY: Duration = Duration::from_millis(1000);
/// Delay used when no valid retry delay is configured.
pub const FALLBACK_RETRY_DELAY: Duration = Duration::from_millis(10_000);

/// Called with the resource state after a successful fetch.
pub type OnSuccess = Arc<dyn Fn(&ResourceState) + Send + Sync>;
/// Called with the resource state and the failure after a failed fetch.
pub type OnError = Arc<dyn Fn(&ResourceState, &FetchError) + Send + Sync>;
/// Called when a fetch is still loading after `loading_slow_timeout`.
pub type OnLoadingSlow = Arc<dyn Fn(&ResourceState) + Send + Sync>;

/// Resolved configuration for a query client or a single resource.
///
/// Immutable once built: per-resource [`QueryOptions`] produce a new value
/// instead of changing this one.
#[derive(Clone)]
pub struct QueryConfig {
  pub(crate) base_uri: String,
  pub(crate) base_init: RequestInit,
  pub(crate) fetcher: Option<Fetcher>,
  pub(crate) cache_timeout: Option<Duration>,
  pub(crate) on_error: Option<OnError>,
  pub(crate) on_success: Option<OnSuccess>,
  pub(crate) loading_slow_timeout: Duration,
  pub(crate) on_loading_slow: Option<OnLoadingSlow>,
  pub(crate) retry_count: u32,
  pub(crate) retry_delay: Option<Duration>,
  pub(crate) should_retry_when_error: bool,
  http: reqwest::Client,
}

impl Default for QueryConfig {
  fn default() -> Self {
    Self {
      base_uri: String::new(),
      base_init: RequestInit::default(),
      fetcher: None,
      cache_timeout: Some(DEFAULT_CACHE_TIMEOUT),
      on_error: None,
      on_success: None,
      loading_slow_timeout: DEFAULT_LOADING_SLOW_TIMEOUT,
      on_loading_slow: None,
      retry_count: DEFAULT_RETRY_COUNT,
      retry_delay: None,
      should_retry_when_error: false,
      http: reqwest::Client::new(),
    }
  }
}

impl QueryConfig {
  pub fn new() -> Self {
    Self::default()
  }

  /// Prefix prepended to every endpoint by the default fetcher.
  pub fn with_base_uri(mut self, base_uri: impl Into<String>) -> Self {
    self.base_uri = base_uri.into();
    self
  }

  /// Request defaults for the default fetcher.
  pub fn with_base_init(mut self, init: RequestInit) -> Self {
    self.base_init = init;
    self
  }

  /// Replace the default HTTP fetcher.
  pub fn with_fetcher<F, Fut>(mut self, f: F) -> Self
  where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = FetchResult> + Send + 'static,
  {
    self.fetcher = Some(fetcher_fn(f));
    self
  }

  /// Age after which cached data is revalidated; `None` never revalidates.
  pub fn with_cache_timeout(mut self, timeout: Option<Duration>) -> Self {
    self.cache_timeout = timeout;
    self
  }

  pub fn with_on_error(mut self, f: impl Fn(&ResourceState, &FetchError) + Send + Sync + 'static) -> Self {
    self.on_error = Some(Arc::new(f));
    self
  }

  pub fn with_on_success(mut self, f: impl Fn(&ResourceState) + Send + Sync + 'static) -> Self {
    self.on_success = Some(Arc::new(f));
    self
  }

  pub fn with_loading_slow_timeout(mut self, timeout: Duration) -> Self {
    self.loading_slow_timeout = timeout;
    self
  }

  pub fn with_on_loading_slow(mut self, f: impl Fn(&ResourceState) + Send + Sync + 'static) -> Self {
    self.on_loading_slow = Some(Arc::new(f));
    self
  }

  pub fn with_retry_count(mut self, count: u32) -> Self {
    self.retry_count = count;
    self
  }

  /// Delay between retries. Values under one second fall back to ten seconds.
  pub fn with_retry_delay(mut self, delay: Duration) -> Self {
    self.retry_delay = Some(delay);
    self
  }

  pub fn with_retry_when_error(mut self, enabled: bool) -> Self {
    self.should_retry_when_error = enabled;
    self
  }

  pub fn base_uri(&self) -> &str {
    &self.base_uri
  }

  pub fn cache_timeout(&self) -> Option<Duration> {
    self.cache_timeout
  }

  pub fn retry_count(&self) -> u32 {
    self.retry_count
  }

  pub fn should_retry_when_error(&self) -> bool {
    self.should_retry_when_error
  }

  /// The delay actually used between retries.
  pub fn effective_retry_delay(&self) -> Duration {
    match self.retry_delay {
      Some(delay) if delay >= MIN_RETRY_DELAY => delay,
      _ => FALLBACK_RETRY_DELAY,
    }
  }

  /// Run the configured fetcher, or the HTTP fetcher built from
  /// `base_uri` and `base_init`.
  pub(crate) fn fetch(&self, endpoint: &str) -> BoxFuture<'static, FetchResult> {
    match &self.fetcher {
      Some(fetcher) => fetcher(endpoint.to_string()),
      None => HttpFetcher::new(self.http.clone(), self.base_uri.clone(), self.base_init.clone())
        .fetch(endpoint),
    }
  }
}

impl fmt::Debug for QueryConfig {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("QueryConfig")
      .field("base_uri", &self.base_uri)
      .field("base_init", &self.base_init)
      .field("custom_fetcher", &self.fetcher.is_some())
      .field("cache_timeout", &self.cache_timeout)
      .field("loading_slow_timeout", &self.loading_slow_timeout)
      .field("retry_count", &self.retry_count)
      .field("retry_delay", &self.retry_delay)
      .field("should_retry_when_error", &self.should_retry_when_error)
      .finish_non_exhaustive()
  }
}

/// Per-resource overrides applied on top of the client's [`QueryConfig`],
/// plus the resource's group tags.
#[derive(Clone, Default)]
pub struct QueryOptions {
  pub base_uri: Option<String>,
  pub base_init: Option<RequestInit>,
  pub fetcher: Option<Fetcher>,
  /// `Some(None)` disables expiry for this resource
  pub cache_timeout: Option<Option<Duration>>,
  pub on_error: Option<OnError>,
  pub on_success: Option<OnSuccess>,
  pub loading_slow_timeout: Option<Duration>,
  pub on_loading_slow: Option<OnLoadingSlow>,
  pub retry_count: Option<u32>,
  pub retry_delay: Option<Duration>,
  pub should_retry_when_error: Option<bool>,
  pub group: Option<String>,
  pub groups: Option<Vec<String>>,
}

impl QueryOptions {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn group(mut self, tag: impl Into<String>) -> Self {
    self.group = Some(tag.into());
    self
  }

  pub fn groups<I, S>(mut self, tags: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.groups = Some(tags.into_iter().map(Into::into).collect());
    self
  }

  pub fn fetcher<F, Fut>(mut self, f: F) -> Self
  where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = FetchResult> + Send + 'static,
  {
    self.fetcher = Some(fetcher_fn(f));
    self
  }

  pub fn cache_timeout(mut self, timeout: Option<Duration>) -> Self {
    self.cache_timeout = Some(timeout);
    self
  }

  pub fn retry_when_error(mut self, enabled: bool) -> Self {
    self.should_retry_when_error = Some(enabled);
    self
  }

  pub fn retry_count(mut self, count: u32) -> Self {
    self.retry_count = Some(count);
    self
  }

  pub fn retry_delay(mut self, delay: Duration) -> Self {
    self.retry_delay = Some(delay);
    self
  }

  /// Produce the configuration a resource runs with.
  pub fn resolve(&self, base: &QueryConfig) -> QueryConfig {
    let mut config = base.clone();
    if let Some(base_uri) = &self.base_uri {
      config.base_uri = base_uri.clone();
    }
    if let Some(init) = &self.base_init {
      config.base_init = init.clone();
    }
    if let Some(fetcher) = &self.fetcher {
      config.fetcher = Some(fetcher.clone());
    }
    if let Some(timeout) = self.cache_timeout {
      config.cache_timeout = timeout;
    }
    if let Some(on_error) = &self.on_error {
      config.on_error = Some(on_error.clone());
    }
    if let Some(on_success) = &self.on_success {
      config.on_success = Some(on_success.clone());
    }
    if let Some(timeout) = self.loading_slow_timeout {
      config.loading_slow_timeout = timeout;
    }
    if let Some(on_loading_slow) = &self.on_loading_slow {
      config.on_loading_slow = Some(on_loading_slow.clone());
    }
    if let Some(count) = self.retry_count {
      config.retry_count = count;
    }
    if let Some(delay) = self.retry_delay {
      config.retry_delay = Some(delay);
    }
    if let Some(enabled) = self.should_retry_when_error {
      config.should_retry_when_error = enabled;
    }
    config
  }
}

impl fmt::Debug for QueryOptions {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("QueryOptions")
      .field("base_uri", &self.base_uri)
      .field("cache_timeout", &self.cache_timeout)
      .field("retry_count", &self.retry_count)
      .field("retry_delay", &self.retry_delay)
      .field("should_retry_when_error", &self.should_retry_when_error)
      .field("group", &self.group)
      .field("groups", &self.groups)
      .finish_non_exhaustive()
  }
}

/// Options for [`Resource::refetch`](super::Resource::refetch).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefetchOptions {
  /// Keep `is_loading` false while this refetch runs
  pub disable_loading: bool,
}

impl RefetchOptions {
  pub fn silent() -> Self {
    Self {
      disable_loading: true,
    }
  }
}

/// Transform applied to the current data of a resource during a mutation.
pub type PopulateCache = Box<dyn FnOnce(Option<&Value>) -> Result<Value> + Send>;

/// Options for a mutation.
///
/// With neither `data` nor `populate_cache`, a mutation simply refetches.
#[derive(Default)]
pub struct MutateOptions {
  pub data: Option<Value>,
  pub populate_cache: Option<PopulateCache>,
  pub refetch: Option<bool>,
}

impl MutateOptions {
  pub fn new() -> Self {
    Self::default()
  }

  /// Replace the data with `data`.
  pub fn data(mut self, data: Value) -> Self {
    self.data = Some(data);
    self
  }

  /// Derive the new data from the current data. Takes priority over `data`.
  pub fn populate_cache(
    mut self,
    f: impl FnOnce(Option<&Value>) -> Result<Value> + Send + 'static,
  ) -> Self {
    self.populate_cache = Some(Box::new(f));
    self
  }

  /// Force or skip the refetch that follows the local update.
  pub fn refetch(mut self, refetch: bool) -> Self {
    self.refetch = Some(refetch);
    self
  }

  /// Whether a refetch follows; defaults to refetching only when no local
  /// value was supplied.
  pub(crate) fn should_refetch(&self) -> bool {
    self
      .refetch
      .unwrap_or(self.data.is_none() && self.populate_cache.is_none())
  }
}

impl fmt::Debug for MutateOptions {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MutateOptions")
      .field("data", &self.data)
      .field("populate_cache", &self.populate_cache.is_some())
      .field("refetch", &self.refetch)
      .finish()
  }
}
