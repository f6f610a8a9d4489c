//! Query client: owns the cache, the registry and the dedupe counters.

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tracing::debug;

use super::options::{MutateOptions, QueryConfig, QueryOptions};
use super::registry::{DedupeCounters, Registry, ResourceEntry};
use super::resource::Resource;
use super::single::SingleQuery;
use crate::cache::{CacheRecord, CacheStore};

pub(crate) struct ClientInner {
  pub(crate) config: QueryConfig,
  pub(crate) cache: CacheStore,
  pub(crate) registry: Registry,
  pub(crate) dedupe: DedupeCounters,
}

impl ClientInner {
  /// Drop the cache record and reset state and dedupe counter of one entry.
  pub(crate) fn reset_entry(&self, entry: &ResourceEntry) {
    self.cache.invalidate(&entry.endpoint);
    entry.update(|s| s.reset());
    self.dedupe.reset(&entry.endpoint);
  }
}

/// Entry point for fetching and caching endpoint data.
///
/// Each client owns an independent cache and registry; clones share them.
///
/// # Example
///
/// ```ignore
/// let client = QueryClient::new(QueryConfig::new().with_base_uri("https://api.example.com"));
/// let users = client.query_with("/users", &QueryOptions::new().group("people"));
///
/// users.fetch().await;
/// if let Some(data) = users.data() {
///     render(data);
/// }
///
/// // After a write elsewhere
/// client.clear_group(Some("people"));
/// ```
#[derive(Clone)]
pub struct QueryClient {
  pub(crate) inner: Arc<ClientInner>,
}

impl QueryClient {
  pub fn new(config: QueryConfig) -> Self {
    Self {
      inner: Arc::new(ClientInner {
        config,
        cache: CacheStore::new(),
        registry: Registry::default(),
        dedupe: DedupeCounters::default(),
      }),
    }
  }

  /// Client-wide defaults.
  pub fn config(&self) -> &QueryConfig {
    &self.inner.config
  }

  /// Handle for `endpoint`, registering it with the client defaults.
  pub fn query(&self, endpoint: impl Into<String>) -> Resource {
    self.query_with(endpoint, &QueryOptions::default())
  }

  /// Handle for `endpoint`, registering it with `options` on first access.
  ///
  /// Once registered, an endpoint keeps its first configuration and tags;
  /// options passed on later calls are ignored.
  pub fn query_with(&self, endpoint: impl Into<String>, options: &QueryOptions) -> Resource {
    let endpoint = endpoint.into();
    let entry = self.inner.registry.get_or_insert_with(&endpoint, || {
      debug!(endpoint = endpoint.as_str(), "registering resource");
      ResourceEntry::new(
        endpoint.clone(),
        options.group.clone(),
        options.groups.clone(),
        Arc::new(options.resolve(&self.inner.config)),
      )
    });
    Resource::new(Arc::clone(&self.inner), entry)
  }

  /// Handle for an already registered endpoint.
  pub fn resource(&self, endpoint: &str) -> Option<Resource> {
    self
      .inner
      .registry
      .get(endpoint)
      .map(|entry| Resource::new(Arc::clone(&self.inner), entry))
  }

  /// Family of resources whose endpoints are derived from a key.
  pub fn single_query<F>(&self, endpoint_for: F, options: QueryOptions) -> SingleQuery
  where
    F: Fn(&str) -> String + Send + Sync + 'static,
  {
    SingleQuery::new(self.clone(), endpoint_for, options)
  }

  /// Mutate a registered endpoint. See [`Resource::mutate`].
  pub async fn mutate(&self, endpoint: &str, options: MutateOptions) -> Result<()> {
    let resource = self
      .resource(endpoint)
      .ok_or_else(|| eyre!("Unknown endpoint: {}", endpoint))?;
    resource.mutate(options).await
  }

  /// Reset one endpoint, or every endpoint and the whole cache when `None`.
  ///
  /// Registered resources stay registered; only their state is reset.
  pub fn clear(&self, endpoint: Option<&str>) {
    match endpoint {
      Some(endpoint) => match self.inner.registry.get(endpoint) {
        Some(entry) => self.inner.reset_entry(&entry),
        None => {
          self.inner.cache.invalidate(endpoint);
          self.inner.dedupe.reset(endpoint);
        }
      },
      None => {
        debug!("clearing all resources");
        self.inner.cache.clear();
        for entry in self.inner.registry.entries() {
          entry.update(|s| s.reset());
        }
        self.inner.dedupe.reset_all();
      }
    }
  }

  /// Reset every resource tagged with `tag`. With `None`, resets the
  /// resources whose `group` is unset, including those tagged only
  /// through `groups`.
  pub fn clear_group(&self, tag: Option<&str>) {
    let matched = self.matching(tag);
    debug!(group = tag, count = matched.len(), "clearing group");
    for entry in matched {
      self.inner.reset_entry(&entry);
    }
  }

  /// Resources tagged with `tag` through `group` or `groups`, in
  /// registration order. The list is a snapshot.
  pub fn group(&self, tag: &str) -> Vec<Resource> {
    self
      .matching(Some(tag))
      .into_iter()
      .map(|entry| Resource::new(Arc::clone(&self.inner), entry))
      .collect()
  }

  fn matching(&self, tag: Option<&str>) -> Vec<Arc<ResourceEntry>> {
    self
      .inner
      .registry
      .entries()
      .into_iter()
      .filter(|entry| {
        entry.read(|s| match tag {
          Some(tag) => s.in_group(tag),
          None => s.is_ungrouped(),
        })
      })
      .collect()
  }

  /// The cache record for an endpoint, if present.
  pub fn cache_record(&self, endpoint: &str) -> Option<CacheRecord> {
    self.inner.cache.get(endpoint)
  }

  /// Endpoints in registration order.
  pub fn endpoints(&self) -> Vec<String> {
    self
      .inner
      .registry
      .entries()
      .iter()
      .map(|entry| entry.endpoint.clone())
      .collect()
  }
}

impl std::fmt::Debug for QueryClient {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("QueryClient")
      .field("config", &self.inner.config)
      .field("resources", &self.inner.registry.len())
      .field("cached", &self.inner.cache.len())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::FetchError;
  use serde_json::json;

  fn echo_client() -> QueryClient {
    QueryClient::new(
      QueryConfig::default()
        .with_cache_timeout(None)
        .with_fetcher(|endpoint| async move { Ok::<_, FetchError>(json!(endpoint)) }),
    )
  }

  async fn tagged_resources(client: &QueryClient) -> Vec<Resource> {
    let resources = vec![
      client.query_with("/a1", &QueryOptions::new().group("a")),
      client.query_with("/a2", &QueryOptions::new().group("a")),
      client.query_with("/b1", &QueryOptions::new().group("b")),
    ];
    for resource in &resources {
      resource.fetch().await;
    }
    resources
  }

  #[tokio::test]
  async fn test_clear_group_touches_only_tagged() {
    let client = echo_client();
    let resources = tagged_resources(&client).await;

    client.clear_group(Some("a"));

    assert!(resources[0].data().is_none());
    assert!(resources[1].data().is_none());
    assert!(client.cache_record("/a1").is_none());
    assert!(client.cache_record("/a2").is_none());

    assert_eq!(resources[2].data(), Some(json!("/b1")));
    assert!(client.cache_record("/b1").is_some());
  }

  #[tokio::test]
  async fn test_clear_group_matches_groups_list() {
    let client = echo_client();
    let multi = client.query_with("/multi", &QueryOptions::new().groups(["x", "y"]));
    multi.fetch().await;

    client.clear_group(Some("y"));
    assert!(multi.data().is_none());
  }

  #[tokio::test]
  async fn test_clear_group_without_tag_resets_ungrouped() {
    let client = echo_client();
    let tagged = client.query_with("/tagged", &QueryOptions::new().group("a"));
    let plain = client.query("/plain");
    let listed = client.query_with("/listed", &QueryOptions::new().groups(["x"]));
    tagged.fetch().await;
    plain.fetch().await;
    listed.fetch().await;

    client.clear_group(None);
    assert!(plain.data().is_none());
    assert!(listed.data().is_none());
    assert!(client.cache_record("/listed").is_none());
    assert_eq!(tagged.data(), Some(json!("/tagged")));
  }

  #[tokio::test]
  async fn test_group_lists_by_group_and_groups() {
    let client = echo_client();
    tagged_resources(&client).await;
    client.query_with("/multi", &QueryOptions::new().groups(["b", "c"]));

    let endpoints: Vec<_> = client
      .group("b")
      .iter()
      .map(|r| r.endpoint().to_string())
      .collect();
    assert_eq!(endpoints, vec!["/b1", "/multi"]);
    assert!(client.group("missing").is_empty());
  }

  #[tokio::test]
  async fn test_global_clear_resets_everything() {
    let client = echo_client();
    let resources = tagged_resources(&client).await;

    client.clear(None);

    for resource in &resources {
      let state = resource.snapshot();
      assert!(state.data.is_none());
      assert!(state.is_error.is_none());
      assert!(!state.is_loading);
    }
    assert_eq!(client.inner.cache.len(), 0);
    // Entries survive a global clear
    assert_eq!(client.endpoints(), vec!["/a1", "/a2", "/b1"]);
  }

  #[tokio::test]
  async fn test_clear_single_endpoint() {
    let client = echo_client();
    let resources = tagged_resources(&client).await;

    client.clear(Some("/a1"));
    assert!(resources[0].data().is_none());
    assert!(client.cache_record("/a1").is_none());
    assert_eq!(resources[1].data(), Some(json!("/a2")));
  }

  #[tokio::test]
  async fn test_clear_unknown_endpoint_is_harmless() {
    let client = echo_client();
    client.clear(Some("/never-registered"));
    assert!(client.endpoints().is_empty());
  }

  #[tokio::test]
  async fn test_cleared_resource_fetches_again() {
    let client = echo_client();
    let users = client.query("/users");
    users.fetch().await;

    client.clear(None);
    users.fetch().await;
    assert_eq!(users.data(), Some(json!("/users")));
  }

  #[tokio::test]
  async fn test_mutate_unknown_endpoint_errors() {
    let client = echo_client();
    let result = client
      .mutate("/missing", MutateOptions::new().data(json!(1)))
      .await;
    assert!(result.is_err());
  }

  #[tokio::test]
  async fn test_mutate_through_client() {
    let client = echo_client();
    let users = client.query("/users");

    client
      .mutate("/users", MutateOptions::new().data(json!({ "name": "ada" })))
      .await
      .unwrap();
    assert_eq!(users.data(), Some(json!({ "name": "ada" })));
  }

  #[tokio::test]
  async fn test_clients_are_independent() {
    let first = echo_client();
    let second = echo_client();
    first.query("/users").fetch().await;

    assert!(second.cache_record("/users").is_none());
    assert!(second.resource("/users").is_none());
  }
}
