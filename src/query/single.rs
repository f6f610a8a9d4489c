//! Keyed family of resources sharing one endpoint template.

use std::sync::Arc;

use super::client::QueryClient;
use super::options::QueryOptions;
use super::resource::Resource;

/// Maps keys to endpoints and hands out the resource for each.
///
/// ```ignore
/// let users = client.single_query(|id| format!("/users/{id}"), QueryOptions::new().group("users"));
/// users.get("42").fetch().await;
/// ```
#[derive(Clone)]
pub struct SingleQuery {
  client: QueryClient,
  endpoint_for: Arc<dyn Fn(&str) -> String + Send + Sync>,
  options: QueryOptions,
}

impl SingleQuery {
  pub(crate) fn new<F>(client: QueryClient, endpoint_for: F, options: QueryOptions) -> Self
  where
    F: Fn(&str) -> String + Send + Sync + 'static,
  {
    Self {
      client,
      endpoint_for: Arc::new(endpoint_for),
      options,
    }
  }

  /// Endpoint derived from `key`.
  pub fn endpoint(&self, key: &str) -> String {
    (self.endpoint_for)(key)
  }

  /// Resource for `key`, registered with this family's options on first use.
  pub fn get(&self, key: &str) -> Resource {
    let options = self.options.clone();
    self.client.query_with(self.endpoint(key), &options)
  }
}

#[cfg(test)]
mod tests {
  use crate::error::FetchError;
  use crate::query::{QueryClient, QueryConfig, QueryOptions};
  use serde_json::json;

  #[tokio::test]
  async fn test_keys_map_to_endpoints() {
    let client = QueryClient::new(
      QueryConfig::default().with_fetcher(|endpoint| async move { Ok::<_, FetchError>(json!(endpoint)) }),
    );
    let users = client.single_query(|id| format!("/users/{}", id), QueryOptions::new().group("users"));

    assert_eq!(users.endpoint("7"), "/users/7");

    let seven = users.get("7");
    seven.fetch().await;
    assert_eq!(seven.data(), Some(json!("/users/7")));
    assert_eq!(seven.group(), Some("users".to_string()));

    users.get("8");
    assert_eq!(client.group("users").len(), 2);
  }

  #[tokio::test]
  async fn test_same_key_reuses_resource() {
    let client = QueryClient::new(
      QueryConfig::default().with_fetcher(|endpoint| async move { Ok::<_, FetchError>(json!(endpoint)) }),
    );
    let users = client.single_query(|id| format!("/users/{}", id), QueryOptions::new());

    users.get("1").fetch().await;
    assert_eq!(users.get("1").data(), Some(json!("/users/1")));
    assert_eq!(client.endpoints(), vec!["/users/1"]);
  }
}
