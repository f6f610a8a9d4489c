//! The injected fetch function and the default HTTP implementation.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::FetchError;

/// Result of a single fetcher call.
pub type FetchResult = Result<Value, FetchError>;

/// A function that retrieves the data for an endpoint key.
///
/// Called with the endpoint string and nothing else; everything else
/// (base URI, headers) is captured by the implementation.
pub type Fetcher = Arc<dyn Fn(String) -> BoxFuture<'static, FetchResult> + Send + Sync>;

/// Wrap an async closure into a [`Fetcher`].
///
/// ```ignore
/// let fetcher = fetcher_fn(|endpoint| async move {
///     Ok(serde_json::json!({ "endpoint": endpoint }))
/// });
/// ```
pub fn fetcher_fn<F, Fut>(f: F) -> Fetcher
where
  F: Fn(String) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = FetchResult> + Send + 'static,
{
  Arc::new(move |endpoint| f(endpoint).boxed())
}

/// Transport-level defaults applied to every request of the default fetcher.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RequestInit {
  /// Extra request headers
  #[serde(default)]
  pub headers: BTreeMap<String, String>,
  /// Per-request timeout, in milliseconds in config files
  #[serde(default, rename = "timeout_ms", with = "optional_millis")]
  pub timeout: Option<Duration>,
}

impl RequestInit {
  /// Add a header, replacing any previous value for the same name.
  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.insert(name.into(), value.into());
    self
  }

  /// Set the per-request timeout.
  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = Some(timeout);
    self
  }
}

/// Default fetcher: `GET {base_uri}{endpoint}` decoded as JSON.
#[derive(Clone)]
pub struct HttpFetcher {
  client: reqwest::Client,
  base_uri: String,
  init: RequestInit,
}

impl HttpFetcher {
  pub fn new(client: reqwest::Client, base_uri: impl Into<String>, init: RequestInit) -> Self {
    Self {
      client,
      base_uri: base_uri.into(),
      init,
    }
  }

  /// Fetch a single endpoint.
  ///
  /// Non-success responses become [`FetchError::Status`] carrying the status
  /// code and the JSON-parsed body.
  pub fn fetch(&self, endpoint: &str) -> BoxFuture<'static, FetchResult> {
    let this = self.clone();
    let target = format!("{}{}", self.base_uri, endpoint);
    async move { this.get(&target).await }.boxed()
  }

  async fn get(&self, target: &str) -> FetchResult {
    let url = url::Url::parse(target).map_err(|e| FetchError::Transport {
      message: format!("invalid url {}: {}", target, e),
    })?;

    let mut request = self.client.get(url);
    for (name, value) in &self.init.headers {
      request = request.header(name.as_str(), value.as_str());
    }
    if let Some(timeout) = self.init.timeout {
      request = request.timeout(timeout);
    }

    let response = request.send().await?;
    let status = response.status();
    let body = response.bytes().await?;
    debug!(url = target, status = status.as_u16(), "fetched");

    if !status.is_success() {
      let info = serde_json::from_slice(&body).unwrap_or(Value::Null);
      return Err(FetchError::status(status.as_u16(), info));
    }

    serde_json::from_slice(&body).map_err(|e| FetchError::Decode {
      message: e.to_string(),
    })
  }
}

/// Serde helper for durations written as integer milliseconds.
pub(crate) mod optional_millis {
  use serde::{Deserialize, Deserializer};
  use std::time::Duration;

  pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
  where
    D: Deserializer<'de>,
  {
    let millis: Option<u64> = Option::deserialize(deserializer)?;
    Ok(millis.map(Duration::from_millis))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use wiremock::matchers::{header, method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn fetcher_for(server: &MockServer, init: RequestInit) -> HttpFetcher {
    HttpFetcher::new(reqwest::Client::new(), server.uri(), init)
  }

  #[tokio::test]
  async fn test_success_decodes_json() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/users/1"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 1 })))
      .expect(1)
      .mount(&server)
      .await;

    let fetcher = fetcher_for(&server, RequestInit::default());
    let data = fetcher.fetch("/users/1").await.unwrap();
    assert_eq!(data, json!({ "id": 1 }));
  }

  #[tokio::test]
  async fn test_error_status_carries_parsed_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .respond_with(ResponseTemplate::new(422).set_body_json(json!({ "field": "name" })))
      .mount(&server)
      .await;

    let fetcher = fetcher_for(&server, RequestInit::default());
    let err = fetcher.fetch("/users").await.unwrap_err();
    assert_eq!(err.status_code(), Some(422));
    assert_eq!(err.info(), Some(&json!({ "field": "name" })));
  }

  #[tokio::test]
  async fn test_error_status_with_non_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
      .mount(&server)
      .await;

    let fetcher = fetcher_for(&server, RequestInit::default());
    let err = fetcher.fetch("/health").await.unwrap_err();
    assert_eq!(err, FetchError::status(503, Value::Null));
  }

  #[tokio::test]
  async fn test_applies_request_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(header("authorization", "Bearer abc"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
      .expect(1)
      .mount(&server)
      .await;

    let init = RequestInit::default().with_header("Authorization", "Bearer abc");
    let fetcher = fetcher_for(&server, init);
    assert_eq!(fetcher.fetch("/items").await.unwrap(), json!([]));
  }

  #[tokio::test]
  async fn test_undecodable_success_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
      .mount(&server)
      .await;

    let fetcher = fetcher_for(&server, RequestInit::default());
    let err = fetcher.fetch("/items").await.unwrap_err();
    assert!(matches!(err, FetchError::Decode { .. }));
  }

  #[tokio::test]
  async fn test_invalid_base_uri_is_transport_error() {
    let fetcher = HttpFetcher::new(reqwest::Client::new(), "", RequestInit::default());
    let err = fetcher.fetch("/relative").await.unwrap_err();
    assert!(matches!(err, FetchError::Transport { .. }));
  }

  #[tokio::test]
  async fn test_fetcher_fn_wraps_closure() {
    let fetcher = fetcher_fn(|endpoint| async move { Ok::<_, FetchError>(json!({ "endpoint": endpoint })) });
    let data = fetcher("/a".to_string()).await.unwrap();
    assert_eq!(data, json!({ "endpoint": "/a" }));
  }
}
