use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::fetcher::RequestInit;
use crate::query::{QueryConfig, DEFAULT_CACHE_TIMEOUT};

/// File configuration for the `swrq` binary.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  /// Prefix prepended to every endpoint
  #[serde(default)]
  pub base_uri: String,
  /// Request defaults (headers, timeout) for the HTTP fetcher
  #[serde(default)]
  pub request: RequestInit,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub retry: RetryConfig,
  /// Report fetches still loading after this many milliseconds
  pub loading_slow_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Milliseconds before cached data is revalidated; -1 never revalidates
  #[serde(
    default = "default_cache_timeout",
    rename = "timeout_ms",
    deserialize_with = "deserialize_cache_timeout"
  )]
  pub timeout: Option<Duration>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      timeout: default_cache_timeout(),
    }
  }
}

fn default_cache_timeout() -> Option<Duration> {
  Some(DEFAULT_CACHE_TIMEOUT)
}

fn deserialize_cache_timeout<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
  D: Deserializer<'de>,
{
  match i64::deserialize(deserializer)? {
    -1 => Ok(None),
    ms if ms >= 0 => Ok(Some(Duration::from_millis(ms as u64))),
    ms => Err(serde::de::Error::custom(format!(
      "cache timeout must be -1 or a non-negative number of milliseconds, got {}",
      ms
    ))),
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetryConfig {
  /// Retry failed fetches
  #[serde(default)]
  pub enabled: bool,
  /// Maximum retries after a failure (default 5)
  pub count: Option<u32>,
  /// Milliseconds between retries; values under 1000 fall back to 10000
  pub delay_ms: Option<u64>,
}

impl Config {
  /// Resolve the configuration for this run.
  ///
  /// An explicit path must exist. Otherwise the first file found among
  /// [`Config::search_paths`] is used, and defaults apply when none exists.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    if let Some(path) = explicit_path {
      if !path.exists() {
        return Err(eyre!("Config file not found: {}", path.display()));
      }
      return Self::read(path);
    }

    match Self::search_paths().into_iter().find(|p| p.exists()) {
      Some(path) => Self::read(&path),
      None => {
        debug!("no config file, using defaults");
        Ok(Self::default())
      }
    }
  }

  /// Candidate config files, most local first: `./swrq.yaml`, then
  /// `$XDG_CONFIG_HOME/swrq/config.yaml`.
  pub fn search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("swrq.yaml")];
    paths.extend(dirs::config_dir().map(|dir| dir.join("swrq").join("config.yaml")));
    paths
  }

  fn read(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Cannot read {}: {}", path.display(), e))?;
    debug!(path = %path.display(), "loaded config");
    Self::from_yaml(&contents).map_err(|e| eyre!("Invalid config in {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    Ok(serde_yaml::from_str(contents)?)
  }

  /// Get the bearer token from environment variables.
  ///
  /// Checks SWRQ_TOKEN.
  pub fn get_token() -> Option<String> {
    std::env::var("SWRQ_TOKEN").ok().filter(|t| !t.is_empty())
  }

  /// Build the client configuration. `token` becomes an `Authorization`
  /// header unless the file already sets one.
  pub fn to_query_config(&self, token: Option<&str>) -> QueryConfig {
    let mut request = self.request.clone();
    if let Some(token) = token {
      let has_auth = request
        .headers
        .keys()
        .any(|name| name.eq_ignore_ascii_case("authorization"));
      if !has_auth {
        request = request.with_header("Authorization", format!("Bearer {}", token));
      }
    }

    let mut config = QueryConfig::new()
      .with_base_uri(self.base_uri.clone())
      .with_base_init(request)
      .with_cache_timeout(self.cache.timeout)
      .with_retry_when_error(self.retry.enabled);
    if let Some(count) = self.retry.count {
      config = config.with_retry_count(count);
    }
    if let Some(delay) = self.retry.delay_ms {
      config = config.with_retry_delay(Duration::from_millis(delay));
    }
    if let Some(timeout) = self.loading_slow_timeout_ms {
      config = config.with_loading_slow_timeout(Duration::from_millis(timeout));
    }
    config
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_file_uses_defaults() {
    let config = Config::from_yaml("{}").unwrap();
    assert_eq!(config.base_uri, "");
    assert_eq!(config.cache.timeout, Some(Duration::from_millis(2000)));
    assert!(!config.retry.enabled);

    let query = config.to_query_config(None);
    assert_eq!(query.retry_count(), 5);
  }

  #[test]
  fn test_full_file() {
    let config = Config::from_yaml(
      r#"
base_uri: https://api.example.com
request:
  headers:
    Accept-Language: en
  timeout_ms: 5000
cache:
  timeout_ms: 60000
retry:
  enabled: true
  count: 2
  delay_ms: 1500
loading_slow_timeout_ms: 3000
"#,
    )
    .unwrap();

    assert_eq!(config.request.timeout, Some(Duration::from_secs(5)));
    assert_eq!(config.request.headers["Accept-Language"], "en");

    let query = config.to_query_config(None);
    assert_eq!(query.base_uri(), "https://api.example.com");
    assert_eq!(query.cache_timeout(), Some(Duration::from_secs(60)));
    assert!(query.should_retry_when_error());
    assert_eq!(query.retry_count(), 2);
    assert_eq!(query.effective_retry_delay(), Duration::from_millis(1500));
  }

  #[test]
  fn test_negative_one_never_expires() {
    let config = Config::from_yaml("cache:\n  timeout_ms: -1\n").unwrap();
    assert_eq!(config.cache.timeout, None);
    assert_eq!(config.to_query_config(None).cache_timeout(), None);
  }

  #[test]
  fn test_other_negative_timeouts_rejected() {
    assert!(Config::from_yaml("cache:\n  timeout_ms: -5\n").is_err());
  }

  #[test]
  fn test_token_becomes_authorization_header() {
    let config = Config::default();
    let query = config.to_query_config(Some("secret"));
    assert_eq!(
      query.base_init.headers.get("Authorization").map(String::as_str),
      Some("Bearer secret")
    );
  }

  #[test]
  fn test_explicit_authorization_header_wins() {
    let config = Config::from_yaml("request:\n  headers:\n    authorization: Basic abc\n").unwrap();
    let query = config.to_query_config(Some("secret"));
    assert_eq!(query.base_init.headers.len(), 1);
    assert_eq!(query.base_init.headers["authorization"], "Basic abc");
  }

  #[test]
  fn test_search_paths_start_local() {
    let paths = Config::search_paths();
    assert_eq!(paths[0], PathBuf::from("swrq.yaml"));
    assert!(paths.iter().skip(1).all(|p| p.ends_with("swrq/config.yaml")));
  }

  #[test]
  fn test_load_explicit_file() {
    let path = std::env::temp_dir().join(format!("swrq-config-{}.yaml", std::process::id()));
    std::fs::write(&path, "base_uri: http://localhost:8080\nretry:\n  enabled: true\n").unwrap();

    let config = Config::load(Some(&path)).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(config.base_uri, "http://localhost:8080");
    assert!(config.retry.enabled);
  }

  #[test]
  fn test_invalid_file_names_path() {
    let path = std::env::temp_dir().join(format!("swrq-invalid-{}.yaml", std::process::id()));
    std::fs::write(&path, "cache:\n  timeout_ms: -7\n").unwrap();

    let err = Config::load(Some(&path)).unwrap_err();
    std::fs::remove_file(&path).unwrap();
    assert!(err.to_string().contains("Invalid config in"));
  }

  #[test]
  fn test_missing_explicit_path_is_error() {
    let err = Config::load(Some(Path::new("/definitely/not/here.yaml"))).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
  }
}
