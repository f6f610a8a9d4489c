//! Cache record and freshness classification.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;

/// Cached payload for one endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRecord {
  /// The cached data
  pub data: Value,
  /// Wall-clock time of the write, for display
  pub fetched_at: DateTime<Utc>,
  /// Monotonic time of the write, used for age checks
  pub stored_at: Instant,
}

impl CacheRecord {
  pub fn new(data: Value) -> Self {
    Self {
      data,
      fetched_at: Utc::now(),
      stored_at: Instant::now(),
    }
  }

  /// Time since the record was written.
  pub fn age(&self) -> Duration {
    self.stored_at.elapsed()
  }

  /// Classify the record against a cache timeout.
  ///
  /// `None` means the cache never expires.
  pub fn freshness(&self, cache_timeout: Option<Duration>) -> Freshness {
    match cache_timeout {
      Some(timeout) if self.age() > timeout => Freshness::Stale,
      _ => Freshness::Fresh,
    }
  }
}

/// Whether a cached record may be served without revalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
  /// Within the cache timeout (or the cache never expires)
  Fresh,
  /// Older than the cache timeout, a background fetch is due
  Stale,
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[tokio::test(start_paused = true)]
  async fn test_freshness_follows_timeout() {
    let record = CacheRecord::new(json!(1));
    let timeout = Some(Duration::from_millis(2000));
    assert_eq!(record.freshness(timeout), Freshness::Fresh);

    tokio::time::advance(Duration::from_millis(2000)).await;
    // Age equal to the timeout is still fresh
    assert_eq!(record.freshness(timeout), Freshness::Fresh);

    tokio::time::advance(Duration::from_millis(1)).await;
    assert_eq!(record.freshness(timeout), Freshness::Stale);
  }

  #[tokio::test(start_paused = true)]
  async fn test_never_expires_without_timeout() {
    let record = CacheRecord::new(json!("x"));
    tokio::time::advance(Duration::from_secs(86_400 * 365)).await;
    assert_eq!(record.freshness(None), Freshness::Fresh);
  }
}
