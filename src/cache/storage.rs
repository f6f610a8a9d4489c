//! Process-local cache storage keyed by endpoint.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::record::CacheRecord;

/// Mapping from endpoint key to its cached record.
///
/// Unbounded and in-memory only. Every operation is a short critical section;
/// records are cloned out so no lock is ever held by a caller.
#[derive(Debug, Default)]
pub struct CacheStore {
  records: Mutex<HashMap<String, CacheRecord>>,
}

impl CacheStore {
  pub fn new() -> Self {
    Self::default()
  }

  fn records(&self) -> MutexGuard<'_, HashMap<String, CacheRecord>> {
    // A panic in another holder cannot leave the map half-written
    self.records.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Get the record for an endpoint, if one is present.
  pub fn get(&self, endpoint: &str) -> Option<CacheRecord> {
    self.records().get(endpoint).cloned()
  }

  /// Write data for an endpoint with a fresh timestamp.
  pub fn store(&self, endpoint: &str, data: Value) -> CacheRecord {
    let record = CacheRecord::new(data);
    self
      .records()
      .insert(endpoint.to_string(), record.clone());
    record
  }

  /// Drop the record for an endpoint.
  pub fn invalidate(&self, endpoint: &str) {
    self.records().remove(endpoint);
  }

  /// Drop every record.
  pub fn clear(&self) {
    self.records().clear();
  }

  /// Number of present records.
  pub fn len(&self) -> usize {
    self.records().len()
  }

  pub fn is_empty(&self) -> bool {
    self.records().is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_store_and_get() {
    let store = CacheStore::new();
    assert!(store.get("/a").is_none());

    store.store("/a", json!({ "n": 1 }));
    assert_eq!(store.get("/a").map(|r| r.data), Some(json!({ "n": 1 })));
  }

  #[test]
  fn test_cached_null_is_present() {
    let store = CacheStore::new();
    store.store("/empty", Value::Null);
    assert!(store.get("/empty").is_some());
  }

  #[test]
  fn test_invalidate_only_touches_one_key() {
    let store = CacheStore::new();
    store.store("/a", json!(1));
    store.store("/b", json!(2));

    store.invalidate("/a");
    assert!(store.get("/a").is_none());
    assert!(store.get("/b").is_some());
  }

  #[test]
  fn test_clear_drops_everything() {
    let store = CacheStore::new();
    store.store("/a", json!(1));
    store.store("/b", json!(2));

    store.clear();
    assert!(store.is_empty());
  }
}
