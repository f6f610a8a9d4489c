//! Observable per-endpoint state.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::FetchError;

/// The public state of one resource.
///
/// Mutated field by field in place, never replaced wholesale, so observers of
/// the entry's watch channel see every transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceState {
  /// Key identifying the resource and its cache slot
  pub endpoint: String,
  /// Last fetched (or optimistically mutated) data
  pub data: Option<Value>,
  /// Failure of the last fetch, `None` once a fetch succeeds
  pub is_error: Option<FetchError>,
  /// True while a fetch that is not loading-suppressed is in flight
  pub is_loading: bool,
  pub group: Option<String>,
  pub groups: Option<Vec<String>>,
}

impl ResourceState {
  pub fn new(endpoint: String, group: Option<String>, groups: Option<Vec<String>>) -> Self {
    Self {
      endpoint,
      data: None,
      is_error: None,
      is_loading: false,
      group,
      groups,
    }
  }

  pub fn has_error(&self) -> bool {
    self.is_error.is_some()
  }

  /// Decode the data into a concrete type.
  pub fn data_as<T: DeserializeOwned>(&self) -> Option<Result<T, serde_json::Error>> {
    self.data.clone().map(serde_json::from_value)
  }

  /// Whether this resource is tagged with `tag`, through `group` or `groups`.
  pub fn in_group(&self, tag: &str) -> bool {
    self.group.as_deref() == Some(tag)
      || self
        .groups
        .as_ref()
        .is_some_and(|groups| groups.iter().any(|g| g == tag))
  }

  /// Whether the single `group` tag is unset. A `groups` list alone does
  /// not count as a group here.
  pub fn is_ungrouped(&self) -> bool {
    self.group.is_none()
  }

  /// Reset data, error and loading, keeping identity and tags.
  pub(crate) fn reset(&mut self) {
    self.data = None;
    self.is_error = None;
    self.is_loading = false;
  }
}
