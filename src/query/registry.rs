//! Registry of resource entries and their runtime control records.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::options::QueryConfig;
use super::state::ResourceState;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A cancellable scheduled task. At most one is outstanding per slot.
#[derive(Debug, Default)]
pub(crate) struct TimerSlot {
  handle: Option<JoinHandle<()>>,
  generation: u64,
}

impl TimerSlot {
  /// Cancel the outstanding task and return the generation for the next one.
  pub(crate) fn rearm(&mut self) -> u64 {
    self.cancel();
    self.generation += 1;
    self.generation
  }

  pub(crate) fn set(&mut self, handle: JoinHandle<()>) {
    self.handle = Some(handle);
  }

  /// Called by an expiring task. Returns false when the task was superseded;
  /// otherwise detaches its handle so re-arming from inside the task does not
  /// abort it.
  pub(crate) fn release(&mut self, generation: u64) -> bool {
    if self.generation != generation {
      return false;
    }
    self.handle = None;
    true
  }

  pub(crate) fn cancel(&mut self) {
    if let Some(handle) = self.handle.take() {
      handle.abort();
    }
  }

  #[cfg(test)]
  pub(crate) fn is_armed(&self) -> bool {
    self.handle.is_some()
  }
}

/// Internal per-endpoint bookkeeping, never exposed to callers.
#[derive(Debug, Default)]
pub(crate) struct RuntimeControl {
  pub(crate) slow_timer: TimerSlot,
  pub(crate) retry_timer: TimerSlot,
  pub(crate) retry_attempt: u32,
  pub(crate) disable_loading: bool,
}

/// One registered endpoint: its observable state, the configuration its
/// operations were bound with, and its runtime control record.
pub(crate) struct ResourceEntry {
  pub(crate) endpoint: String,
  pub(crate) config: Arc<QueryConfig>,
  state: watch::Sender<ResourceState>,
  control: Mutex<RuntimeControl>,
}

impl ResourceEntry {
  pub(crate) fn new(
    endpoint: String,
    group: Option<String>,
    groups: Option<Vec<String>>,
    config: Arc<QueryConfig>,
  ) -> Self {
    let (state, _) = watch::channel(ResourceState::new(endpoint.clone(), group, groups));
    Self {
      endpoint,
      config,
      state,
      control: Mutex::new(RuntimeControl::default()),
    }
  }

  /// Mutate the state in place and notify observers.
  pub(crate) fn update(&self, f: impl FnOnce(&mut ResourceState)) {
    self.state.send_modify(f);
  }

  /// Read a field without cloning the whole state.
  pub(crate) fn read<R>(&self, f: impl FnOnce(&ResourceState) -> R) -> R {
    f(&self.state.borrow())
  }

  pub(crate) fn snapshot(&self) -> ResourceState {
    self.state.borrow().clone()
  }

  pub(crate) fn subscribe(&self) -> watch::Receiver<ResourceState> {
    self.state.subscribe()
  }

  pub(crate) fn control(&self) -> MutexGuard<'_, RuntimeControl> {
    lock(&self.control)
  }
}

#[derive(Default)]
struct Entries {
  order: Vec<Arc<ResourceEntry>>,
  by_endpoint: HashMap<String, Arc<ResourceEntry>>,
}

/// Mapping from endpoint key to its entry, in registration order.
///
/// Entries are created lazily and never removed.
#[derive(Default)]
pub(crate) struct Registry {
  entries: Mutex<Entries>,
}

impl Registry {
  /// Return the entry for `endpoint`, creating it with `make` on first access.
  pub(crate) fn get_or_insert_with(
    &self,
    endpoint: &str,
    make: impl FnOnce() -> ResourceEntry,
  ) -> Arc<ResourceEntry> {
    let mut entries = lock(&self.entries);
    if let Some(entry) = entries.by_endpoint.get(endpoint) {
      return Arc::clone(entry);
    }
    let entry = Arc::new(make());
    entries.order.push(Arc::clone(&entry));
    entries
      .by_endpoint
      .insert(endpoint.to_string(), Arc::clone(&entry));
    entry
  }

  pub(crate) fn get(&self, endpoint: &str) -> Option<Arc<ResourceEntry>> {
    lock(&self.entries).by_endpoint.get(endpoint).cloned()
  }

  /// Snapshot of every entry in registration order.
  pub(crate) fn entries(&self) -> Vec<Arc<ResourceEntry>> {
    lock(&self.entries).order.clone()
  }

  pub(crate) fn len(&self) -> usize {
    lock(&self.entries).order.len()
  }
}

/// Per-endpoint in-flight call counters backing the dedupe gate.
#[derive(Debug, Default)]
pub(crate) struct DedupeCounters {
  hits: Mutex<HashMap<String, u32>>,
}

impl DedupeCounters {
  /// Count one more call and return the new value.
  pub(crate) fn hit(&self, endpoint: &str) -> u32 {
    let mut hits = lock(&self.hits);
    let count = hits.entry(endpoint.to_string()).or_insert(0);
    *count += 1;
    *count
  }

  pub(crate) fn reset(&self, endpoint: &str) {
    lock(&self.hits).insert(endpoint.to_string(), 0);
  }

  pub(crate) fn reset_all(&self) {
    lock(&self.hits).values_mut().for_each(|count| *count = 0);
  }

  pub(crate) fn get(&self, endpoint: &str) -> u32 {
    lock(&self.hits).get(endpoint).copied().unwrap_or(0)
  }
}
