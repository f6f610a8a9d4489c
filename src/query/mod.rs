//! Per-endpoint query state machine.
//!
//! Inspired by TanStack Query and SWR, a [`QueryClient`] hands out one
//! [`Resource`] per endpoint key. Each resource exposes `data`, `is_error` and
//! `is_loading`, and drives:
//! - stale-while-revalidate reads from the client's cache
//! - a dedupe gate so a burst of `fetch()` calls hits the fetcher once
//! - retry scheduling after failures, with a bounded attempt count
//! - a slow-loading watch that reports fetches outliving a timeout
//! - optimistic mutation, and invalidation by key or group tag
//!
//! # Example
//!
//! ```ignore
//! let client = QueryClient::new(
//!     QueryConfig::new()
//!         .with_base_uri("https://api.example.com")
//!         .with_retry_when_error(true),
//! );
//!
//! let todos = client.query_with("/todos", &QueryOptions::new().group("todos"));
//! todos.fetch().await;
//!
//! match todos.snapshot() {
//!     ResourceState { is_loading: true, .. } => render_spinner(),
//!     ResourceState { is_error: Some(e), .. } => render_error(&e),
//!     ResourceState { data: Some(data), .. } => render_data(&data),
//!     _ => {}
//! }
//!
//! // Optimistic update, no network round trip
//! todos.mutate(MutateOptions::new().data(json!([]))).await?;
//! ```

mod client;
mod options;
mod registry;
mod resource;
mod single;
mod state;

pub use client::QueryClient;
pub use options::{
  MutateOptions, OnError, OnLoadingSlow, OnSuccess, PopulateCache, QueryConfig, QueryOptions,
  RefetchOptions, DEFAULT_CACHE_TIMEOUT, DEFAULT_LOADING_SLOW_TIMEOUT, DEFAULT_RETRY_COUNT,
  FALLBACK_RETRY_DELAY, MIN_RETRY_DELAY,
};
pub use resource::Resource;
pub use single::SingleQuery;
pub use state::ResourceState;
