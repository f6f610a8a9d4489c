//! Per-endpoint data fetching cache with stale-while-revalidate reads,
//! request deduplication, retries and optimistic mutation.

pub mod cache;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod query;

pub use error::FetchError;
pub use fetcher::{fetcher_fn, FetchResult, Fetcher, HttpFetcher, RequestInit};
pub use query::{
  MutateOptions, QueryClient, QueryConfig, QueryOptions, RefetchOptions, Resource, ResourceState,
  SingleQuery,
};
