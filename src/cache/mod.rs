//! In-memory cache of fetched endpoint data.
//!
//! The cache holds at most one record per endpoint key:
//! - A present record is served immediately (stale-while-revalidate)
//! - Its age decides whether a background revalidation runs
//! - Records only disappear through explicit invalidation, there is no eviction

mod record;
mod storage;

pub use record::{CacheRecord, Freshness};
pub use storage::CacheStore;
