//! Cache Module
//!
//! The cache contract shared by every backend, the fetcher seam and the
//! in-memory backend.

mod entry;
mod lru;
mod stats;
mod store;


use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::Context;
use crate::error::Result;

// Re-export public types
pub use entry::{Cacheable, Item, Key, Payload};
pub use lru::RecencyQueue;
pub use stats::CacheStats;
pub use store::{MemoryCache, MemoryCacheBuilder};

/// Invoked once per entry removed by the size bound, under the cache lock.
pub type EvictionCallback = Arc<dyn Fn(&Key, &Item) + Send + Sync>;

// == Cache Trait ==
/// Fetch-on-miss key-value cache.
///
/// Every operation holds the instance lock for its whole duration, fetcher
/// included, so calls on one instance never interleave.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Returns the cached item, invoking `fetcher` only on a miss.
    ///
    /// A fetcher error is returned as-is and nothing is stored.
    async fn get(&self, ctx: &Context, key: &Key, fetcher: &dyn Fetcher) -> Result<Item>;

    /// Fetches and stores unconditionally, replacing any existing entry.
    async fn put(&self, ctx: &Context, key: &Key, fetcher: &dyn Fetcher) -> Result<()>;

    /// Existence check. Never fetches and never counts as an access.
    async fn contains(&self, ctx: &Context, key: &Key) -> Result<bool>;

    /// Removes the entry and its tracking state. Absent keys are fine.
    async fn delete(&self, ctx: &Context, key: &Key) -> Result<()>;
}

// == Fetcher ==
/// Produces the value for a key the cache does not hold.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, ctx: &Context, key: &Key) -> anyhow::Result<Cacheable>;
}

/// Adapts a closure into a [`Fetcher`]. Built with [`fetcher_fn`].
pub struct FnFetcher<F>(F);

#[async_trait]
impl<F, Fut> Fetcher for FnFetcher<F>
where
    F: Fn(Context, Key) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Cacheable>> + Send + 'static,
{
    async fn fetch(&self, ctx: &Context, key: &Key) -> anyhow::Result<Cacheable> {
        (self.0)(ctx.clone(), key.clone()).await
    }
}

/// Wraps `f` as a fetcher.
///
/// ```
/// use std::time::Duration;
/// use yacache::cache::{fetcher_fn, Cacheable};
///
/// let fetcher = fetcher_fn(|_ctx, key| async move {
///     Ok(Cacheable::value(key.as_str().as_bytes(), Duration::from_secs(60)))
/// });
/// # let _ = fetcher;
/// ```
pub fn fetcher_fn<F, Fut>(f: F) -> FnFetcher<F>
where
    F: Fn(Context, Key) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Cacheable>> + Send + 'static,
{
    FnFetcher(f)
}
