//! Memory Cache Module
//!
//! In-process backend combining HashMap storage with recency tracking,
//! a single-step size bound and lazy TTL expiry.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::cache::{
    Cache, CacheStats, EvictionCallback, Fetcher, Item, Key, RecencyQueue,
};
use crate::clock::{Clock, SystemClock};
use crate::context::Context;
use crate::error::{CacheError, Result};

// == State ==
/// Everything guarded by the instance lock.
#[derive(Debug, Default)]
struct MemoryState {
    entries: HashMap<String, Item>,
    order: RecencyQueue,
    stats: CacheStats,
}

// == Memory Cache ==
/// Process-local cache.
///
/// Expired entries are never purged in the background; reads treat them as
/// absent and the next fetch replaces them.
pub struct MemoryCache {
    state: Mutex<MemoryState>,
    max_size: i64,
    on_evict: Option<EvictionCallback>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryCache")
            .field("max_size", &self.max_size)
            .field("on_evict", &self.on_evict.is_some())
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCache {
    /// Unbounded cache on the system clock.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> MemoryCacheBuilder {
        MemoryCacheBuilder::default()
    }

    /// Number of stored entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.entries.is_empty()
    }

    pub async fn stats(&self) -> CacheStats {
        self.state.lock().await.stats.clone()
    }

    // == Fetch ==
    /// Runs the fetcher and stamps the result once it has completed.
    async fn fetch(
        &self,
        state: &mut MemoryState,
        ctx: &Context,
        key: &Key,
        fetcher: &dyn Fetcher,
    ) -> Result<Item> {
        ctx.check()?;
        let cacheable = match fetcher.fetch(ctx, key).await {
            Ok(cacheable) => cacheable,
            Err(err) => {
                state.stats.record_fetch_error();
                debug!(key = %key, error = %err, "fetch failed");
                return Err(CacheError::Fetch(err));
            }
        };
        ctx.check()?;
        Ok(Item::from_cacheable(cacheable, self.clock.now()))
    }

    // == Store ==
    /// Writes `item`, marks it most recent and enforces the size bound.
    fn store(&self, state: &mut MemoryState, key: &Key, item: Item) {
        state.entries.insert(key.as_str().to_string(), item);
        state.order.touch(key.as_str());

        // Each write adds at most one key, so one eviction restores the bound
        if self.max_size > 0 && state.order.len() as i64 > self.max_size {
            if let Some(oldest) = state.order.pop_oldest() {
                if let Some(evicted) = state.entries.remove(&oldest) {
                    state.stats.record_evictions(1);
                    info!(key = %oldest, "evicted least recently used entry");
                    if let Some(on_evict) = &self.on_evict {
                        on_evict(&Key::from(oldest), &evicted);
                    }
                }
            }
        }
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, ctx: &Context, key: &Key, fetcher: &dyn Fetcher) -> Result<Item> {
        ctx.check()?;
        let mut state = self.state.lock().await;
        // Cancellation may land while waiting behind another caller
        ctx.check()?;

        let now = self.clock.now();
        let hit = state
            .entries
            .get(key.as_str())
            .filter(|item| !item.is_expired_at(now))
            .cloned();
        if let Some(item) = hit {
            state.order.touch(key.as_str());
            state.stats.record_hit();
            debug!(key = %key, "cache hit");
            return Ok(item);
        }

        state.stats.record_miss();
        debug!(key = %key, "cache miss");
        let item = self.fetch(&mut state, ctx, key, fetcher).await?;
        self.store(&mut state, key, item.clone());
        Ok(item)
    }

    async fn put(&self, ctx: &Context, key: &Key, fetcher: &dyn Fetcher) -> Result<()> {
        ctx.check()?;
        let mut state = self.state.lock().await;
        ctx.check()?;

        let item = self.fetch(&mut state, ctx, key, fetcher).await?;
        self.store(&mut state, key, item);
        Ok(())
    }

    async fn contains(&self, ctx: &Context, key: &Key) -> Result<bool> {
        ctx.check()?;
        let state = self.state.lock().await;
        ctx.check()?;

        let now = self.clock.now();
        Ok(state
            .entries
            .get(key.as_str())
            .is_some_and(|item| !item.is_expired_at(now)))
    }

    async fn delete(&self, ctx: &Context, key: &Key) -> Result<()> {
        ctx.check()?;
        let mut state = self.state.lock().await;
        ctx.check()?;

        if state.entries.remove(key.as_str()).is_some() {
            debug!(key = %key, "deleted entry");
        }
        state.order.remove(key.as_str());
        Ok(())
    }
}

// == Builder ==
/// Configures a [`MemoryCache`].
#[derive(Default)]
pub struct MemoryCacheBuilder {
    max_size: Option<i64>,
    on_evict: Option<EvictionCallback>,
    clock: Option<Arc<dyn Clock>>,
}

impl MemoryCacheBuilder {
    /// Maximum number of entries; zero or negative means unbounded.
    pub fn max_size(mut self, max_size: i64) -> Self {
        self.max_size = Some(max_size);
        self
    }

    /// Called with each entry the size bound removes.
    pub fn on_evict<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Key, &Item) + Send + Sync + 'static,
    {
        self.on_evict = Some(Arc::new(callback));
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> MemoryCache {
        MemoryCache {
            state: Mutex::new(MemoryState::default()),
            max_size: self.max_size.unwrap_or(-1),
            on_evict: self.on_evict,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        }
    }
}
