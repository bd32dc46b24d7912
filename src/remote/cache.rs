//! Redis Cache Module
//!
//! Networked backend: one hash per key with a native TTL, plus an eviction
//! index enforcing the size bound.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cache::{Cache, CacheStats, Fetcher, Item, Key};
use crate::clock::{Clock, SystemClock};
use crate::config::CacheConfig;
use crate::context::Context;
use crate::error::{CacheError, Result};
use crate::remote::codec::{self, ERROR_FIELD, VALUE_FIELD};
use crate::remote::index::{EvictionIndex, PurgePolicy};
use crate::remote::store::{BackingStore, StoreOp};

// == Key Transform ==
/// Maps logical keys to physical addresses in the shared store.
#[derive(Clone, Default)]
pub enum KeyTransform {
    /// The key is the address
    #[default]
    Identity,
    /// `"<prefix>:<key>"`
    Prefix(String),
    Custom(Arc<dyn Fn(&str) -> String + Send + Sync>),
}

impl KeyTransform {
    pub fn apply(&self, key: &str) -> String {
        match self {
            KeyTransform::Identity => key.to_string(),
            KeyTransform::Prefix(prefix) => format!("{prefix}:{key}"),
            KeyTransform::Custom(transform) => transform(key),
        }
    }
}

impl fmt::Debug for KeyTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyTransform::Identity => f.write_str("Identity"),
            KeyTransform::Prefix(prefix) => f.debug_tuple("Prefix").field(prefix).finish(),
            KeyTransform::Custom(_) => f.write_str("Custom"),
        }
    }
}

// == Redis Cache ==
/// Cache stored in a Redis-like [`BackingStore`].
///
/// TTLs are enforced by the store. Every operation holds the instance lock
/// across its store round trips and the fetcher, so a slow fetcher stalls all
/// callers of this instance.
#[derive(Debug)]
pub struct RedisCache {
    store: Arc<dyn BackingStore>,
    index: EvictionIndex,
    keys: KeyTransform,
    max_size: i64,
    clock: Arc<dyn Clock>,
    /// The instance lock; guards the stats it holds and serializes every operation
    stats: Mutex<CacheStats>,
}

impl RedisCache {
    pub fn builder(store: Arc<dyn BackingStore>) -> RedisCacheBuilder {
        RedisCacheBuilder {
            store,
            max_size: -1,
            keys: KeyTransform::Identity,
            policy: PurgePolicy::default(),
            clock: None,
        }
    }

    /// Cache configured from `config` over `store`.
    pub fn from_config(store: Arc<dyn BackingStore>, config: &CacheConfig) -> Self {
        let mut builder = Self::builder(store)
            .max_size(config.max_size)
            .policy(config.purge_policy);
        if let Some(prefix) = &config.prefix {
            builder = builder.prefix(prefix.clone());
        }
        builder.build()
    }

    pub fn policy(&self) -> PurgePolicy {
        self.index.policy()
    }

    /// Physical address of the eviction index.
    pub fn index_address(&self) -> &str {
        self.index.address()
    }

    pub async fn stats(&self) -> CacheStats {
        self.stats.lock().await.clone()
    }

    fn bounded(&self) -> bool {
        self.max_size > 0
    }

    // == Fetch and Write ==
    /// Fetches, stores the stamped item and enforces the bound.
    async fn fetch_and_store(
        &self,
        stats: &mut CacheStats,
        ctx: &Context,
        key: &Key,
        address: &str,
        fetcher: &dyn Fetcher,
    ) -> Result<Item> {
        ctx.check()?;
        let cacheable = match fetcher.fetch(ctx, key).await {
            Ok(cacheable) => cacheable,
            Err(err) => {
                stats.record_fetch_error();
                debug!(key = %key, error = %err, "fetch failed");
                return Err(CacheError::Fetch(err));
            }
        };
        ctx.check()?;
        let item = Item::from_cacheable(cacheable, self.clock.now());

        let mut ops = vec![StoreOp::WriteRecord {
            key: address.to_string(),
            fields: codec::encode(&item),
            ttl: item.duration(),
        }];
        if self.bounded() {
            ops.push(self.index.on_write(address, item.cached()));
        }
        self.store.apply(ops).await?;
        debug!(key = %key, address, "stored entry");

        if let Err(err) = self.enforce_bound(stats).await {
            warn!(key = %key, error = %err, "eviction failed, cache may exceed its bound");
            return Err(err);
        }
        Ok(item)
    }

    // == Enforce Bound ==
    /// Deletes the policy's surplus records and index members in one batch.
    async fn enforce_bound(&self, stats: &mut CacheStats) -> Result<()> {
        if !self.bounded() {
            return Ok(());
        }
        let surplus = self
            .index
            .surplus(self.store.as_ref(), self.max_size as u64)
            .await?;
        if surplus.is_empty() {
            return Ok(());
        }

        // Members whose record already expired are dropped but not counted
        let live = self.store.count_records(&surplus).await?;
        let count = surplus.len();
        self.store
            .apply(vec![
                StoreOp::Delete {
                    keys: surplus.clone(),
                },
                self.index.on_remove(surplus),
            ])
            .await?;
        stats.record_evictions(live as usize);
        info!(count, live, policy = %self.policy(), "evicted surplus entries");
        Ok(())
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, ctx: &Context, key: &Key, fetcher: &dyn Fetcher) -> Result<Item> {
        ctx.check()?;
        let mut stats = self.stats.lock().await;
        // Cancellation may land while waiting behind another caller
        ctx.check()?;
        let address = self.keys.apply(key.as_str());

        let record = self.store.read_record(&address).await?;
        let decoded = codec::decode(&address, &record).inspect_err(|err| {
            warn!(key = %key, error = %err, "cached record is unreadable");
        })?;
        if let Some(item) = decoded {
            if self.bounded() {
                let touch = self.index.on_hit(&address, self.clock.now());
                self.store.apply(vec![touch]).await?;
            }
            stats.record_hit();
            debug!(key = %key, "cache hit");
            return Ok(item);
        }

        stats.record_miss();
        debug!(key = %key, "cache miss");
        self.fetch_and_store(&mut stats, ctx, key, &address, fetcher)
            .await
    }

    async fn put(&self, ctx: &Context, key: &Key, fetcher: &dyn Fetcher) -> Result<()> {
        ctx.check()?;
        let mut stats = self.stats.lock().await;
        ctx.check()?;
        let address = self.keys.apply(key.as_str());

        self.fetch_and_store(&mut stats, ctx, key, &address, fetcher)
            .await?;
        Ok(())
    }

    async fn contains(&self, ctx: &Context, key: &Key) -> Result<bool> {
        ctx.check()?;
        let _guard = self.stats.lock().await;
        ctx.check()?;
        let address = self.keys.apply(key.as_str());

        self.store
            .has_any_field(&address, &[VALUE_FIELD, ERROR_FIELD])
            .await
    }

    async fn delete(&self, ctx: &Context, key: &Key) -> Result<()> {
        ctx.check()?;
        let _guard = self.stats.lock().await;
        ctx.check()?;
        let address = self.keys.apply(key.as_str());

        self.store
            .apply(vec![
                StoreOp::Delete {
                    keys: vec![address.clone()],
                },
                self.index.on_remove(vec![address]),
            ])
            .await?;
        debug!(key = %key, "deleted entry");
        Ok(())
    }
}

// == Builder ==
/// Configures a [`RedisCache`].
pub struct RedisCacheBuilder {
    store: Arc<dyn BackingStore>,
    max_size: i64,
    keys: KeyTransform,
    policy: PurgePolicy,
    clock: Option<Arc<dyn Clock>>,
}

impl RedisCacheBuilder {
    /// Maximum number of entries; zero or negative means unbounded.
    pub fn max_size(mut self, max_size: i64) -> Self {
        self.max_size = max_size;
        self
    }

    /// Stores keys (and the index) under `"<prefix>:"`.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.keys = KeyTransform::Prefix(prefix.into());
        self
    }

    pub fn key_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.keys = KeyTransform::Custom(Arc::new(transform));
        self
    }

    pub fn policy(mut self, policy: PurgePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> RedisCache {
        let index_address = self.keys.apply(&format!("yacache:index:{}", self.policy));
        RedisCache {
            store: self.store,
            index: EvictionIndex::new(self.policy, index_address),
            keys: self.keys,
            max_size: self.max_size,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            stats: Mutex::new(CacheStats::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{fetcher_fn, Cacheable};
    use crate::remote::LocalStore;
    use std::time::Duration;

    #[test]
    fn test_key_transforms() {
        assert_eq!(KeyTransform::Identity.apply("k"), "k");
        assert_eq!(KeyTransform::Prefix("tenant".into()).apply("k"), "tenant:k");
        let custom = KeyTransform::Custom(Arc::new(|key: &str| key.to_uppercase()));
        assert_eq!(custom.apply("k"), "K");
    }

    #[test]
    fn test_index_lives_in_namespace() {
        let store: Arc<dyn BackingStore> = Arc::new(LocalStore::new());
        let plain = RedisCache::builder(store.clone()).build();
        let prefixed = RedisCache::builder(store)
            .prefix("tenant")
            .policy(PurgePolicy::Lfa)
            .build();

        assert_eq!(plain.index_address(), "yacache:index:lru");
        assert_eq!(prefixed.index_address(), "tenant:yacache:index:lfa");
        assert_eq!(prefixed.policy(), PurgePolicy::Lfa);
    }

    #[tokio::test]
    async fn test_record_layout() {
        let store = Arc::new(LocalStore::new());
        let cache = RedisCache::builder(store.clone()).prefix("p").build();
        let fetcher = fetcher_fn(|_, _| async {
            Ok(Cacheable::value("payload", Duration::from_secs(90)))
        });

        let item = cache
            .get(&Context::new(), &Key::from("k"), &fetcher)
            .await
            .unwrap();

        let record = store.read_record("p:k").await.unwrap();
        assert_eq!(record[VALUE_FIELD], b"payload".to_vec());
        assert_eq!(record[codec::DURATION_FIELD], b"90s".to_vec());
        assert_eq!(
            record[codec::CREATED_FIELD],
            codec::timestamp_nanos(item.cached()).to_string().into_bytes()
        );
    }

    #[tokio::test]
    async fn test_unbounded_cache_skips_index() {
        let store = Arc::new(LocalStore::new());
        let cache = RedisCache::builder(store.clone())
            .policy(PurgePolicy::Lfa)
            .build();
        let fetcher = fetcher_fn(|_, _| async {
            Ok(Cacheable::value("v", Duration::from_secs(60)))
        });

        for key in ["a", "b", "c"] {
            cache.get(&Context::new(), &Key::from(key), &fetcher).await.unwrap();
        }

        assert_eq!(store.record_count(), 3);
        assert_eq!(store.rank_count(cache.index_address()).await.unwrap(), 0);
    }
}
