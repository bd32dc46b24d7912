//! Configuration Module
//!
//! Loads cache construction parameters from environment variables.

use std::env;

use crate::cache::MemoryCache;
use crate::error::{CacheError, Result};
use crate::remote::PurgePolicy;

/// Cache construction parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Maximum number of entries; zero or negative means unbounded
    pub max_size: i64,
    /// Namespace prefix for networked keys
    pub prefix: Option<String>,
    /// Eviction policy of the networked backend
    pub purge_policy: PurgePolicy,
    /// Redis connection URL
    pub redis_url: String,
}

impl CacheConfig {
    /// Creates a CacheConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `YACACHE_MAX_SIZE` - Entry bound (default: -1, unbounded)
    /// - `YACACHE_PREFIX` - Key namespace prefix (default: none)
    /// - `YACACHE_PURGE_POLICY` - `lru` or `lfa` (default: lru)
    /// - `YACACHE_REDIS_URL` - Redis URL (default: redis://127.0.0.1:6379)
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let max_size = match env::var("YACACHE_MAX_SIZE") {
            Ok(raw) => raw
                .trim()
                .parse()
                .map_err(|_| CacheError::Config(format!("YACACHE_MAX_SIZE is not an integer: {raw:?}")))?,
            Err(_) => defaults.max_size,
        };
        let purge_policy = match env::var("YACACHE_PURGE_POLICY") {
            Ok(raw) => raw.parse()?,
            Err(_) => defaults.purge_policy,
        };

        Ok(Self {
            max_size,
            prefix: env::var("YACACHE_PREFIX").ok().filter(|p| !p.is_empty()),
            purge_policy,
            redis_url: env::var("YACACHE_REDIS_URL").unwrap_or(defaults.redis_url),
        })
    }

    /// In-memory cache bounded by `max_size`.
    pub fn memory_cache(&self) -> MemoryCache {
        MemoryCache::builder().max_size(self.max_size).build()
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: -1,
            prefix: None,
            purge_policy: PurgePolicy::Lru,
            redis_url: "redis://127.0.0.1:6379".to_string(),
        }
    }
}
