//! yacache - fetch-on-miss key-value caching
//!
//! One [`Cache`] contract with TTLs and a size bound, implemented by an
//! in-process [`MemoryCache`] and a Redis-backed [`RedisCache`].

pub mod cache;
pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod remote;

pub use cache::{fetcher_fn, Cache, Cacheable, Fetcher, Item, Key, MemoryCache};
pub use config::CacheConfig;
pub use context::Context;
pub use error::{CacheError, Result};
pub use remote::{LocalStore, PurgePolicy, RedisCache, RedisStore};
