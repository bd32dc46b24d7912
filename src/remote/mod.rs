//! Networked Cache Module
//!
//! Cache backend over a Redis-like store: hash records with native TTL, an
//! eviction index selected by [`PurgePolicy`], and key namespacing.

mod cache;
mod client;
pub mod codec;
mod index;
mod local;
mod store;

pub use cache::{KeyTransform, RedisCache, RedisCacheBuilder};
pub use client::RedisStore;
pub use index::{EvictionIndex, PurgePolicy};
pub use local::LocalStore;
pub use store::{BackingStore, StoreOp};
