//! Backing Store Protocol
//!
//! The hash, set and sorted-set primitives the networked cache needs from its
//! key-value store.

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::remote::codec::Record;

/// Longest TTL handed to the store, about 136 years.
const MAX_TTL_MS: u128 = u32::MAX as u128 * 1000;

// == Store Operations ==
/// One write inside an atomic [`BackingStore::apply`] batch.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOp {
    /// Replace the hash at `key` with `fields` and expire it after `ttl`.
    WriteRecord {
        key: String,
        fields: Vec<(&'static str, Vec<u8>)>,
        ttl: Duration,
    },
    /// Delete whole records.
    Delete { keys: Vec<String> },
    SetAdd { set: String, member: String },
    SetRemove { set: String, members: Vec<String> },
    /// Score a sorted-set member; with `only_existing` absent members are
    /// left alone.
    RankAdd {
        zset: String,
        member: String,
        score: f64,
        only_existing: bool,
    },
    RankRemove { zset: String, members: Vec<String> },
}

// == Backing Store ==
/// Key-value store offering hashes with per-record expiry, sets and sorted sets.
#[async_trait]
pub trait BackingStore: Debug + Send + Sync {
    /// All fields of the hash at `key`; empty when the record is absent.
    async fn read_record(&self, key: &str) -> Result<Record>;

    /// Whether the hash at `key` holds at least one of `fields`.
    async fn has_any_field(&self, key: &str, fields: &[&str]) -> Result<bool>;

    /// Every member of `set` with the `field` of the hash it names, if any.
    async fn members_with_field(
        &self,
        set: &str,
        field: &str,
    ) -> Result<Vec<(String, Option<String>)>>;

    /// How many of `keys` name a live record.
    async fn count_records(&self, keys: &[String]) -> Result<u64>;

    /// Number of members in the sorted set.
    async fn rank_count(&self, zset: &str) -> Result<u64>;

    /// The `count` lowest-scored members, ascending (ties by member).
    async fn lowest_ranked(&self, zset: &str, count: u64) -> Result<Vec<String>>;

    /// Applies `ops` as one atomic batch.
    async fn apply(&self, ops: Vec<StoreOp>) -> Result<()>;
}

/// Record expiry rounded up to whole milliseconds, at least one, so the
/// store never drops a record before its item expires.
pub(crate) fn ttl_millis(ttl: Duration) -> u64 {
    ttl.as_nanos().div_ceil(1_000_000).clamp(1, MAX_TTL_MS) as u64
}
