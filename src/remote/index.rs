//! Eviction Index
//!
//! Secondary index beside the per-key records that tells the networked cache
//! which entries to drop once it grows past its bound.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};
use crate::remote::codec::{timestamp_nanos, CREATED_FIELD};
use crate::remote::store::{BackingStore, StoreOp};

// == Purge Policy ==
/// Which entries the size bound removes first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurgePolicy {
    /// Oldest `created` first, tracked with a set of live keys
    #[default]
    Lru,
    /// Least recently accessed first, tracked with a sorted set
    Lfa,
}

impl fmt::Display for PurgePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PurgePolicy::Lru => f.write_str("lru"),
            PurgePolicy::Lfa => f.write_str("lfa"),
        }
    }
}

impl FromStr for PurgePolicy {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lru" | "recency" => Ok(PurgePolicy::Lru),
            "lfa" | "frequency" => Ok(PurgePolicy::Lfa),
            other => Err(CacheError::Config(format!("unknown purge policy {other:?}"))),
        }
    }
}

// == Eviction Index ==
/// Membership of live keys plus whatever ordering the policy needs.
///
/// Members are namespaced record addresses. Records expire on their own while
/// members do not, so stale members may linger; they sort as oldest and are
/// the first to be cleaned up by the next eviction.
#[derive(Debug, Clone, PartialEq)]
pub enum EvictionIndex {
    /// Set of keys; order recovered from each record's `created` field.
    Recency { set: String },
    /// Sorted set scored by the nanosecond time of the latest access.
    Frequency { zset: String },
}

impl EvictionIndex {
    /// Index for `policy` stored at `address`.
    pub fn new(policy: PurgePolicy, address: String) -> Self {
        match policy {
            PurgePolicy::Lru => EvictionIndex::Recency { set: address },
            PurgePolicy::Lfa => EvictionIndex::Frequency { zset: address },
        }
    }

    pub fn policy(&self) -> PurgePolicy {
        match self {
            EvictionIndex::Recency { .. } => PurgePolicy::Lru,
            EvictionIndex::Frequency { .. } => PurgePolicy::Lfa,
        }
    }

    pub fn address(&self) -> &str {
        match self {
            EvictionIndex::Recency { set } => set,
            EvictionIndex::Frequency { zset } => zset,
        }
    }

    // == Bookkeeping ==
    /// Records a fetch-driven write of `member` at `at`.
    pub fn on_write(&self, member: &str, at: DateTime<Utc>) -> StoreOp {
        match self {
            EvictionIndex::Recency { set } => StoreOp::SetAdd {
                set: set.clone(),
                member: member.to_string(),
            },
            EvictionIndex::Frequency { zset } => StoreOp::RankAdd {
                zset: zset.clone(),
                member: member.to_string(),
                score: score(at),
                only_existing: false,
            },
        }
    }

    /// Records a cache hit on `member` at `at`.
    ///
    /// The frequency index only rescores keys a write already added.
    pub fn on_hit(&self, member: &str, at: DateTime<Utc>) -> StoreOp {
        match self {
            EvictionIndex::Recency { .. } => self.on_write(member, at),
            EvictionIndex::Frequency { zset } => StoreOp::RankAdd {
                zset: zset.clone(),
                member: member.to_string(),
                score: score(at),
                only_existing: true,
            },
        }
    }

    /// Drops `members` from the index.
    pub fn on_remove(&self, members: Vec<String>) -> StoreOp {
        match self {
            EvictionIndex::Recency { set } => StoreOp::SetRemove {
                set: set.clone(),
                members,
            },
            EvictionIndex::Frequency { zset } => StoreOp::RankRemove {
                zset: zset.clone(),
                members,
            },
        }
    }

    // == Surplus ==
    /// Members to evict so that at most `max_size` remain, oldest first.
    pub async fn surplus(&self, store: &dyn BackingStore, max_size: u64) -> Result<Vec<String>> {
        match self {
            EvictionIndex::Recency { set } => {
                let mut candidates: Vec<(i64, String)> = store
                    .members_with_field(set, CREATED_FIELD)
                    .await?
                    .into_iter()
                    .map(|(member, created)| {
                        // Missing or unreadable timestamps sort first
                        let created = created
                            .and_then(|c| c.parse::<i64>().ok())
                            .unwrap_or(i64::MIN);
                        (created, member)
                    })
                    .collect();
                let excess = (candidates.len() as u64).saturating_sub(max_size) as usize;
                if excess == 0 {
                    return Ok(Vec::new());
                }
                candidates.sort();
                candidates.truncate(excess);
                Ok(candidates.into_iter().map(|(_, member)| member).collect())
            }
            EvictionIndex::Frequency { zset } => {
                let count = store.rank_count(zset).await?;
                if count <= max_size {
                    return Ok(Vec::new());
                }
                store.lowest_ranked(zset, count - max_size).await
            }
        }
    }
}

/// Sorted-set score for an access at `at`.
fn score(at: DateTime<Utc>) -> f64 {
    timestamp_nanos(at) as f64
}
