//! Redis Backing Store
//!
//! [`BackingStore`] over a Redis server through an async connection manager.

use std::fmt;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::debug;

use crate::error::Result;
use crate::remote::codec::Record;
use crate::remote::store::{ttl_millis, BackingStore, StoreOp};

// == Redis Store ==
/// Redis-backed store. Clones share one reconnecting connection.
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Opens a managed connection to `url`, e.g. `redis://127.0.0.1:6379/1`.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let manager = client.get_connection_manager().await?;
        debug!(url, "connected to redis");
        Ok(Self { manager })
    }

    pub fn from_manager(manager: ConnectionManager) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl BackingStore for RedisStore {
    async fn read_record(&self, key: &str) -> Result<Record> {
        let mut conn = self.manager.clone();
        let record: Record = redis::cmd("HGETALL").arg(key).query_async(&mut conn).await?;
        Ok(record)
    }

    async fn has_any_field(&self, key: &str, fields: &[&str]) -> Result<bool> {
        if fields.is_empty() {
            return Ok(false);
        }
        let mut conn = self.manager.clone();
        let mut pipe = redis::pipe();
        for field in fields {
            pipe.cmd("HEXISTS").arg(key).arg(*field);
        }
        let found: Vec<bool> = pipe.query_async(&mut conn).await?;
        Ok(found.into_iter().any(|present| present))
    }

    async fn members_with_field(
        &self,
        set: &str,
        field: &str,
    ) -> Result<Vec<(String, Option<String>)>> {
        let mut conn = self.manager.clone();
        // Each member comes back followed by its hash field
        let flat: Vec<Option<String>> = redis::cmd("SORT")
            .arg(set)
            .arg("BY")
            .arg("nosort")
            .arg("GET")
            .arg("#")
            .arg("GET")
            .arg(format!("*->{field}"))
            .query_async(&mut conn)
            .await?;

        Ok(flat
            .chunks(2)
            .filter_map(|pair| match pair {
                [Some(member), value] => Some((member.clone(), value.clone())),
                _ => None,
            })
            .collect())
    }

    async fn count_records(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.manager.clone();
        let count: u64 = redis::cmd("EXISTS").arg(keys).query_async(&mut conn).await?;
        Ok(count)
    }

    async fn rank_count(&self, zset: &str) -> Result<u64> {
        let mut conn = self.manager.clone();
        let count: u64 = redis::cmd("ZCARD").arg(zset).query_async(&mut conn).await?;
        Ok(count)
    }

    async fn lowest_ranked(&self, zset: &str, count: u64) -> Result<Vec<String>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.manager.clone();
        let members: Vec<String> = redis::cmd("ZRANGE")
            .arg(zset)
            .arg(0)
            .arg(count - 1)
            .query_async(&mut conn)
            .await?;
        Ok(members)
    }

    async fn apply(&self, ops: Vec<StoreOp>) -> Result<()> {
        if ops.is_empty() {
            return Ok(());
        }
        let mut pipe = redis::pipe();
        pipe.atomic();

        for op in &ops {
            match op {
                StoreOp::WriteRecord { key, fields, ttl } => {
                    pipe.cmd("DEL").arg(key).ignore();
                    pipe.cmd("HSET").arg(key);
                    for (field, value) in fields {
                        pipe.arg(*field).arg(value.as_slice());
                    }
                    pipe.ignore();
                    pipe.cmd("PEXPIRE").arg(key).arg(ttl_millis(*ttl)).ignore();
                }
                StoreOp::Delete { keys } if !keys.is_empty() => {
                    pipe.cmd("DEL").arg(keys).ignore();
                }
                StoreOp::SetAdd { set, member } => {
                    pipe.cmd("SADD").arg(set).arg(member).ignore();
                }
                StoreOp::SetRemove { set, members } if !members.is_empty() => {
                    pipe.cmd("SREM").arg(set).arg(members).ignore();
                }
                StoreOp::RankAdd {
                    zset,
                    member,
                    score,
                    only_existing,
                } => {
                    pipe.cmd("ZADD").arg(zset);
                    if *only_existing {
                        pipe.arg("XX");
                    }
                    pipe.arg(*score).arg(member).ignore();
                }
                StoreOp::RankRemove { zset, members } if !members.is_empty() => {
                    pipe.cmd("ZREM").arg(zset).arg(members).ignore();
                }
                StoreOp::Delete { .. }
                | StoreOp::SetRemove { .. }
                | StoreOp::RankRemove { .. } => {}
            }
        }

        let mut conn = self.manager.clone();
        let () = pipe.query_async(&mut conn).await?;
        Ok(())
    }
}
