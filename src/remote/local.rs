//! Local Backing Store
//!
//! In-process emulation of the Redis primitives the networked cache uses,
//! including per-record expiry, for embedding and tests.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::clock::{to_delta, Clock, SystemClock};
use crate::error::{CacheError, Result};
use crate::remote::codec::Record;
use crate::remote::store::{ttl_millis, BackingStore, StoreOp};

#[derive(Debug)]
struct LocalRecord {
    fields: Record,
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct LocalData {
    records: HashMap<String, LocalRecord>,
    sets: HashMap<String, BTreeSet<String>>,
    ranks: HashMap<String, HashMap<String, f64>>,
}

impl LocalData {
    /// The live record at `key`, dropping it first if it has expired.
    fn live_record(&mut self, key: &str, now: DateTime<Utc>) -> Option<&LocalRecord> {
        let expired = self
            .records
            .get(key)
            .and_then(|record| record.expires_at)
            .is_some_and(|expires_at| now >= expires_at);
        if expired {
            self.records.remove(key);
        }
        self.records.get(key)
    }
}

// == Local Store ==
/// In-memory [`BackingStore`].
///
/// Sets and sorted sets never expire, matching Redis where only the records
/// carry a TTL.
#[derive(Debug)]
pub struct LocalStore {
    data: Mutex<LocalData>,
    clock: Arc<dyn Clock>,
    /// Remaining calls before injected failures start; `None` never fails
    fail_after: Mutex<Option<usize>>,
}

impl Default for LocalStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Store whose record expiry follows `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            data: Mutex::new(LocalData::default()),
            clock,
            fail_after: Mutex::new(None),
        }
    }

    /// Lets `calls` more calls succeed, then fails every call until
    /// [`LocalStore::heal`].
    pub fn fail_after(&self, calls: usize) {
        *self.fail_after.lock().unwrap_or_else(|e| e.into_inner()) = Some(calls);
    }

    pub fn heal(&self) {
        *self.fail_after.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Number of live records.
    pub fn record_count(&self) -> usize {
        let now = self.clock.now();
        let data = self.data();
        data.records
            .values()
            .filter(|record| record.expires_at.map_or(true, |at| now < at))
            .count()
    }

    fn data(&self) -> std::sync::MutexGuard<'_, LocalData> {
        self.data.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_available(&self) -> Result<()> {
        let mut remaining = self.fail_after.lock().unwrap_or_else(|e| e.into_inner());
        match remaining.as_mut() {
            Some(0) => Err(CacheError::Unavailable("injected failure".to_string())),
            Some(calls) => {
                *calls -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn apply_op(&self, data: &mut LocalData, op: StoreOp, now: DateTime<Utc>) {
        match op {
            StoreOp::WriteRecord { key, fields, ttl } => {
                let ttl = std::time::Duration::from_millis(ttl_millis(ttl));
                let record = LocalRecord {
                    fields: fields
                        .into_iter()
                        .map(|(field, value)| (field.to_string(), value))
                        .collect(),
                    expires_at: now.checked_add_signed(to_delta(ttl)),
                };
                data.records.insert(key, record);
            }
            StoreOp::Delete { keys } => {
                for key in keys {
                    data.records.remove(&key);
                }
            }
            StoreOp::SetAdd { set, member } => {
                data.sets.entry(set).or_default().insert(member);
            }
            StoreOp::SetRemove { set, members } => {
                if let Some(existing) = data.sets.get_mut(&set) {
                    for member in &members {
                        existing.remove(member);
                    }
                    if existing.is_empty() {
                        data.sets.remove(&set);
                    }
                }
            }
            StoreOp::RankAdd {
                zset,
                member,
                score,
                only_existing,
            } => {
                let ranks = data.ranks.entry(zset).or_default();
                if !only_existing || ranks.contains_key(&member) {
                    ranks.insert(member, score);
                }
            }
            StoreOp::RankRemove { zset, members } => {
                if let Some(ranks) = data.ranks.get_mut(&zset) {
                    for member in &members {
                        ranks.remove(member);
                    }
                }
            }
        }
    }
}

#[async_trait]
impl BackingStore for LocalStore {
    async fn read_record(&self, key: &str) -> Result<Record> {
        self.check_available()?;
        let now = self.clock.now();
        let mut data = self.data();
        Ok(data
            .live_record(key, now)
            .map(|record| record.fields.clone())
            .unwrap_or_default())
    }

    async fn has_any_field(&self, key: &str, fields: &[&str]) -> Result<bool> {
        self.check_available()?;
        let now = self.clock.now();
        let mut data = self.data();
        Ok(data
            .live_record(key, now)
            .is_some_and(|record| fields.iter().any(|f| record.fields.contains_key(*f))))
    }

    async fn members_with_field(
        &self,
        set: &str,
        field: &str,
    ) -> Result<Vec<(String, Option<String>)>> {
        self.check_available()?;
        let now = self.clock.now();
        let mut data = self.data();
        let members: Vec<String> = data
            .sets
            .get(set)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default();

        Ok(members
            .into_iter()
            .map(|member| {
                let value = data
                    .live_record(&member, now)
                    .and_then(|record| record.fields.get(field))
                    .map(|raw| String::from_utf8_lossy(raw).into_owned());
                (member, value)
            })
            .collect())
    }

    async fn count_records(&self, keys: &[String]) -> Result<u64> {
        self.check_available()?;
        let now = self.clock.now();
        let mut data = self.data();
        let mut live = 0;
        for key in keys {
            if data.live_record(key, now).is_some() {
                live += 1;
            }
        }
        Ok(live)
    }

    async fn rank_count(&self, zset: &str) -> Result<u64> {
        self.check_available()?;
        let data = self.data();
        Ok(data.ranks.get(zset).map_or(0, |ranks| ranks.len() as u64))
    }

    async fn lowest_ranked(&self, zset: &str, count: u64) -> Result<Vec<String>> {
        self.check_available()?;
        let data = self.data();
        let mut ranked: Vec<(&String, f64)> = data
            .ranks
            .get(zset)
            .map(|ranks| ranks.iter().map(|(member, score)| (member, *score)).collect())
            .unwrap_or_default();
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(b.0)));

        Ok(ranked
            .into_iter()
            .take(count as usize)
            .map(|(member, _)| member.clone())
            .collect())
    }

    async fn apply(&self, ops: Vec<StoreOp>) -> Result<()> {
        self.check_available()?;
        let now = self.clock.now();
        let mut data = self.data();
        for op in ops {
            self.apply_op(&mut data, op, now);
        }
        Ok(())
    }
}
