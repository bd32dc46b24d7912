//! Cache Entry Module
//!
//! Defines keys, fetch results and the immutable items stored by every backend.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::clock::to_delta;

// == Key ==
/// Identity of a cached item; its string form addresses storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(String);

impl Key {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Canonical string form used for storage addressing.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// == Payload ==
/// What a fetch produced: a value or a remembered error.
#[derive(Debug, Clone)]
pub enum Payload {
    Value(Vec<u8>),
    Error(Arc<anyhow::Error>),
}

// == Cacheable ==
/// Result of a successful fetch, before it is stamped and stored.
#[derive(Debug, Clone)]
pub struct Cacheable {
    payload: Payload,
    duration: Duration,
}

impl Cacheable {
    /// A value to keep for `duration`.
    pub fn value(value: impl Into<Vec<u8>>, duration: Duration) -> Self {
        Self {
            payload: Payload::Value(value.into()),
            duration,
        }
    }

    /// An error to remember for `duration` so the origin is not hammered.
    pub fn error(error: anyhow::Error, duration: Duration) -> Self {
        Self {
            payload: Payload::Error(Arc::new(error)),
            duration,
        }
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

// == Item ==
/// A stored cache record. Backends replace items; they never mutate them.
#[derive(Debug, Clone)]
pub struct Item {
    payload: Payload,
    cached: DateTime<Utc>,
    duration: Duration,
}

impl Item {
    pub fn new(payload: Payload, cached: DateTime<Utc>, duration: Duration) -> Self {
        Self {
            payload,
            cached,
            duration,
        }
    }

    /// Stamps a fetch result with the time it was cached.
    pub fn from_cacheable(cacheable: Cacheable, cached: DateTime<Utc>) -> Self {
        Self::new(cacheable.payload, cached, cacheable.duration)
    }

    /// The cached value, or `None` when an error was cached.
    pub fn value(&self) -> Option<&[u8]> {
        match &self.payload {
            Payload::Value(value) => Some(value),
            Payload::Error(_) => None,
        }
    }

    /// The cached error, or `None` when a value was cached.
    pub fn error(&self) -> Option<&anyhow::Error> {
        match &self.payload {
            Payload::Value(_) => None,
            Payload::Error(err) => Some(err),
        }
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn cached(&self) -> DateTime<Utc> {
        self.cached
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    // == Expiry ==
    /// True once `now` is strictly past `cached + duration`.
    ///
    /// A duration too large to represent never expires.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.cached.checked_add_signed(to_delta(self.duration)) {
            Some(expires) => now > expires,
            None => false,
        }
    }

    /// Expiry against the wall clock.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}
