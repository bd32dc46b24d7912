//! Cache Statistics Module
//!
//! Hit, miss, eviction and fetch failure counters shared by both backends.

use serde::Serialize;

// == Cache Stats ==
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups answered without invoking the fetcher
    pub hits: u64,
    /// Lookups that had to invoke the fetcher
    pub misses: u64,
    /// Entries removed by the size bound
    pub evictions: u64,
    /// Fetcher invocations that returned an error
    pub fetch_errors: u64,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// hits / (hits + misses), or 0.0 before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_evictions(&mut self, count: usize) {
        self.evictions += count as u64;
    }

    pub fn record_fetch_error(&mut self) {
        self.fetch_errors += 1;
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let stats = CacheStats::new();
        assert_eq!(stats, CacheStats::default());
        assert_eq!(stats.hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate_mixed() {
        let mut stats = CacheStats::new();
        stats.record_hit();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        assert_eq!(stats.hit_rate(), 0.75);
    }

    #[test]
    fn test_record_evictions_accumulates() {
        let mut stats = CacheStats::new();
        stats.record_evictions(2);
        stats.record_evictions(3);
        assert_eq!(stats.evictions, 5);
    }

    #[test]
    fn test_stats_serialize() {
        let mut stats = CacheStats::new();
        stats.record_miss();
        stats.record_fetch_error();

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["misses"], 1);
        assert_eq!(json["fetch_errors"], 1);
        assert_eq!(json["hits"], 0);
    }
}
