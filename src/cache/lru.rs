//! Recency Queue Module
//!
//! Access-order tracking for the in-memory backend's eviction.

use std::collections::VecDeque;

// == Recency Queue ==
/// Keys ordered from least to most recently used.
///
/// - Front = next eviction candidate
/// - Back = most recently touched
#[derive(Debug, Default)]
pub struct RecencyQueue {
    order: VecDeque<String>,
}

impl RecencyQueue {
    pub fn new() -> Self {
        Self {
            order: VecDeque::new(),
        }
    }

    // == Touch ==
    /// Moves `key` to the most recently used end, appending it if new.
    pub fn touch(&mut self, key: &str) {
        self.remove(key);
        self.order.push_back(key.to_string());
    }

    // == Remove ==
    pub fn remove(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
    }

    // == Pop Oldest ==
    /// Removes and returns the least recently used key.
    pub fn pop_oldest(&mut self) -> Option<String> {
        self.order.pop_front()
    }

    pub fn peek_oldest(&self) -> Option<&str> {
        self.order.front().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.order.iter().any(|k| k == key)
    }
}
