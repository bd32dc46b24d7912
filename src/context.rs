//! Operation Context Module
//!
//! Carries cooperative cancellation into cache operations and fetchers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{CacheError, Result};

// == Context ==
/// Per-call context handed to every cache operation and forwarded to fetchers.
///
/// Clones share cancellation state: cancelling any clone cancels them all.
/// Operations check the context before they start and again before writing
/// a fetched value, failing fast with [`CacheError::Cancelled`].
#[derive(Debug, Clone, Default)]
pub struct Context {
    cancelled: Arc<AtomicBool>,
}

impl Context {
    /// Creates a context that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation for this context and all of its clones.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns `Err(CacheError::Cancelled)` once cancellation was requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(CacheError::Cancelled)
        } else {
            Ok(())
        }
    }
}
