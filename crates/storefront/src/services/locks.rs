//! Per-cart write locks.
//!
//! The registry only holds weak references. A cart's mutex lives exactly as
//! long as some request holds or waits on it, so a lock in use can never be
//! evicted and an idle one costs nothing.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, Weak};

use tokio::sync::Mutex;

use crate::store::CartKey;

/// Registry of per-cart mutexes.
#[derive(Debug, Default)]
pub struct CartLocks {
    locks: std::sync::Mutex<HashMap<CartKey, Weak<Mutex<()>>>>,
}

impl CartLocks {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The mutex for `key`, shared with every other live holder.
    #[must_use]
    pub fn acquire(&self, key: CartKey) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(lock) = locks.get(&key).and_then(Weak::upgrade) {
            return lock;
        }

        // Drop entries nobody holds any more before adding one.
        locks.retain(|_, lock| lock.strong_count() > 0);

        let lock = Arc::new(Mutex::new(()));
        locks.insert(key, Arc::downgrade(&lock));
        lock
    }

    /// Carts with a live lock.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|lock| lock.strong_count() > 0)
            .count()
    }

    /// Whether no cart has a live lock.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
