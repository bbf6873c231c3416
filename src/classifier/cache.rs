// src/classifier/cache.rs - Bounded memo table for pure token validators

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

/// Token -> verdict map with a fixed capacity.
///
/// When full, the whole table is dropped and refilled. Entries are pure
/// functions of their key, so eviction never changes an answer, and the
/// toki pona vocabulary is small enough that refills are rare. A capacity of
/// zero disables caching.
#[derive(Debug)]
pub struct MemoCache {
    capacity: usize,
    entries: RwLock<HashMap<String, bool>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemoCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: RwLock::new(HashMap::with_capacity(capacity.min(1024))),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get_or_insert_with<F>(&self, key: &str, compute: F) -> bool
    where
        F: FnOnce() -> bool,
    {
        if self.capacity == 0 {
            return compute();
        }

        // A poisoned lock only means another thread panicked mid-insert;
        // every stored value is still correct.
        if let Some(&hit) = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
        {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return hit;
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let value = compute();

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.len() >= self.capacity {
            entries.clear();
        }
        entries.insert(key.to_string(), value);
        value
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        self.entries.write().unwrap_or_else(PoisonError::into_inner).clear();
    }
}
