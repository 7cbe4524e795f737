// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded LRU cache for dispatch results.

use indexmap::IndexMap;
use std::hash::Hash;
use std::sync::Arc;

/// Insertion-ordered map with LRU eviction. Callers wrap it in a mutex;
/// there is a single writer at a time.
pub(crate) struct BoundedCache<K, V> {
    entries: IndexMap<K, Arc<V>>,
    capacity: usize,
}

impl<K: Hash + Eq + Clone, V> BoundedCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        Self { entries: IndexMap::new(), capacity: capacity.max(1) }
    }

    pub fn get(&mut self, key: &K) -> Option<Arc<V>> {
        // Re-insert on hit so the entry moves to the back (most recent).
        let value = self.entries.shift_remove(key)?;
        self.entries.insert(key.clone(), Arc::clone(&value));
        Some(value)
    }

    pub fn put(&mut self, key: K, value: Arc<V>) {
        if self.entries.shift_remove(&key).is_none() && self.entries.len() >= self.capacity {
            self.entries.shift_remove_index(0);
        }
        self.entries.insert(key, value);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
