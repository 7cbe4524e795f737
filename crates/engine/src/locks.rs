// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Keyed async mutexes with eviction.
//!
//! Serializes the state-write critical sections of stop and archive per
//! job. Entries are dropped once no task holds or waits on them, bounding
//! memory across many short-lived jobs.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

#[derive(Default)]
pub struct KeyedLocks<K: Eq + Hash + Clone> {
    locks: Mutex<HashMap<K, Arc<tokio::sync::Mutex<()>>>>,
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self { locks: Mutex::new(HashMap::new()) }
    }

    /// Acquire the lock for `key`, waiting if another task holds it.
    pub async fn acquire(&self, key: K) -> KeyedGuard<'_, K> {
        let lock = {
            let mut locks = self.locks.lock();
            Arc::clone(locks.entry(key.clone()).or_default())
        };
        let guard = lock.lock_owned().await;
        KeyedGuard { _guard: guard, key, locks: self }
    }

    /// Acquire without waiting; `None` when another task holds the key.
    pub fn try_acquire(&self, key: K) -> Option<KeyedGuard<'_, K>> {
        let lock = {
            let mut locks = self.locks.lock();
            Arc::clone(locks.entry(key.clone()).or_default())
        };
        let guard = lock.try_lock_owned().ok()?;
        Some(KeyedGuard { _guard: guard, key, locks: self })
    }

    fn release(&self, key: &K) {
        let mut locks = self.locks.lock();
        // Two strong refs remain while the guard is alive: the map's and
        // the guard's. Fewer means no one else waits; drop the entry.
        if let Some(lock) = locks.get(key) {
            if Arc::strong_count(lock) <= 2 {
                locks.remove(key);
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.locks.lock().len()
    }
}

pub struct KeyedGuard<'a, K: Eq + Hash + Clone> {
    _guard: tokio::sync::OwnedMutexGuard<()>,
    key: K,
    locks: &'a KeyedLocks<K>,
}

impl<K: Eq + Hash + Clone> Drop for KeyedGuard<'_, K> {
    fn drop(&mut self) {
        self.locks.release(&self.key);
    }
}

#[cfg(test)]
#[path = "locks_tests.rs"]
mod tests;
