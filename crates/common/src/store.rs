//! Keyed in-memory store whose entries expire against an injected clock.

use crate::clock::{Clock, SystemClock};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    expires_at: Option<DateTime<Utc>>,
}

impl<V> Entry<V> {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// A keyed map where each entry may carry a time-to-live.
///
/// Expired entries are invisible to readers immediately and are physically
/// dropped by [`ExpiringStore::purge_expired`] or when overwritten.
#[derive(Debug)]
pub struct ExpiringStore<K, V, C = SystemClock> {
    entries: HashMap<K, Entry<V>>,
    clock: C,
}

impl<K: Eq + Hash, V> ExpiringStore<K, V, SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl<K: Eq + Hash, V> Default for ExpiringStore<K, V, SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash, V, C: Clock> ExpiringStore<K, V, C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            entries: HashMap::new(),
            clock,
        }
    }

    /// Insert a value that lives for `ttl`. Returns the previous live value.
    pub fn insert_with_ttl(&mut self, key: K, value: V, ttl: Duration) -> Option<V> {
        let expires_at = Some(self.clock.now() + ttl);
        self.put(key, Entry { value, expires_at })
    }

    /// Insert a value that never expires. Returns the previous live value.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.put(
            key,
            Entry {
                value,
                expires_at: None,
            },
        )
    }

    fn put(&mut self, key: K, entry: Entry<V>) -> Option<V> {
        let now = self.clock.now();
        self.entries
            .insert(key, entry)
            .filter(|old| old.is_live(now))
            .map(|old| old.value)
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        let now = self.clock.now();
        self.entries
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| &e.value)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let now = self.clock.now();
        self.entries
            .remove(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value)
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&mut self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, e| e.is_live(now));
        before - self.entries.len()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.entries.values().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
