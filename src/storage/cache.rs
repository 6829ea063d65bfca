//! TTL-annotated last-known-good cache
//!
//! Entries are never evicted. The TTL only classifies an entry as fresh
//! (reusable without an upstream call) or expired (usable as a labelled
//! fallback, at the caller's discretion).

use crate::types::{Metric, SourceReading};
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// Cache entry with the time it was written
#[derive(Debug, Clone)]
struct CacheEntry<T> {
    value: T,
    stored_at: DateTime<Utc>,
}

impl<T: Clone> CacheEntry<T> {
    fn snapshot(&self, now: DateTime<Utc>) -> Cached<T> {
        Cached {
            value: self.value.clone(),
            stored_at: self.stored_at,
            // Clock skew must not produce a negative age
            age: (now - self.stored_at).max(Duration::zero()),
        }
    }
}

/// A cached value together with its age at read time
#[derive(Debug, Clone, PartialEq)]
pub struct Cached<T> {
    pub value: T,
    pub stored_at: DateTime<Utc>,
    pub age: Duration,
}

impl<T> Cached<T> {
    pub fn age_secs(&self) -> i64 {
        self.age.num_seconds()
    }

    pub fn within(&self, limit: Duration) -> bool {
        self.age <= limit
    }
}

/// Shared keyed store with last-writer-wins semantics
#[derive(Debug, Clone)]
pub struct TtlCache<K, V> {
    entries: Arc<RwLock<HashMap<K, CacheEntry<V>>>>,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl_secs: i64) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl: Duration::seconds(ttl_secs),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Store a value observed now
    pub fn put(&self, key: K, value: V) {
        self.put_at(key, value, Utc::now());
    }

    pub fn put_at(&self, key: K, value: V, stored_at: DateTime<Utc>) {
        let mut cache = self.entries.write();
        cache.insert(key, CacheEntry { value, stored_at });
    }

    /// Latest value regardless of age
    pub fn get(&self, key: &K) -> Option<Cached<V>> {
        self.get_at(key, Utc::now())
    }

    pub fn get_at(&self, key: &K, now: DateTime<Utc>) -> Option<Cached<V>> {
        let cache = self.entries.read();
        cache.get(key).map(|entry| entry.snapshot(now))
    }

    /// Latest value only if still within the TTL
    pub fn get_fresh(&self, key: &K) -> Option<V> {
        self.get(key)
            .filter(|cached| cached.within(self.ttl))
            .map(|cached| cached.value)
    }

    /// First cached value (any age) the selector accepts
    pub fn find_map<T>(&self, mut selector: impl FnMut(&K, &V) -> Option<T>) -> Option<T> {
        let cache = self.entries.read();
        cache.iter().find_map(|(k, entry)| selector(k, &entry.value))
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let now = Utc::now();
        let cache = self.entries.read();
        let total = cache.len();
        let fresh = cache
            .values()
            .filter(|e| now - e.stored_at <= self.ttl)
            .count();
        CacheStats {
            total_entries: total,
            fresh_entries: fresh,
            expired_entries: total - fresh,
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub fresh_entries: usize,
    pub expired_entries: usize,
}

/// Identity of a reading in the store
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub provider: String,
    pub metric: Metric,
    pub symbol: String,
}

impl CacheKey {
    pub fn new(provider: &str, metric: Metric, symbol: &str) -> Self {
        Self {
            provider: provider.to_string(),
            metric,
            symbol: symbol.to_uppercase(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.provider, self.metric, self.symbol)
    }
}

/// Last successful reading per (provider, metric, symbol)
pub type ReadingCache = TtlCache<CacheKey, SourceReading>;
