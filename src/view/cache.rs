use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub fetched_at: Instant,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub enum Lookup<V> {
    /// Younger than the stale time; serve without refetching.
    Fresh(CacheEntry<V>),
    /// Serve, but revalidate in the background.
    Stale(CacheEntry<V>),
    Miss,
}

/// Per-session result cache keyed by an immutable query value.
#[derive(Debug)]
pub struct QueryCache<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    stale_time: Duration,
    max_entries: usize,
}

impl<K, V> QueryCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(stale_time: Duration, max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            stale_time,
            max_entries: max_entries.max(1),
        }
    }

    pub fn lookup(&self, key: &K, now: Instant) -> Lookup<V> {
        match self.entries.get(key) {
            Some(entry) if now.duration_since(entry.fetched_at) < self.stale_time => {
                Lookup::Fresh(entry.clone())
            }
            Some(entry) => Lookup::Stale(entry.clone()),
            None => Lookup::Miss,
        }
    }

    pub fn insert(&mut self, key: K, value: V, now: Instant) -> CacheEntry<V> {
        let entry = CacheEntry {
            value,
            fetched_at: now,
            updated_at: OffsetDateTime::now_utc(),
        };
        self.entries.insert(key, entry.clone());
        self.evict_overflow();
        entry
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    fn evict_overflow(&mut self) {
        while self.entries.len() > self.max_entries {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.fetched_at)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(k) => {
                    self.entries.remove(&k);
                }
                None => break,
            }
        }
    }
}
