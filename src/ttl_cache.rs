//! Response cache for the I/O collaborators that fetch fixtures and odds upstream.
//! The analysis modules never read it; callers own an instance and pass results in.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::debug;

pub const DEFAULT_TTL: Duration = Duration::from_secs(120);
pub const DEFAULT_MAX_SIZE: usize = 1000;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
    accessed_at: Instant,
}

/// Time-to-live store for upstream responses. One mutex guards the whole map; when full,
/// the least recently read entry makes room.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    max_size: usize,
    entries: Mutex<HashMap<K, CacheEntry<V>>>,
}

impl<K, V> Default for TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_MAX_SIZE)
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration, max_size: usize) -> Self {
        Self {
            ttl,
            max_size: max_size.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.get_at(key, Instant::now())
    }

    pub fn get_at<Q>(&self, key: &Q, now: Instant) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let mut entries = self.entries.lock().expect("ttl cache lock poisoned");
        let expired = match entries.get_mut(key) {
            None => return None,
            Some(entry) if now >= entry.expires_at => true,
            Some(entry) => {
                entry.accessed_at = now;
                return Some(entry.value.clone());
            }
        };
        if expired {
            entries.remove(key);
        }
        None
    }

    pub fn insert(&self, key: K, value: V) {
        self.insert_at(key, value, self.ttl, Instant::now());
    }

    pub fn insert_with_ttl(&self, key: K, value: V, ttl: Duration) {
        self.insert_at(key, value, ttl, Instant::now());
    }

    pub fn insert_at(&self, key: K, value: V, ttl: Duration, now: Instant) {
        let mut entries = self.entries.lock().expect("ttl cache lock poisoned");
        if !entries.contains_key(&key) && entries.len() >= self.max_size {
            let victim = entries
                .iter()
                .min_by_key(|(_, e)| e.accessed_at)
                .map(|(k, _)| k.clone());
            if let Some(victim) = victim {
                debug!(size = entries.len(), "ttl cache full, evicting least recently used");
                entries.remove(&victim);
            }
        }
        entries.insert(
            key,
            CacheEntry {
                value,
                expires_at: now + ttl,
                accessed_at: now,
            },
        );
    }

    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let mut entries = self.entries.lock().expect("ttl cache lock poisoned");
        entries.remove(key).map(|e| e.value)
    }

    pub fn clear(&self) {
        self.entries.lock().expect("ttl cache lock poisoned").clear();
    }

    /// Includes entries that have expired but were not read since.
    pub fn len(&self) -> usize {
        self.entries.lock().expect("ttl cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
