//! Size- and time-bounded cache for directory metadata.
//!
//! Entries expire on a sliding TTL: every successful lookup re-stamps the
//! entry. When the cache is full, the least recently accessed entry is
//! evicted before a new one is inserted.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use protocol::DirectoryRecord;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

/// Cache of directory trees keyed on the resolved absolute path.
pub type DirectoryCache = MetadataCache<DirectoryRecord>;

/// Derive the cache key for a resolved absolute path.
pub fn key_for(path: &Path) -> String {
    hex::encode(Sha256::digest(path.as_os_str().as_encoded_bytes()))
}

struct Slot<V> {
    value: V,
    last_access: Instant,
    /// Position in the recency order.
    seq: u64,
}

struct CacheState<V> {
    entries: HashMap<String, Slot<V>>,
    /// Recency order, oldest first.
    order: BTreeMap<u64, String>,
    next_seq: u64,
}

impl<V: Clone> CacheState<V> {
    fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn remove(&mut self, key: &str) -> Option<Slot<V>> {
        let slot = self.entries.remove(key)?;
        self.order.remove(&slot.seq);
        Some(slot)
    }

    fn touch(&mut self, key: &str, now: Instant) -> Option<V> {
        let seq = self.next_seq();
        let slot = self.entries.get_mut(key)?;
        self.order.remove(&slot.seq);
        slot.seq = seq;
        slot.last_access = now;
        self.order.insert(seq, key.to_string());
        Some(slot.value.clone())
    }

    fn evict_oldest(&mut self) -> Option<String> {
        let (_, key) = self.order.pop_first()?;
        self.entries.remove(&key);
        Some(key)
    }
}

/// A thread-safe LRU cache with a sliding TTL.
///
/// All state lives behind a single mutex so that expiry and eviction
/// decisions are made against a consistent view.
pub struct MetadataCache<V> {
    capacity: usize,
    ttl: Duration,
    state: Mutex<CacheState<V>>,
}

impl<V: Clone> MetadataCache<V> {
    /// Create a cache holding at most `capacity` entries for `ttl` after
    /// their last access.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity,
            ttl,
            state: Mutex::new(CacheState {
                entries: HashMap::with_capacity(capacity),
                order: BTreeMap::new(),
                next_seq: 0,
            }),
        }
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Sliding time-to-live.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up a key, re-stamping it on a hit.
    pub fn get(&self, key: &str) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    /// Look up a key as of `now`.
    pub fn get_at(&self, key: &str, now: Instant) -> Option<V> {
        let mut state = self.lock()?;

        let last_access = state.entries.get(key)?.last_access;
        if now.saturating_duration_since(last_access) > self.ttl {
            state.remove(key);
            debug!(key, "Cache entry expired");
            return None;
        }

        state.touch(key, now)
    }

    /// Insert or replace a value.
    pub fn set(&self, key: impl Into<String>, value: V) {
        self.set_at(key, value, Instant::now());
    }

    /// Insert or replace a value as of `now`.
    pub fn set_at(&self, key: impl Into<String>, value: V, now: Instant) {
        if self.capacity == 0 {
            return;
        }
        let Some(mut state) = self.lock() else {
            return;
        };

        let key = key.into();
        state.remove(&key);

        while state.entries.len() >= self.capacity {
            match state.evict_oldest() {
                Some(evicted) => debug!(key = %evicted, "Evicted least recently used cache entry"),
                None => break,
            }
        }

        let seq = state.next_seq();
        state.order.insert(seq, key.clone());
        state.entries.insert(
            key,
            Slot {
                value,
                last_access: now,
                seq,
            },
        );
    }

    /// Remove a key. Returns whether it was present.
    pub fn remove(&self, key: &str) -> bool {
        self.lock()
            .map(|mut state| state.remove(key).is_some())
            .unwrap_or(false)
    }

    /// Drop every entry.
    pub fn clear(&self) {
        if let Some(mut state) = self.lock() {
            state.entries.clear();
            state.order.clear();
        }
    }

    /// Drop every entry whose TTL has run out as of `now`. Returns the number
    /// removed.
    pub fn purge_expired_at(&self, now: Instant) -> usize {
        let Some(mut state) = self.lock() else {
            return 0;
        };
        let expired: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, slot)| now.saturating_duration_since(slot.last_access) > self.ttl)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            state.remove(key);
        }
        expired.len()
    }

    /// Number of entries, including any not yet purged after expiry.
    pub fn len(&self) -> usize {
        self.lock().map(|state| state.entries.len()).unwrap_or(0)
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Option<MutexGuard<'_, CacheState<V>>> {
        match self.state.lock() {
            Ok(guard) => Some(guard),
            Err(_) => {
                warn!("Metadata cache lock poisoned, treating as a miss");
                None
            }
        }
    }
}
