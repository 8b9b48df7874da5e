//! Adaptive replacement cache with per-entry expiry.
//!
//! Resident entries live in two LRU lists: `t1` (seen once recently) and
//! `t2` (seen at least twice).  Evicted keys are remembered in the ghost
//! lists `b1` and `b2`; a miss that hits a ghost list shifts the target
//! size `p` of `t1` towards whichever list would have kept the entry.
//! `t1 + t2` never exceeds the capacity, and the four lists together never
//! exceed twice the capacity.
//!
//! All bookkeeping sits behind a single mutex, so the cache can be shared
//! between request tasks.

use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use lru::LruCache;

#[derive(Debug)]
struct Entry<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

struct ArcState<K: Hash + Eq, V> {
    capacity: usize,
    /// Target size of `t1`.
    target: usize,
    t1: LruCache<K, Entry<V>>,
    t2: LruCache<K, Entry<V>>,
    b1: LruCache<K, ()>,
    b2: LruCache<K, ()>,
}

impl<K: Hash + Eq + Clone, V> ArcState<K, V> {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            target: 0,
            t1: LruCache::unbounded(),
            t2: LruCache::unbounded(),
            b1: LruCache::unbounded(),
            b2: LruCache::unbounded(),
        }
    }

    /// Move one resident entry to its ghost list when the cache is full.
    fn replace(&mut self, in_b2: bool) {
        if self.t1.len() + self.t2.len() < self.capacity {
            return;
        }
        let t1 = self.t1.len();
        if t1 > 0 && (t1 > self.target || (in_b2 && t1 == self.target)) {
            if let Some((key, _)) = self.t1.pop_lru() {
                self.b1.put(key, ());
            }
        } else if let Some((key, _)) = self.t2.pop_lru() {
            self.b2.put(key, ());
        } else if let Some((key, _)) = self.t1.pop_lru() {
            self.b1.put(key, ());
        }
    }

    fn trim_ghosts(&mut self) {
        while self.b1.len() > self.capacity {
            self.b1.pop_lru();
        }
        while self.b2.len() > self.capacity {
            self.b2.pop_lru();
        }
    }

    fn insert(&mut self, key: K, entry: Entry<V>) {
        if self.t1.contains(&key) {
            self.t1.put(key, entry);
            return;
        }
        if self.t2.contains(&key) {
            self.t2.put(key, entry);
            return;
        }

        if self.b1.contains(&key) {
            let delta = (self.b2.len() / self.b1.len()).max(1);
            self.target = (self.target + delta).min(self.capacity);
            self.replace(false);
            self.b1.pop(&key);
            self.t2.put(key, entry);
            return;
        }

        if self.b2.contains(&key) {
            let delta = (self.b1.len() / self.b2.len()).max(1);
            self.target = self.target.saturating_sub(delta);
            self.replace(true);
            self.b2.pop(&key);
            self.t2.put(key, entry);
            return;
        }

        if self.t1.len() + self.b1.len() >= self.capacity {
            if self.t1.len() < self.capacity {
                self.b1.pop_lru();
                self.replace(false);
            } else {
                self.t1.pop_lru();
            }
        } else {
            let total = self.t1.len() + self.t2.len() + self.b1.len() + self.b2.len();
            if total >= self.capacity {
                if total >= 2 * self.capacity {
                    self.b2.pop_lru();
                }
                self.replace(false);
            }
        }
        self.t1.put(key, entry);
    }
}

/// Thread-safe ARC cache with an optional time-to-live per entry.
pub struct ArcCache<K: Hash + Eq, V> {
    state: Mutex<ArcState<K, V>>,
    ttl: Option<Duration>,
}

impl<K: Hash + Eq + Clone, V: Clone> ArcCache<K, V> {
    /// Create a cache holding at most `capacity` entries (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(ArcState::new(capacity.max(1))),
            ttl: None,
        }
    }

    /// Expire entries `ttl` after they were inserted.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    fn lock(&self) -> MutexGuard<'_, ArcState<K, V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up a non-expired entry.  An expired entry is dropped and its
    /// key remembered in the matching ghost list.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let mut guard = self.lock();
        let state = &mut *guard;

        if let Some(entry) = state.t1.pop(key) {
            if entry.is_expired(now) {
                state.b1.put(key.clone(), ());
                state.trim_ghosts();
                return None;
            }
            let value = entry.value.clone();
            state.t2.put(key.clone(), entry);
            return Some(value);
        }

        let expired = state.t2.get(key)?.is_expired(now);
        if expired {
            state.t2.pop(key);
            state.b2.put(key.clone(), ());
            state.trim_ghosts();
            return None;
        }
        state.t2.peek(key).map(|entry| entry.value.clone())
    }

    /// Insert or replace an entry.
    pub fn insert(&self, key: K, value: V) {
        let entry = Entry {
            value,
            expires_at: self.ttl.map(|ttl| Instant::now() + ttl),
        };
        self.lock().insert(key, entry);
    }

    /// Whether a non-expired entry is resident, without touching recency.
    pub fn contains(&self, key: &K) -> bool {
        let now = Instant::now();
        let state = self.lock();
        state
            .t1
            .peek(key)
            .or_else(|| state.t2.peek(key))
            .is_some_and(|entry| !entry.is_expired(now))
    }

    /// Number of resident entries, expired ones included.
    pub fn len(&self) -> usize {
        let state = self.lock();
        state.t1.len() + state.t2.len()
    }

    /// Whether no entry is resident.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of resident entries.
    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }
}

impl<K: Hash + Eq, V> std::fmt::Debug for ArcCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArcCache")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
