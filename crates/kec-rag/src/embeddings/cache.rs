//! Bounded, concurrency-safe embedding cache keyed by a content fingerprint

use parking_lot::Mutex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

/// Cache hit/miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub capacity: usize,
}

/// Vectors plus a recency index; `order` maps each entry's last tick to its key
#[derive(Default)]
struct LruState {
    vectors: HashMap<String, (Vec<f32>, u64)>,
    order: BTreeMap<u64, String>,
    clock: u64,
}

impl LruState {
    fn touch(&mut self, key: &str) -> Option<Vec<f32>> {
        self.clock += 1;
        let tick = self.clock;
        let (vector, last_used) = self.vectors.get_mut(key)?;
        self.order.remove(&*last_used);
        *last_used = tick;
        self.order.insert(tick, key.to_string());
        Some(vector.clone())
    }

    fn put(&mut self, key: String, vector: Vec<f32>) {
        self.clock += 1;
        let tick = self.clock;
        if let Some((_, previous)) = self.vectors.insert(key.clone(), (vector, tick)) {
            self.order.remove(&previous);
        }
        self.order.insert(tick, key);
    }

    fn evict_oldest(&mut self) -> bool {
        match self.order.pop_first() {
            Some((_, key)) => {
                self.vectors.remove(&key);
                true
            }
            None => false,
        }
    }
}

/// Least-recently-used embedding cache.
///
/// Lookups and inserts are O(log n). Writes are idempotent (the same text
/// always embeds to the same vector), so concurrent inserts of one key are
/// harmless.
pub struct EmbeddingCache {
    state: Mutex<LruState>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl EmbeddingCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(LruState::default()),
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Cache key: input length plus SHA-256 of the full text
    pub fn fingerprint(text: &str) -> String {
        let digest = Sha256::digest(text.as_bytes());
        format!("{}:{}", text.len(), hex::encode(digest))
    }

    /// Look up a vector, refreshing its recency on a hit
    pub fn get(&self, text: &str) -> Option<Vec<f32>> {
        let key = Self::fingerprint(text);
        let found = self.state.lock().touch(&key);
        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Store a vector, evicting the least recently used entries over capacity
    pub fn insert(&self, text: &str, vector: Vec<f32>) {
        if self.capacity == 0 {
            return;
        }

        let key = Self::fingerprint(text);
        let mut state = self.state.lock();
        state.put(key, vector);
        while state.vectors.len() > self.capacity {
            if !state.evict_oldest() {
                break;
            }
        }
    }

    /// Drop every entry and reset the counters
    pub fn clear(&self) {
        *self.state.lock() = LruState::default();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.state.lock().vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
            capacity: self.capacity,
        }
    }
}
