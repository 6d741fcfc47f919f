//! Thread-safe NFP memoization.

use crate::nfp::{Nfp, NfpMode};
use sheetnest_core::geometry::{angle_key, Source};
use sheetnest_core::{Error, Result};
use std::collections::hash_map::{DefaultHasher, Entry};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

const SHARD_COUNT: usize = 16;

/// Cache key: both parts by source, both rotations quantized to millidegrees, and
/// the NFP mode.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct NfpKey {
    pub a: Source,
    pub b: Source,
    pub rotation_a: i32,
    pub rotation_b: i32,
    pub inside: bool,
}

impl NfpKey {
    pub fn new(a: Source, b: Source, rotation_a: f64, rotation_b: f64, mode: NfpMode) -> Self {
        Self {
            a,
            b,
            rotation_a: angle_key(rotation_a),
            rotation_b: angle_key(rotation_b),
            inside: mode == NfpMode::Inner,
        }
    }

    /// Key of a sheet's inner NFP for a part.
    pub fn sheet(sheet: Source, part: Source, rotation: f64) -> Self {
        Self::new(sheet, part, 0.0, rotation, NfpMode::Inner)
    }

    fn shard(&self) -> usize {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        (hasher.finish() as usize) % SHARD_COUNT
    }
}

/// Cached value. `None` records a computation that failed, so it is not retried.
pub type CachedNfp = Option<Arc<Nfp>>;

/// Lookup statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

impl CacheStats {
    /// Hits divided by lookups; 0.0 before any lookup.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Sharded NFP cache shared by all workers.
///
/// Inserts keep the first stored value for a key; since NFPs are deterministic any
/// racing writer holds an equivalent value.
#[derive(Debug)]
pub struct NfpCache {
    shards: Vec<RwLock<HashMap<NfpKey, CachedNfp>>>,
    max_size: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl NfpCache {
    /// Creates a cache with default capacity.
    pub fn new() -> Self {
        Self::with_capacity(200_000)
    }

    /// Creates a cache holding at most about `max_size` entries.
    pub fn with_capacity(max_size: usize) -> Self {
        Self {
            shards: (0..SHARD_COUNT).map(|_| RwLock::new(HashMap::new())).collect(),
            max_size: max_size.max(SHARD_COUNT),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn shard(&self, key: &NfpKey) -> &RwLock<HashMap<NfpKey, CachedNfp>> {
        &self.shards[key.shard()]
    }

    /// Looks a key up, counting a hit or a miss.
    pub fn get(&self, key: &NfpKey) -> Result<Option<CachedNfp>> {
        let shard = self
            .shard(key)
            .read()
            .map_err(|e| Error::Internal(format!("Failed to acquire cache read lock: {}", e)))?;
        let found = shard.get(key).cloned();
        drop(shard);

        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        Ok(found)
    }

    /// Returns true if the key is stored. Does not touch the counters.
    pub fn contains(&self, key: &NfpKey) -> bool {
        self.shard(key)
            .read()
            .map(|s| s.contains_key(key))
            .unwrap_or(false)
    }

    /// Stores a value unless the key is already present. Returns the stored value.
    pub fn insert(&self, key: NfpKey, value: CachedNfp) -> Result<CachedNfp> {
        let per_shard = self.max_size / SHARD_COUNT;
        let mut shard = self
            .shard(&key)
            .write()
            .map_err(|e| Error::Internal(format!("Failed to acquire cache write lock: {}", e)))?;

        if !shard.contains_key(&key) && shard.len() >= per_shard {
            let keys_to_remove: Vec<NfpKey> =
                shard.keys().take(per_shard / 2 + 1).copied().collect();
            for k in keys_to_remove {
                shard.remove(&k);
            }
            log::debug!("NFP cache shard full, evicted {} entries", per_shard / 2 + 1);
        }

        let stored = match shard.entry(key) {
            Entry::Occupied(e) => e.get().clone(),
            Entry::Vacant(e) => e.insert(value).clone(),
        };
        Ok(stored)
    }

    /// Returns the cached value or computes and stores it. A failed computation is
    /// stored as `None`.
    pub fn get_or_compute<F>(&self, key: NfpKey, compute: F) -> Result<CachedNfp>
    where
        F: FnOnce() -> Result<Nfp>,
    {
        if let Some(found) = self.get(&key)? {
            return Ok(found);
        }
        let value = match compute() {
            Ok(nfp) => Some(Arc::new(nfp)),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                log::debug!("NFP {:?} unavailable: {}", key, e);
                None
            }
        };
        self.insert(key, value)
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.read().map(|m| m.len()).unwrap_or(0))
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }

    pub fn hit_ratio(&self) -> f64 {
        self.stats().hit_ratio()
    }

    /// Removes all entries and resets the counters.
    pub fn clear(&self) {
        for shard in &self.shards {
            if let Ok(mut s) = shard.write() {
                s.clear();
            }
        }
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}

impl Default for NfpCache {
    fn default() -> Self {
        Self::new()
    }
}
