//! Bounded memoization for similarity matrices and novelty kernels
//!
//! One store, one LRU order, one eviction path. Every kind of entry lives in
//! the same map, so `clear` and capacity eviction always cover all of them.
//! The cache is owned by the caller, never global, and is optional: a run
//! without a cache (or with capacity 0) produces identical results.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::features::novelty::CheckerboardKernel;
use crate::features::similarity::{FeatureChannel, SimilarityMatrix};

/// Default maximum number of cached entries
pub const DEFAULT_CACHE_ENTRIES: usize = 16;

/// Identity of a cached entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Similarity matrix for a frame range
    Similarity {
        /// Hash of the frame range contents
        range_hash: u64,
        /// Number of native frames in the range
        frame_count: usize,
        /// Feature channel the matrix was built from
        channel: FeatureChannel,
        /// Downsample factor used
        downsample_factor: usize,
    },
    /// Gaussian-tapered checkerboard kernel
    Kernel {
        /// Kernel half-width in matrix indices
        half_width: usize,
    },
}

#[derive(Debug, Clone)]
enum CacheEntry {
    Similarity(Arc<SimilarityMatrix>),
    Kernel(Arc<CheckerboardKernel>),
}

/// Cache usage counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups that found an entry
    pub hits: u64,
    /// Lookups that did not
    pub misses: u64,
    /// Entries dropped by capacity eviction
    pub evictions: u64,
}

/// LRU cache with a fixed entry budget
#[derive(Debug)]
pub struct SimilarityCache {
    capacity: usize,
    entries: HashMap<CacheKey, CacheEntry>,
    order: VecDeque<CacheKey>,
    stats: CacheStats,
}

impl SimilarityCache {
    /// Create a cache holding at most `capacity` entries (0 disables caching)
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            order: VecDeque::new(),
            stats: CacheStats::default(),
        }
    }

    /// A cache that never stores anything
    pub fn disabled() -> Self {
        Self::new(0)
    }

    /// Whether the cache stores entries at all
    pub fn is_enabled(&self) -> bool {
        self.capacity > 0
    }

    /// Maximum entry count
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current entry count (all entry kinds)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is cached
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Usage counters
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Change the entry budget, evicting least-recently-used entries as needed
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        self.evict_to(capacity);
    }

    /// Drop every entry of every kind
    pub fn clear(&mut self) {
        self.evict_to(0);
    }

    /// Look up a similarity matrix
    pub fn get_similarity(&mut self, key: &CacheKey) -> Option<Arc<SimilarityMatrix>> {
        match self.touch(key) {
            Some(CacheEntry::Similarity(m)) => Some(m),
            _ => None,
        }
    }

    /// Store a similarity matrix
    pub fn put_similarity(&mut self, key: CacheKey, matrix: Arc<SimilarityMatrix>) {
        self.insert(key, CacheEntry::Similarity(matrix));
    }

    /// Fetch a kernel, building and storing it on a miss
    pub fn kernel(&mut self, half_width: usize) -> Arc<CheckerboardKernel> {
        let key = CacheKey::Kernel { half_width };
        if let Some(CacheEntry::Kernel(k)) = self.touch(&key) {
            return k;
        }
        let kernel = Arc::new(CheckerboardKernel::new(half_width));
        self.insert(key, CacheEntry::Kernel(Arc::clone(&kernel)));
        kernel
    }

    fn touch(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        match self.entries.get(key) {
            Some(entry) => {
                let entry = entry.clone();
                self.stats.hits += 1;
                if let Some(pos) = self.order.iter().position(|k| k == key) {
                    self.order.remove(pos);
                }
                self.order.push_back(*key);
                Some(entry)
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    fn insert(&mut self, key: CacheKey, entry: CacheEntry) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.insert(key, entry).is_some() {
            if let Some(pos) = self.order.iter().position(|k| *k == key) {
                self.order.remove(pos);
            }
        }
        self.order.push_back(key);
        self.evict_to(self.capacity);
    }

    /// The only removal path: shrink to `limit` entries in LRU order
    fn evict_to(&mut self, limit: usize) {
        while self.order.len() > limit {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
                if limit > 0 {
                    self.stats.evictions += 1;
                }
            }
        }
        debug_assert_eq!(self.order.len(), self.entries.len());
    }
}

impl Default for SimilarityCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_ENTRIES)
    }
}
