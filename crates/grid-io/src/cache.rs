//! LRU cache for decoded raster chunks (TIFF strips or tiles).

use std::sync::Arc;

use lru::LruCache;

use crate::types::CacheStats;

/// Cache key for chunks: (path_hash, chunk_index).
pub type ChunkKey = (u64, u32);

/// Decoded chunk samples, shared between the cache and readers.
pub type Chunk = Arc<[f64]>;

/// LRU cache for decoded chunks with memory-bounded eviction.
pub struct ChunkCache {
    cache: LruCache<ChunkKey, Chunk>,
    memory_limit: usize,
    current_memory: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl ChunkCache {
    /// Create a new chunk cache with the given memory limit in bytes.
    pub fn new(memory_limit: usize) -> Self {
        Self {
            cache: LruCache::unbounded(),
            memory_limit,
            current_memory: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    fn chunk_bytes(chunk: &Chunk) -> usize {
        chunk.len() * std::mem::size_of::<f64>()
    }

    /// Try to get a chunk from the cache, recording a hit or a miss.
    pub fn get(&mut self, key: &ChunkKey) -> Option<Chunk> {
        if let Some(data) = self.cache.get(key) {
            self.hits += 1;
            Some(Arc::clone(data))
        } else {
            self.misses += 1;
            None
        }
    }

    /// Insert a chunk, evicting least recently used entries to make room.
    ///
    /// Chunks larger than the whole budget are not cached.
    pub fn insert(&mut self, key: ChunkKey, data: Chunk) {
        let data_size = Self::chunk_bytes(&data);

        while self.current_memory + data_size > self.memory_limit && !self.cache.is_empty() {
            if let Some((_, evicted)) = self.cache.pop_lru() {
                self.current_memory = self
                    .current_memory
                    .saturating_sub(Self::chunk_bytes(&evicted));
                self.evictions += 1;
            }
        }

        if data_size <= self.memory_limit {
            if let Some(old) = self.cache.put(key, data) {
                self.current_memory = self.current_memory.saturating_sub(Self::chunk_bytes(&old));
            }
            self.current_memory += data_size;
        }
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.cache.len(),
            memory_bytes: self.current_memory as u64,
            evictions: self.evictions,
        }
    }

    /// Clear all entries from the cache.
    pub fn clear(&mut self) {
        self.cache.clear();
        self.current_memory = 0;
    }

    /// Get the current memory usage in bytes.
    pub fn memory_usage(&self) -> usize {
        self.current_memory
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

/// Hash a source path for use in cache keys.
pub fn hash_path(path: &str) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(values: &[f64]) -> Chunk {
        Arc::from(values)
    }

    #[test]
    fn test_cache_insert_and_get() {
        let mut cache = ChunkCache::new(1024 * 1024);
        let key = (123, 0);

        assert!(cache.get(&key).is_none());
        cache.insert(key, chunk(&[1.0, 2.0, 3.0, 4.0]));
        assert_eq!(cache.get(&key).as_deref(), Some(&[1.0, 2.0, 3.0, 4.0][..]));
    }

    #[test]
    fn test_cache_lru_eviction() {
        // 64 bytes holds two chunks of four f64 values
        let mut cache = ChunkCache::new(64);

        for i in 0..10 {
            cache.insert((0, i), chunk(&[i as f64; 4]));
        }

        assert!(cache.get(&(0, 0)).is_none());
        assert!(cache.get(&(0, 9)).is_some());
        assert!(cache.memory_usage() <= 64);
        assert!(cache.stats().evictions > 0);
    }

    #[test]
    fn test_oversized_chunk_is_not_cached() {
        let mut cache = ChunkCache::new(16);
        cache.insert((0, 0), chunk(&[0.0; 8]));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_reinsert_does_not_leak_memory_accounting() {
        let mut cache = ChunkCache::new(1024);
        cache.insert((0, 0), chunk(&[0.0; 4]));
        cache.insert((0, 0), chunk(&[0.0; 4]));
        assert_eq!(cache.memory_usage(), 32);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_stats_and_clear() {
        let mut cache = ChunkCache::new(1024 * 1024);
        cache.insert((0, 0), chunk(&[1.0]));

        cache.get(&(0, 0));
        cache.get(&(0, 1));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.memory_usage(), 0);
    }

    #[test]
    fn test_hash_path() {
        assert_eq!(hash_path("dem.tif"), hash_path("dem.tif"));
        assert_ne!(hash_path("dem.tif"), hash_path("slope.tif"));
    }
}
