//! Bounded catalog cache with LRU eviction
//!
//! One cache is meant to be shared by every session in the process so that
//! replaying the same content skips the catalog lookup. All access goes
//! through a single mutex; entries are immutable `Arc<Catalog>` values.

use crate::types::{Catalog, ContentId};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::debug;

/// Default number of catalogs kept in memory
pub const DEFAULT_CAPACITY: usize = 20;

/// Cache counters for monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct Inner {
    entries: LruCache<ContentId, Arc<Catalog>>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// Catalog cache keyed by content identifier
pub struct ManifestCache {
    inner: Mutex<Inner>,
}

impl ManifestCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
        }
    }

    /// Cache holding up to `capacity` catalogs; zero is raised to one
    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN))
    }

    /// Look up a catalog, marking it most recently used on hit
    pub fn get(&self, id: &ContentId) -> Option<Arc<Catalog>> {
        let mut inner = self.inner.lock();
        match inner.entries.get(id).cloned() {
            Some(catalog) => {
                inner.hits += 1;
                debug!(content_id = %id, "Catalog cache hit");
                Some(catalog)
            }
            None => {
                inner.misses += 1;
                debug!(content_id = %id, "Catalog cache miss");
                None
            }
        }
    }

    /// Insert or replace a catalog, evicting the least recently used entry
    /// when the cache is over capacity
    pub fn put(&self, id: ContentId, catalog: impl Into<Arc<Catalog>>) -> Arc<Catalog> {
        let catalog = catalog.into();
        let mut inner = self.inner.lock();
        if let Some((evicted, _)) = inner.entries.push(id.clone(), catalog.clone()) {
            // push hands back the old value when the key was already present
            if evicted != id {
                inner.evictions += 1;
                debug!(evicted = %evicted, inserted = %id, "Catalog evicted");
            }
        }
        catalog
    }

    /// Presence check that leaves recency untouched
    pub fn contains(&self, id: &ContentId) -> bool {
        self.inner.lock().entries.contains(id)
    }

    pub fn remove(&self, id: &ContentId) -> Option<Arc<Catalog>> {
        self.inner.lock().entries.pop(id)
    }

    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().entries.cap().get()
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            entries: inner.entries.len(),
            capacity: inner.entries.cap().get(),
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
        }
    }
}

impl Default for ManifestCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl std::fmt::Debug for ManifestCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("ManifestCache")
            .field("entries", &stats.entries)
            .field("capacity", &stats.capacity)
            .finish_non_exhaustive()
    }
}
