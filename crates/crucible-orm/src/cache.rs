//! Translation result cache.
//!
//! Entries are keyed by a caller-supplied string plus a structural digest.
//! The translator only reads and inserts; eviction and invalidation belong to
//! the cache implementation.

use crate::ir::StructuralHash;
use crate::translator::Translation;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Key of a cached translation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub key: String,
    pub structure: StructuralHash,
}

impl CacheKey {
    pub fn new(key: impl Into<String>, structure: StructuralHash) -> Self {
        Self {
            key: key.into(),
            structure,
        }
    }
}

/// Storage for translated trees and their parameter maps.
pub trait TranslationCache: Send + Sync {
    fn get(&self, key: &CacheKey) -> Option<Arc<Translation>>;

    fn insert(&self, key: CacheKey, translation: Arc<Translation>);
}

/// Statistics about cache lookups
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    /// Hit ratio (0.0 to 1.0)
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Unbounded in-process cache.
///
/// Share across threads by wrapping in `Arc`.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<CacheKey, Arc<Translation>>>,
    stats: RwLock<CacheStats>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        *self.stats.read()
    }
}

impl TranslationCache for MemoryCache {
    fn get(&self, key: &CacheKey) -> Option<Arc<Translation>> {
        let found = self.entries.read().get(key).cloned();
        let mut stats = self.stats.write();
        if found.is_some() {
            stats.hits += 1;
            tracing::debug!(key = %key.key, structure = %key.structure, "translation cache hit");
        } else {
            stats.misses += 1;
            tracing::debug!(key = %key.key, structure = %key.structure, "translation cache miss");
        }
        found
    }

    fn insert(&self, key: CacheKey, translation: Arc<Translation>) {
        self.entries.write().insert(key, translation);
    }
}
