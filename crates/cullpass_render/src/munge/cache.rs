//! Munger-level result cache.
//!
//! Many draw units in a frame reference the same vertex data. The cache maps
//! a vertex-data allocation to its munged form so the conversion runs once.
//! Entries hold a `Weak` to their source: a dead source never matches and
//! is purged on a later insert.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use cullpass_shared::GeomVertexData;
use parking_lot::Mutex;

use super::strategy::MungedVertexData;
use crate::error::MungeResult;

/// Smallest entry count that triggers a sweep of dead entries.
const PURGE_THRESHOLD: usize = 256;

/// Extra key bits for state-dependent output (e.g. a baked color).
pub type CacheVariant = Option<[u32; 4]>;

type CacheKey = (usize, CacheVariant);

#[derive(Debug)]
struct CacheEntry {
    source: Weak<GeomVertexData>,
    munged: Arc<MungedVertexData>,
}

#[derive(Debug)]
struct Entries {
    map: HashMap<CacheKey, CacheEntry>,
    /// Size at which the next sweep runs. Doubles past the live count after
    /// each sweep so a cache full of live entries is not rescanned per insert.
    purge_at: usize,
    sweeps: u64,
}

impl Default for Entries {
    fn default() -> Self {
        Self {
            map: HashMap::new(),
            purge_at: PURGE_THRESHOLD,
            sweeps: 0,
        }
    }
}

impl Entries {
    fn insert(&mut self, key: CacheKey, entry: CacheEntry) {
        if self.map.len() >= self.purge_at {
            self.map.retain(|_, entry| entry.source.strong_count() > 0);
            self.purge_at = PURGE_THRESHOLD.max(self.map.len() * 2);
            self.sweeps += 1;
        }
        self.map.insert(key, entry);
    }
}

/// Hit and miss counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups served from the cache.
    pub hits: u64,
    /// Lookups that ran the conversion.
    pub misses: u64,
    /// Entries currently held.
    pub entries: usize,
    /// Sweeps for dead entries run so far.
    pub sweeps: u64,
}

/// Thread-safe cache of munged vertex data.
#[derive(Debug, Default)]
pub struct MungeCache {
    entries: Mutex<Entries>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MungeCache {
    /// Returns the cached result for `data`, or runs `convert` and caches it.
    ///
    /// The lock is not held while `convert` runs. Failures are not cached.
    ///
    /// # Errors
    ///
    /// Propagates the error from `convert`.
    pub fn get_or_insert_with(
        &self,
        data: &Arc<GeomVertexData>,
        variant: CacheVariant,
        convert: impl FnOnce() -> MungeResult<Arc<MungedVertexData>>,
    ) -> MungeResult<Arc<MungedVertexData>> {
        let key = (Arc::as_ptr(data) as usize, variant);
        if let Some(entry) = self.entries.lock().map.get(&key) {
            if entry.source.upgrade().is_some_and(|source| Arc::ptr_eq(&source, data)) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Arc::clone(&entry.munged));
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let munged = convert()?;
        self.entries.lock().insert(
            key,
            CacheEntry {
                source: Arc::downgrade(data),
                munged: Arc::clone(&munged),
            },
        );
        Ok(munged)
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.lock();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: entries.map.len(),
            sweeps: entries.sweeps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::munge::{Munger, StandardMunger};
    use cullpass_shared::{RenderState, Vec3};

    fn data() -> Arc<GeomVertexData> {
        Arc::new(GeomVertexData::from_points(vec![Vec3::ZERO]))
    }

    fn munged(source: &Arc<GeomVertexData>) -> Arc<MungedVertexData> {
        StandardMunger::new()
            .munge_data(source, &RenderState::new())
            .unwrap()
    }

    #[test]
    fn test_hit_after_miss() {
        let cache = MungeCache::default();
        let source = data();
        let first = cache
            .get_or_insert_with(&source, None, || Ok(munged(&source)))
            .unwrap();
        let second = cache
            .get_or_insert_with(&source, None, || panic!("converted twice"))
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 1,
                misses: 1,
                entries: 1,
                sweeps: 0
            }
        );
    }

    #[test]
    fn test_variants_are_separate_entries() {
        let cache = MungeCache::default();
        let source = data();
        cache
            .get_or_insert_with(&source, None, || Ok(munged(&source)))
            .unwrap();
        cache
            .get_or_insert_with(&source, Some([1, 2, 3, 4]), || Ok(munged(&source)))
            .unwrap();
        assert_eq!(cache.stats().misses, 2);
        assert_eq!(cache.stats().entries, 2);
    }

    #[test]
    fn test_errors_are_not_cached() {
        let cache = MungeCache::default();
        let source = data();
        let err = cache.get_or_insert_with(&source, None, || {
            Err(crate::error::MungeError::TooManyVertices { count: 2, limit: 1 })
        });
        assert!(err.is_err());
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn test_dead_sources_are_purged() {
        let cache = MungeCache::default();
        for _ in 0..PURGE_THRESHOLD {
            let source = data();
            cache
                .get_or_insert_with(&source, None, || Ok(munged(&source)))
                .unwrap();
        }
        let live = data();
        cache
            .get_or_insert_with(&live, None, || Ok(munged(&live)))
            .unwrap();
        assert_eq!(cache.stats().entries, 1);
    }

    #[test]
    fn test_live_entries_sweep_rarely() {
        let cache = MungeCache::default();
        let live: Vec<_> = (0..1_000).map(|_| data()).collect();
        for source in &live {
            cache
                .get_or_insert_with(source, None, || Ok(munged(source)))
                .unwrap();
        }

        // Thresholds 256, 512: two sweeps, not one per insert past 256.
        let stats = cache.stats();
        assert_eq!(stats.entries, 1_000);
        assert_eq!(stats.sweeps, 2);
    }
}
