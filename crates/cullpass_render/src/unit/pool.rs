//! Thread-local draw-unit pool.
//!
//! Each cull thread recycles unit blocks through its own [`FreeList`], so no
//! lock is taken on the hot path. Blocks live as long as the thread.

use std::cell::RefCell;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::Ordering;

use cullpass_core::{FreeList, PoolStats};

use super::{DrawUnit, UNITS_EVER_ALLOCATED};
use crate::config::CullConfig;

thread_local! {
    static UNIT_POOL: RefCell<FreeList<DrawUnit>> = const { RefCell::new(FreeList::new()) };
}

/// Runs `f` on this thread's pool and publishes any fresh allocations it made.
fn with_pool<R>(f: impl FnOnce(&mut FreeList<DrawUnit>) -> R) -> R {
    UNIT_POOL.with(|pool| {
        let mut pool = pool.borrow_mut();
        let before = pool.stats().fresh_allocations;
        let result = f(&mut *pool);
        let fresh = pool.stats().fresh_allocations - before;
        if fresh > 0 {
            UNITS_EVER_ALLOCATED.fetch_add(fresh, Ordering::Relaxed);
        }
        result
    })
}

/// A draw unit living in a block of the calling thread's pool.
///
/// Dropping it drops the unit (and the chain it owns) first, then hands the
/// empty block back to the pool.
pub struct PooledUnit(Option<Box<DrawUnit>>);

impl PooledUnit {
    /// Moves `unit` into a pooled block.
    #[must_use]
    pub fn new(unit: DrawUnit) -> Self {
        Self(Some(with_pool(|pool| pool.acquire(unit))))
    }

    /// Moves the unit back out; the block returns to the pool.
    #[must_use]
    pub fn into_inner(mut self) -> DrawUnit {
        self.0
            .as_deref_mut()
            .map(std::mem::take)
            .unwrap_or_default()
    }
}

impl Deref for PooledUnit {
    type Target = DrawUnit;

    fn deref(&self) -> &DrawUnit {
        // Only `drop` empties the slot.
        self.0
            .as_deref()
            .unwrap_or_else(|| unreachable!("pooled unit used after release"))
    }
}

impl DerefMut for PooledUnit {
    fn deref_mut(&mut self) -> &mut DrawUnit {
        self.0
            .as_deref_mut()
            .unwrap_or_else(|| unreachable!("pooled unit used after release"))
    }
}

impl Drop for PooledUnit {
    fn drop(&mut self) {
        let Some(mut block) = self.0.take() else {
            return;
        };
        // The unit may own further pooled units; drop it outside any borrow.
        drop(std::mem::take(&mut *block));
        // During thread teardown the pool may already be gone; then the
        // block is simply freed.
        let _ = UNIT_POOL.try_with(|pool| {
            if let Ok(mut pool) = pool.try_borrow_mut() {
                drop(pool.release(block));
            }
        });
    }
}

impl fmt::Debug for PooledUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(unit) => fmt::Debug::fmt(unit, f),
            None => f.write_str("PooledUnit(released)"),
        }
    }
}

impl fmt::Display for PooledUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(unit) => fmt::Display::fmt(unit, f),
            None => f.write_str("(released)"),
        }
    }
}

/// Statistics for the calling thread's unit pool.
#[must_use]
pub fn unit_pool_stats() -> PoolStats {
    UNIT_POOL.with(|pool| pool.borrow().stats())
}

/// Pre-allocates `count` unit blocks in the calling thread's pool.
pub fn reserve_unit_pool(count: usize) {
    with_pool(|pool| pool.reserve(count));
    tracing::debug!(count, "reserved draw-unit blocks");
}

/// Tops the calling thread's free list up to `config.unit_pool_reserve`
/// blocks. Call once when a cull thread starts.
pub fn warm_unit_pool(config: &CullConfig) {
    let free = unit_pool_stats().free_blocks;
    if let Some(missing) = config.unit_pool_reserve.checked_sub(free).filter(|&n| n > 0) {
        reserve_unit_pool(missing);
    }
}
