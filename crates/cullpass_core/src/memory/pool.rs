//! # Free-List Pool
//!
//! Fixed-size block recycler for objects that are frequently allocated and freed.

/// Allocation statistics for a [`FreeList`].
///
/// All counters are monotonic except `free_blocks`, which reports the
/// current length of the free list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Blocks obtained from the global allocator.
    pub fresh_allocations: u64,
    /// Acquisitions satisfied from the free list.
    pub reuses: u64,
    /// Blocks pushed back onto the free list.
    pub releases: u64,
    /// Blocks currently waiting on the free list.
    pub free_blocks: usize,
}

impl PoolStats {
    /// Total number of successful acquisitions.
    #[inline]
    #[must_use]
    pub const fn acquisitions(&self) -> u64 {
        self.fresh_allocations + self.reuses
    }

    /// Number of blocks handed out and not yet released.
    #[inline]
    #[must_use]
    pub const fn live_blocks(&self) -> u64 {
        self.acquisitions() - self.releases
    }
}

/// A free-list recycler for boxed objects of one fixed type.
///
/// Every block is a `Box<T>`, so all blocks have the same size and a
/// released block can hold any later value. Acquiring pops a released block
/// and overwrites it; only an empty list falls through to the global
/// allocator. Releasing never frees memory.
///
/// Released blocks hold `T::default()` while they wait, so the previous
/// value's resources are dropped at release time.
///
/// # Thread Safety
///
/// This pool is NOT thread-safe. Use one pool per thread (see the
/// `thread_local!` unit pool in `cullpass_render`).
///
/// # Example
///
/// ```rust
/// use cullpass_core::FreeList;
///
/// let mut pool: FreeList<Vec<u32>> = FreeList::new();
///
/// let block = pool.acquire(vec![1, 2, 3]);
/// let retired = pool.release(block);
/// assert_eq!(retired, vec![1, 2, 3]);
///
/// // Reuses the block released above.
/// let _block = pool.acquire(vec![4]);
/// assert_eq!(pool.stats().reuses, 1);
/// ```
#[derive(Debug)]
pub struct FreeList<T: Default> {
    /// Released blocks, most recently released last.
    free: Vec<Box<T>>,
    /// Allocation counters.
    stats: PoolStats,
}

impl<T: Default> FreeList<T> {
    /// Creates an empty pool. No blocks are allocated until first use.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            free: Vec::new(),
            stats: PoolStats {
                fresh_allocations: 0,
                reuses: 0,
                releases: 0,
                free_blocks: 0,
            },
        }
    }

    /// Creates a pool with `count` blocks already on the free list.
    #[must_use]
    pub fn with_reserve(count: usize) -> Self {
        let mut pool = Self::new();
        pool.reserve(count);
        pool
    }

    /// Pre-allocates blocks until at least `count` are free.
    ///
    /// Reserved blocks count as fresh allocations.
    pub fn reserve(&mut self, count: usize) {
        let missing = count.saturating_sub(self.free.len());
        self.free.reserve(missing);
        for _ in 0..missing {
            self.free.push(Box::<T>::default());
            self.stats.fresh_allocations += 1;
        }
    }

    /// Stores `value` in a pooled block.
    ///
    /// This is **O(1)**. It touches the global allocator only when the free
    /// list is empty.
    pub fn acquire(&mut self, value: T) -> Box<T> {
        if let Some(mut block) = self.free.pop() {
            *block = value;
            self.stats.reuses += 1;
            block
        } else {
            self.stats.fresh_allocations += 1;
            Box::new(value)
        }
    }

    /// Returns a block to the free list and hands back its previous value.
    ///
    /// The value is returned rather than dropped here so callers holding a
    /// borrow of the pool can drop it after the borrow ends. Dropping it may
    /// release further blocks into this same pool.
    pub fn release(&mut self, mut block: Box<T>) -> T {
        let retired = std::mem::take(&mut *block);
        self.free.push(block);
        self.stats.releases += 1;
        retired
    }

    /// Returns the number of blocks on the free list.
    #[inline]
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Returns a snapshot of the allocation counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            free_blocks: self.free.len(),
            ..self.stats
        }
    }
}

impl<T: Default> Default for FreeList<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_pool_acquire_release() {
        let mut pool: FreeList<u32> = FreeList::new();

        let block = pool.acquire(42);
        assert_eq!(*block, 42);
        assert_eq!(pool.stats().fresh_allocations, 1);
        assert_eq!(pool.stats().live_blocks(), 1);

        let retired = pool.release(block);
        assert_eq!(retired, 42);
        assert_eq!(pool.free_count(), 1);
        assert_eq!(pool.stats().live_blocks(), 0);
    }

    #[test]
    fn test_pool_reuse() {
        let mut pool: FreeList<u64> = FreeList::new();

        let first = pool.acquire(1);
        let first_addr = std::ptr::addr_of!(*first) as usize;
        let _ = pool.release(first);

        let second = pool.acquire(2);
        assert_eq!(std::ptr::addr_of!(*second) as usize, first_addr); // Same block reused
        assert_eq!(*second, 2);
        assert_eq!(pool.stats().fresh_allocations, 1);
        assert_eq!(pool.stats().reuses, 1);
    }

    #[test]
    fn test_fresh_allocations_track_only_new_blocks() {
        let mut pool: FreeList<u32> = FreeList::new();
        let mut held = Vec::new();
        let mut last_fresh = 0;

        // Grow to 8 live blocks, shrink to 3, grow to 10.
        for target in [8usize, 3, 10, 0, 10] {
            while held.len() < target {
                held.push(pool.acquire(7));
            }
            while held.len() > target {
                let block = held.pop().unwrap();
                let _ = pool.release(block);
            }
            let fresh = pool.stats().fresh_allocations;
            assert!(fresh >= last_fresh);
            last_fresh = fresh;
        }

        // Peak live count was 10, so exactly 10 blocks ever came from the allocator.
        assert_eq!(pool.stats().fresh_allocations, 10);
        assert_eq!(pool.stats().acquisitions(), 8 + 7 + 10);
    }

    #[test]
    fn test_cycles_do_not_grow() {
        let mut pool: FreeList<[u8; 64]> = FreeList::new();

        for _ in 0..1_000 {
            let block = pool.acquire([0; 64]);
            let _ = pool.release(block);
        }

        assert_eq!(pool.stats().fresh_allocations, 1);
        assert_eq!(pool.stats().reuses, 999);
        assert_eq!(pool.free_count(), 1);
    }

    #[test]
    fn test_release_drops_resources() {
        let mut pool: FreeList<Option<Arc<String>>> = FreeList::new();
        let shared = Arc::new(String::from("geometry"));

        let block = pool.acquire(Some(Arc::clone(&shared)));
        assert_eq!(Arc::strong_count(&shared), 2);

        drop(pool.release(block));
        assert_eq!(Arc::strong_count(&shared), 1);
    }

    #[test]
    fn test_reserve() {
        let mut pool: FreeList<u32> = FreeList::with_reserve(16);
        assert_eq!(pool.free_count(), 16);
        assert_eq!(pool.stats().fresh_allocations, 16);

        let block = pool.acquire(3);
        assert_eq!(pool.stats().fresh_allocations, 16);
        assert_eq!(pool.stats().reuses, 1);
        let _ = pool.release(block);

        // Already satisfied.
        pool.reserve(4);
        assert_eq!(pool.stats().fresh_allocations, 16);
    }
}
