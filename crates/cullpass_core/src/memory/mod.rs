//! # Memory Management
//!
//! Free-list pools for objects that are created and destroyed many times
//! per frame.
//!
//! ## Design Philosophy
//!
//! Blocks are allocated from the global allocator only when the free list
//! is empty. After warm-up a frame performs:
//! - No heap allocations for pooled objects
//! - No heap deallocations for pooled objects
//! - Predictable, flat latency
//!
//! Released blocks are never handed back to the global allocator. A pool
//! grows to the peak number of simultaneously live objects and stays there
//! until it is dropped. This trades memory for time and is not a leak.

mod pool;

pub use pool::{FreeList, PoolStats};
