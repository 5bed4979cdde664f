//! # CULLPASS Core
//!
//! Memory primitives for the per-frame cull pass:
//! - Fixed-size free-list recycling of boxed blocks
//! - Allocation telemetry that never goes backwards
//!
//! ## Architecture Rules
//!
//! 1. **No general-purpose allocation in steady state** - released blocks are reused
//! 2. **One pool per thread** - pools are not synchronized
//! 3. **No teardown** - blocks live as long as the pool that owns them
//!
//! ## Example
//!
//! ```rust
//! use cullpass_core::FreeList;
//!
//! let mut pool: FreeList<[f32; 16]> = FreeList::new();
//! let block = pool.acquire([0.0; 16]);
//! let _old = pool.release(block);
//! let again = pool.acquire([1.0; 16]);
//! assert_eq!(pool.stats().fresh_allocations, 1);
//! assert_eq!(again[0], 1.0);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod memory;

pub use memory::{FreeList, PoolStats};
