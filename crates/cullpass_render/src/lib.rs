//! # CULLPASS Render
//!
//! The cull-pass draw unit: one visible geometry batch with its render state
//! and transforms, chained to the decals stacked on it, munged once for the
//! active device and then dispatched.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       CULL PASS                              │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Traversal → DrawUnit::from_node → (PooledUnit decal chain)  │
//! │       ↓                                                      │
//! │  munge_geom: points→quads · light vectors · Munger (cached)  │
//! │       ↓                                                      │
//! │  draw / draw_with_decals → GraphicsDevice                    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Mandate
//!
//! - No general-purpose allocation per unit once the pool is warm
//! - Munging failures never abort the frame
//! - Shared value objects are never mutated
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use cullpass_render::{
//!     DeviceCapabilities, DrawUnit, DrawableNode, GraphicsDevice, HeadlessDevice,
//!     TraversalContext, draw_with_decals,
//! };
//! use cullpass_shared::{GeomVertexData, Geometry, PrimitiveType, RenderState, Vec3};
//!
//! let points = GeomVertexData::from_points(vec![Vec3::new(0.0, 0.0, -4.0)]);
//! let node = DrawableNode::new("sparks").with_geom(
//!     Arc::new(Geometry::new(PrimitiveType::Points, Arc::new(points))),
//!     Arc::new(RenderState::new()),
//! );
//!
//! let ctx = TraversalContext::default();
//! let mut device = HeadlessDevice::new(DeviceCapabilities::triangles_only());
//! let munger = device.munger();
//!
//! let mut unit = DrawUnit::from_node(&ctx, &node, 0, None);
//! unit.munge_geom(&device, &munger, &ctx);
//! assert_eq!(draw_with_decals(&unit, &mut device), 1);
//! assert_eq!(device.draws()[0].geometry.primitive(), PrimitiveType::Triangles);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod munge;
pub mod traverse;
pub mod unit;

pub use config::{ConfigError, ConfigResult, CullConfig};
pub use device::{
    DecalPhase, DeviceCapabilities, DrawCall, DrawRecord, GraphicsDevice, HeadlessDevice,
};
pub use dispatch::draw_with_decals;
pub use error::{FailureClass, MungeError, MungeResult};
pub use munge::{
    flash_cpu_state, flash_hardware_state, flash_state, sort_back_to_front, CacheStats,
    ColorOrder, MungedVertexData, Munger, PackedColorMunger, PointData, StandardMunger,
    VertexLayout,
};
pub use traverse::{DrawableNode, SceneSetup, TraversalContext};
pub use unit::{reserve_unit_pool, unit_pool_stats, warm_unit_pool, DrawUnit, PooledUnit};
