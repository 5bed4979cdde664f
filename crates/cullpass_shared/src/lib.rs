//! # CULLPASS Shared
//!
//! Immutable scene value objects consumed by the cull pass.
//!
//! Traversal builds these once, wraps them in `Arc`, and hands the same
//! references to every draw unit that needs them. Nothing here is mutated
//! after construction: "modifying" operations such as
//! [`RenderState::compose`] or [`GeomVertexData::replace_column`] return new
//! values.
//!
//! ## CRITICAL RULE
//!
//! This crate must NEVER depend on a graphics API. Device-facing types live
//! in `cullpass_render`.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod geometry;
pub mod state;
pub mod transform;
pub mod vertex;

pub use geometry::{GeomRendering, Geometry, PrimitiveType};
pub use state::{
    ColorAttrib, Light, LightKind, RenderMode, RenderState, TexGenEntry, TexGenMode, TextureStage,
    TransparencyMode,
};
pub use transform::{CoordinateSystem, TransformState};
pub use vertex::{
    AnimationType, ColumnData, Contents, GeomVertexData, InternalName, VertexColumn,
    VertexDataError,
};

/// Re-exported math types so downstream crates agree on one `glam` version.
pub use glam::{Mat4, Vec2, Vec3, Vec4};
