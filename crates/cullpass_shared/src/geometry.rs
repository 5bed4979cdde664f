//! # Geometry
//!
//! A geometry batch: vertex data plus the primitive topology that connects
//! it, and the rendering-feature bits a batch needs from a device.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;

use crate::vertex::{GeomVertexData, InternalName};

bitflags! {
    /// Rendering features a geometry batch requires.
    ///
    /// Geometry and render state each contribute bits; a device advertises
    /// the bits it supports. Any required-but-unsupported bit has to be
    /// emulated on the CPU by the munging pipeline.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct GeomRendering: u32 {
        /// The primitive is a list of points.
        const POINT = 1 << 0;
        /// Points take their size from a per-vertex `size` column.
        const PER_POINT_SIZE = 1 << 1;
        /// Points are thicker than one pixel.
        const POINT_UNIFORM_SIZE = 1 << 2;
        /// Point size is in world units and shrinks with distance.
        const POINT_PERSPECTIVE = 1 << 3;
        /// Points have a per-vertex width/height ratio.
        const POINT_ASPECT_RATIO = 1 << 4;
        /// Points have a per-vertex rotation.
        const POINT_ROTATE = 1 << 5;
        /// Points carry generated sprite texture coordinates.
        const POINT_SPRITE = 1 << 6;
        /// A texture stage wants a per-vertex tangent-space light vector.
        const TEXCOORD_LIGHT_VECTOR = 1 << 7;

        /// Every point feature that can force CPU quad expansion.
        const POINT_BITS = Self::POINT.bits()
            | Self::PER_POINT_SIZE.bits()
            | Self::POINT_UNIFORM_SIZE.bits()
            | Self::POINT_PERSPECTIVE.bits()
            | Self::POINT_ASPECT_RATIO.bits()
            | Self::POINT_ROTATE.bits()
            | Self::POINT_SPRITE.bits();
    }
}

/// Primitive topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    /// Independent points.
    Points,
    /// Independent line segments.
    Lines,
    /// Connected line strip.
    LineStrip,
    /// Independent triangles.
    Triangles,
    /// Connected triangle strip.
    TriangleStrip,
    /// Triangle fan around the first vertex.
    TriangleFan,
}

impl PrimitiveType {
    /// Vertices consumed per primitive for list topologies.
    #[must_use]
    pub const fn vertices_per_primitive(self) -> Option<usize> {
        match self {
            Self::Points => Some(1),
            Self::Lines => Some(2),
            Self::Triangles => Some(3),
            Self::LineStrip | Self::TriangleStrip | Self::TriangleFan => None,
        }
    }

    /// Lower-case name for diagnostics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Points => "points",
            Self::Lines => "lines",
            Self::LineStrip => "line strip",
            Self::Triangles => "triangles",
            Self::TriangleStrip => "triangle strip",
            Self::TriangleFan => "triangle fan",
        }
    }
}

/// An immutable geometry batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    primitive: PrimitiveType,
    vertex_data: Arc<GeomVertexData>,
    indices: Option<Vec<u32>>,
}

impl Geometry {
    /// Creates unindexed geometry: every row is used once, in order.
    #[must_use]
    pub fn new(primitive: PrimitiveType, vertex_data: Arc<GeomVertexData>) -> Self {
        Self {
            primitive,
            vertex_data,
            indices: None,
        }
    }

    /// Sets the vertex index list (builder style).
    #[must_use]
    pub fn with_indices(mut self, indices: Vec<u32>) -> Self {
        self.indices = Some(indices);
        self
    }

    /// Returns a copy that draws the same primitive over different vertex data.
    #[must_use]
    pub fn replace_vertex_data(&self, vertex_data: Arc<GeomVertexData>) -> Self {
        Self {
            primitive: self.primitive,
            vertex_data,
            indices: self.indices.clone(),
        }
    }

    /// The topology.
    #[inline]
    #[must_use]
    pub const fn primitive(&self) -> PrimitiveType {
        self.primitive
    }

    /// The vertex data.
    #[inline]
    #[must_use]
    pub fn vertex_data(&self) -> &Arc<GeomVertexData> {
        &self.vertex_data
    }

    /// The explicit index list, if any.
    #[must_use]
    pub fn indices(&self) -> Option<&[u32]> {
        self.indices.as_deref()
    }

    /// The rows referenced by the primitive, in primitive order.
    #[must_use]
    pub fn vertex_list(&self) -> Cow<'_, [u32]> {
        match &self.indices {
            Some(indices) => Cow::Borrowed(indices),
            None => {
                let rows = u32::try_from(self.vertex_data.num_rows()).unwrap_or(u32::MAX);
                Cow::Owned((0..rows).collect())
            }
        }
    }

    /// Number of vertex references made by the primitive.
    #[must_use]
    pub fn num_vertices(&self) -> usize {
        self.indices
            .as_ref()
            .map_or_else(|| self.vertex_data.num_rows(), Vec::len)
    }

    /// Number of whole primitives.
    #[must_use]
    pub fn num_primitives(&self) -> usize {
        let n = self.num_vertices();
        match self.primitive {
            PrimitiveType::LineStrip => n.saturating_sub(1),
            PrimitiveType::TriangleStrip | PrimitiveType::TriangleFan => n.saturating_sub(2),
            list => list.vertices_per_primitive().map_or(0, |per| n / per),
        }
    }

    /// Rendering bits implied by the geometry alone.
    #[must_use]
    pub fn geom_rendering(&self) -> GeomRendering {
        let mut bits = GeomRendering::empty();
        if self.primitive == PrimitiveType::Points {
            bits |= GeomRendering::POINT;
            let data = &self.vertex_data;
            if data.has_column(&InternalName::size()) {
                bits |= GeomRendering::PER_POINT_SIZE;
            }
            if data.has_column(&InternalName::aspect_ratio()) {
                bits |= GeomRendering::POINT_ASPECT_RATIO;
            }
            if data.has_column(&InternalName::rotate()) {
                bits |= GeomRendering::POINT_ROTATE;
            }
        }
        bits
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} primitives, {} vertices",
            self.primitive.name(),
            self.num_primitives(),
            self.num_vertices()
        )
    }
}
