//! # Vertex Data
//!
//! Column-oriented vertex storage. Each column is a named, typed array with
//! one entry per vertex row. Columns are addressed by [`InternalName`], e.g.
//! `vertex`, `normal`, `color`, `texcoord.detail`, `tangent.detail`.

use std::fmt;
use std::sync::Arc;

use glam::{Vec2, Vec3, Vec4};
use thiserror::Error;

/// Interned column name.
///
/// Cloning is a reference-count bump.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InternalName(Arc<str>);

impl InternalName {
    /// Creates a name from a string.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self(Arc::from(name))
    }

    /// Vertex positions.
    #[must_use]
    pub fn vertex() -> Self {
        Self::new("vertex")
    }

    /// Vertex normals.
    #[must_use]
    pub fn normal() -> Self {
        Self::new("normal")
    }

    /// Vertex colors.
    #[must_use]
    pub fn color() -> Self {
        Self::new("color")
    }

    /// The default texture-coordinate set.
    #[must_use]
    pub fn texcoord() -> Self {
        Self::new("texcoord")
    }

    /// A named texture-coordinate set, `texcoord.<name>`.
    #[must_use]
    pub fn texcoord_named(name: &str) -> Self {
        Self::new(&format!("texcoord.{name}"))
    }

    /// Per-point size.
    #[must_use]
    pub fn size() -> Self {
        Self::new("size")
    }

    /// Per-point rotation in degrees.
    #[must_use]
    pub fn rotate() -> Self {
        Self::new("rotate")
    }

    /// Per-point width/height ratio.
    #[must_use]
    pub fn aspect_ratio() -> Self {
        Self::new("aspect_ratio")
    }

    /// Tangent column that pairs with the texcoord set `source`.
    #[must_use]
    pub fn tangent_name(source: &Self) -> Self {
        source.derived("tangent")
    }

    /// Binormal column that pairs with the texcoord set `source`.
    #[must_use]
    pub fn binormal_name(source: &Self) -> Self {
        source.derived("binormal")
    }

    /// Returns the name as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Swaps the `texcoord` prefix of a texcoord-set name for `prefix`.
    fn derived(&self, prefix: &str) -> Self {
        match self.as_str() {
            "texcoord" => Self::new(prefix),
            name => {
                let suffix = name.strip_prefix("texcoord.").unwrap_or(name);
                Self::new(&format!("{prefix}.{suffix}"))
            }
        }
    }
}

impl fmt::Debug for InternalName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for InternalName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a column's values mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Contents {
    /// Model-space position.
    Point,
    /// Homogeneous clip-space position; already projected.
    ClipPoint,
    /// A direction (normal, tangent, binormal, light vector).
    Vector,
    /// An RGBA color.
    Color,
    /// A texture coordinate.
    TexCoord,
    /// Anything else (size, rotation, user data).
    Other,
}

/// How vertices are animated before rasterization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum AnimationType {
    /// Static vertices.
    #[default]
    None,
    /// Vertices are animated on the CPU before upload.
    Cpu,
    /// Vertices are animated by the device.
    Hardware,
}

/// Typed storage for one column.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    /// One float per row.
    Float1(Vec<f32>),
    /// Two floats per row.
    Float2(Vec<Vec2>),
    /// Three floats per row.
    Float3(Vec<Vec3>),
    /// Four floats per row.
    Float4(Vec<Vec4>),
}

impl ColumnData {
    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Float1(v) => v.len(),
            Self::Float2(v) => v.len(),
            Self::Float3(v) => v.len(),
            Self::Float4(v) => v.len(),
        }
    }

    /// True if the column has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Components per row.
    #[must_use]
    pub const fn num_components(&self) -> usize {
        match self {
            Self::Float1(_) => 1,
            Self::Float2(_) => 2,
            Self::Float3(_) => 3,
            Self::Float4(_) => 4,
        }
    }

    /// Reads a row widened to four components.
    ///
    /// Missing components are filled from `fill` (use `w = 1` for points and
    /// colors, `w = 0` for vectors).
    #[must_use]
    pub fn get4(&self, row: usize, fill: Vec4) -> Option<Vec4> {
        Some(match self {
            Self::Float1(v) => Vec4::new(*v.get(row)?, fill.y, fill.z, fill.w),
            Self::Float2(v) => v.get(row)?.extend(fill.z).extend(fill.w),
            Self::Float3(v) => v.get(row)?.extend(fill.w),
            Self::Float4(v) => *v.get(row)?,
        })
    }

    /// Reads the first three components of a row.
    #[must_use]
    pub fn get3(&self, row: usize) -> Option<Vec3> {
        self.get4(row, Vec4::ZERO).map(Vec4::truncate)
    }

    /// Reads the first component of a row.
    #[must_use]
    pub fn get1(&self, row: usize) -> Option<f32> {
        self.get4(row, Vec4::ZERO).map(|v| v.x)
    }
}

/// A named column of vertex data.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexColumn {
    /// Column name.
    pub name: InternalName,
    /// Meaning of the values.
    pub contents: Contents,
    /// The values.
    pub data: ColumnData,
}

/// Malformed vertex data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VertexDataError {
    /// The `vertex` column is absent.
    #[error("vertex data has no `vertex` column")]
    MissingVertexColumn,

    /// A column's row count differs from the `vertex` column's.
    #[error("column `{name}` has {found} rows, expected {expected}")]
    RaggedColumn {
        /// Offending column.
        name: InternalName,
        /// Row count of the `vertex` column.
        expected: usize,
        /// Row count of the offending column.
        found: usize,
    },
}

/// An immutable table of vertex columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeomVertexData {
    columns: Vec<VertexColumn>,
    animation: AnimationType,
}

impl GeomVertexData {
    /// Creates empty vertex data.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates vertex data holding only positions.
    #[must_use]
    pub fn from_points(points: Vec<Vec3>) -> Self {
        Self::new().with_column(
            InternalName::vertex(),
            Contents::Point,
            ColumnData::Float3(points),
        )
    }

    /// Adds or replaces a column (builder style).
    #[must_use]
    pub fn with_column(mut self, name: InternalName, contents: Contents, data: ColumnData) -> Self {
        self.put_column(VertexColumn {
            name,
            contents,
            data,
        });
        self
    }

    /// Sets the animation type (builder style).
    #[must_use]
    pub fn with_animation(mut self, animation: AnimationType) -> Self {
        self.animation = animation;
        self
    }

    /// Returns a copy with `name` added or replaced.
    ///
    /// The receiver is left untouched; callers holding it through an `Arc`
    /// keep seeing the original columns.
    #[must_use]
    pub fn replace_column(&self, name: InternalName, contents: Contents, data: ColumnData) -> Self {
        self.clone().with_column(name, contents, data)
    }

    /// Number of rows, taken from the `vertex` column.
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.column(&InternalName::vertex())
            .map_or(0, |c| c.data.len())
    }

    /// All columns in insertion order.
    #[must_use]
    pub fn columns(&self) -> &[VertexColumn] {
        &self.columns
    }

    /// Looks up a column by name.
    #[must_use]
    pub fn column(&self, name: &InternalName) -> Option<&VertexColumn> {
        self.columns.iter().find(|c| &c.name == name)
    }

    /// True if a column named `name` exists.
    #[must_use]
    pub fn has_column(&self, name: &InternalName) -> bool {
        self.column(name).is_some()
    }

    /// The animation type.
    #[must_use]
    pub const fn animation(&self) -> AnimationType {
        self.animation
    }

    /// True if the vertices are animated at all.
    #[must_use]
    pub fn is_animated(&self) -> bool {
        self.animation != AnimationType::None
    }

    /// Checks that a `vertex` column exists and every column has the same
    /// number of rows.
    ///
    /// # Errors
    ///
    /// Returns the first inconsistency found.
    pub fn validate(&self) -> Result<(), VertexDataError> {
        let expected = self
            .column(&InternalName::vertex())
            .ok_or(VertexDataError::MissingVertexColumn)?
            .data
            .len();
        for column in &self.columns {
            let found = column.data.len();
            if found != expected {
                return Err(VertexDataError::RaggedColumn {
                    name: column.name.clone(),
                    expected,
                    found,
                });
            }
        }
        Ok(())
    }

    fn put_column(&mut self, column: VertexColumn) {
        if let Some(existing) = self.columns.iter_mut().find(|c| c.name == column.name) {
            *existing = column;
        } else {
            self.columns.push(column);
        }
    }
}
