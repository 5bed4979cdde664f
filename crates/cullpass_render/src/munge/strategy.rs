//! # Munging Strategies
//!
//! A [`Munger`] converts column-oriented vertex data into the interleaved
//! byte layout a particular device consumes. Devices hand out their munger
//! as an `Arc<dyn Munger>`; every draw unit munged for that device shares it.

use std::fmt;
use std::sync::Arc;

use cullpass_shared::{
    AnimationType, Contents, GeomVertexData, InternalName, RenderState, Vec4,
    VertexColumn,
};

use super::cache::{CacheStats, MungeCache};
use crate::error::{MungeError, MungeResult};

// =============================================================================
// VERTEX LAYOUT
// =============================================================================

/// Encoding of one interleaved attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeFormat {
    /// One `f32`.
    Float32,
    /// Two `f32`s.
    Float32x2,
    /// Three `f32`s.
    Float32x3,
    /// Four `f32`s.
    Float32x4,
    /// Four normalized bytes in R, G, B, A order.
    Unorm8x4Rgba,
    /// Four normalized bytes in B, G, R, A order.
    Unorm8x4Bgra,
}

impl AttributeFormat {
    /// Bytes per row.
    #[must_use]
    pub const fn size(self) -> usize {
        match self {
            Self::Float32 | Self::Unorm8x4Rgba | Self::Unorm8x4Bgra => 4,
            Self::Float32x2 => 8,
            Self::Float32x3 => 12,
            Self::Float32x4 => 16,
        }
    }

    /// The float format holding `components` values.
    #[must_use]
    pub const fn float(components: usize) -> Self {
        match components {
            1 => Self::Float32,
            2 => Self::Float32x2,
            3 => Self::Float32x3,
            _ => Self::Float32x4,
        }
    }

    const fn label(self) -> &'static str {
        match self {
            Self::Float32 => "f32",
            Self::Float32x2 => "f32x2",
            Self::Float32x3 => "f32x3",
            Self::Float32x4 => "f32x4",
            Self::Unorm8x4Rgba => "rgba8",
            Self::Unorm8x4Bgra => "bgra8",
        }
    }
}

/// One attribute inside an interleaved vertex.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexAttribute {
    /// Source column name.
    pub name: InternalName,
    /// Meaning of the values.
    pub contents: Contents,
    /// Encoding.
    pub format: AttributeFormat,
    /// Byte offset within a vertex.
    pub offset: usize,
}

/// Interleaved vertex layout.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VertexLayout {
    attributes: Vec<VertexAttribute>,
    stride: usize,
}

impl VertexLayout {
    /// Appends an attribute after the existing ones.
    pub fn push(&mut self, name: InternalName, contents: Contents, format: AttributeFormat) {
        self.attributes.push(VertexAttribute {
            name,
            contents,
            format,
            offset: self.stride,
        });
        self.stride += format.size();
    }

    /// Attributes in vertex order.
    #[must_use]
    pub fn attributes(&self) -> &[VertexAttribute] {
        &self.attributes
    }

    /// Looks up an attribute by column name.
    #[must_use]
    pub fn attribute(&self, name: &InternalName) -> Option<&VertexAttribute> {
        self.attributes.iter().find(|a| &a.name == name)
    }

    /// Bytes per vertex.
    #[inline]
    #[must_use]
    pub const fn stride(&self) -> usize {
        self.stride
    }
}

impl fmt::Display for VertexLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, attr) in self.attributes.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}:{}", attr.name, attr.format.label())?;
        }
        write!(f, "]/{}", self.stride)
    }
}

/// Device-ready vertex data.
#[derive(Debug, Clone, PartialEq)]
pub struct MungedVertexData {
    layout: VertexLayout,
    bytes: Vec<u8>,
    num_rows: usize,
    animation: AnimationType,
}

impl MungedVertexData {
    /// The interleaved layout.
    #[must_use]
    pub const fn layout(&self) -> &VertexLayout {
        &self.layout
    }

    /// The interleaved bytes, `num_rows * stride` long.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of vertices.
    #[must_use]
    pub const fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// Animation type carried over from the source data.
    #[must_use]
    pub const fn animation(&self) -> AnimationType {
        self.animation
    }

    /// Decodes one attribute of one row, widened to four components.
    ///
    /// Packed colors come back in R, G, B, A order whatever their byte order.
    #[must_use]
    pub fn read_attribute(&self, row: usize, name: &InternalName) -> Option<Vec4> {
        let attr = self.layout.attribute(name)?;
        let start = row.checked_mul(self.layout.stride)? + attr.offset;
        let raw = self.bytes.get(start..start + attr.format.size())?;
        let float = |i: usize| bytemuck::pod_read_unaligned::<f32>(&raw[i * 4..i * 4 + 4]);
        let unorm = |i: usize| f32::from(raw[i]) / 255.0;
        Some(match attr.format {
            AttributeFormat::Float32 => Vec4::new(float(0), 0.0, 0.0, 0.0),
            AttributeFormat::Float32x2 => Vec4::new(float(0), float(1), 0.0, 0.0),
            AttributeFormat::Float32x3 => Vec4::new(float(0), float(1), float(2), 0.0),
            AttributeFormat::Float32x4 => Vec4::new(float(0), float(1), float(2), float(3)),
            AttributeFormat::Unorm8x4Rgba => Vec4::new(unorm(0), unorm(1), unorm(2), unorm(3)),
            AttributeFormat::Unorm8x4Bgra => Vec4::new(unorm(2), unorm(1), unorm(0), unorm(3)),
        })
    }
}

// =============================================================================
// INTERLEAVING
// =============================================================================

/// Where an attribute's values come from.
enum Source<'a> {
    Column(&'a VertexColumn),
    Constant(Vec4),
}

/// Fill for components a column does not store.
fn fill_for(contents: Contents) -> Vec4 {
    match contents {
        Contents::Point | Contents::ClipPoint | Contents::Color => Vec4::W,
        Contents::Vector | Contents::TexCoord | Contents::Other => Vec4::ZERO,
    }
}

// Components are clamped to 0..=255 before the casts.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn pack_unorm(value: Vec4) -> [u8; 4] {
    let c = (value.clamp(Vec4::ZERO, Vec4::ONE) * 255.0).round();
    [c.x as u8, c.y as u8, c.z as u8, c.w as u8]
}

fn encode(out: &mut Vec<u8>, format: AttributeFormat, v: Vec4) {
    match format {
        AttributeFormat::Float32 => out.extend_from_slice(bytemuck::bytes_of(&v.x)),
        AttributeFormat::Float32x2 => out.extend_from_slice(bytemuck::bytes_of(&[v.x, v.y])),
        AttributeFormat::Float32x3 => out.extend_from_slice(bytemuck::bytes_of(&[v.x, v.y, v.z])),
        AttributeFormat::Float32x4 => out.extend_from_slice(bytemuck::bytes_of(&v.to_array())),
        AttributeFormat::Unorm8x4Rgba => out.extend_from_slice(&pack_unorm(v)),
        AttributeFormat::Unorm8x4Bgra => {
            let [r, g, b, a] = pack_unorm(v);
            out.extend_from_slice(&[b, g, r, a]);
        }
    }
}

fn interleave(
    layout: VertexLayout,
    sources: &[Source<'_>],
    data: &GeomVertexData,
) -> MungedVertexData {
    let num_rows = data.num_rows();
    let mut bytes = Vec::with_capacity(num_rows * layout.stride());
    for row in 0..num_rows {
        for (attr, source) in layout.attributes().iter().zip(sources) {
            let value = match source {
                Source::Column(column) => {
                    let fill = fill_for(column.contents);
                    column.data.get4(row, fill).unwrap_or(fill)
                }
                Source::Constant(value) => *value,
            };
            encode(&mut bytes, attr.format, value);
        }
    }
    MungedVertexData {
        layout,
        bytes,
        num_rows,
        animation: data.animation(),
    }
}

/// Columns grouped in canonical order: vertex, normal, colors, texcoords, rest.
fn canonical_order(data: &GeomVertexData) -> Vec<&VertexColumn> {
    let rank = |column: &VertexColumn| match column.contents {
        Contents::Point | Contents::ClipPoint => 0,
        _ if column.name == InternalName::normal() => 1,
        Contents::Color => 2,
        Contents::TexCoord => 3,
        Contents::Vector | Contents::Other => 4,
    };
    let mut columns: Vec<&VertexColumn> = data.columns().iter().collect();
    columns.sort_by_key(|column| rank(column));
    columns
}

// =============================================================================
// MUNGER TRAIT
// =============================================================================

/// Per-device vertex-format conversion.
pub trait Munger: Send + Sync + fmt::Debug {
    /// Short name for diagnostics.
    fn name(&self) -> &'static str;

    /// Converts `data`, drawn with `state`, into device-ready bytes.
    ///
    /// # Errors
    ///
    /// Returns a [`MungeError`] if the data is malformed or needs something
    /// this munger's device cannot express.
    fn munge_data(
        &self,
        data: &Arc<GeomVertexData>,
        state: &RenderState,
    ) -> MungeResult<Arc<MungedVertexData>>;

    /// Cache statistics, if the munger caches.
    fn cache_stats(&self) -> Option<CacheStats> {
        None
    }
}

/// Full-precision layout: every column as `f32`s, colors as `f32x4`.
#[derive(Debug, Default)]
pub struct StandardMunger {
    cache: MungeCache,
}

impl StandardMunger {
    /// Creates a munger with an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn convert(data: &GeomVertexData) -> MungeResult<MungedVertexData> {
        data.validate()?;
        let mut layout = VertexLayout::default();
        let mut sources = Vec::new();
        for column in canonical_order(data) {
            let format = if column.contents == Contents::Color {
                AttributeFormat::Float32x4
            } else {
                AttributeFormat::float(column.data.num_components())
            };
            layout.push(column.name.clone(), column.contents, format);
            sources.push(Source::Column(column));
        }
        Ok(interleave(layout, &sources, data))
    }
}

impl Munger for StandardMunger {
    fn name(&self) -> &'static str {
        "standard"
    }

    fn munge_data(
        &self,
        data: &Arc<GeomVertexData>,
        _state: &RenderState,
    ) -> MungeResult<Arc<MungedVertexData>> {
        self.cache
            .get_or_insert_with(data, None, || Self::convert(data).map(Arc::new))
    }

    fn cache_stats(&self) -> Option<CacheStats> {
        Some(self.cache.stats())
    }
}

/// Byte order of packed colors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ColorOrder {
    /// R, G, B, A.
    #[default]
    Rgba,
    /// B, G, R, A.
    Bgra,
}

/// Compact layout for fixed-function style profiles.
///
/// Colors are packed to four bytes, `Other` columns are dropped, and the
/// number of texcoord sets is capped at the profile's stage count. With
/// `bake_flat_color`, a flat state color is written into every vertex.
#[derive(Debug)]
pub struct PackedColorMunger {
    color_order: ColorOrder,
    max_texcoord_sets: usize,
    bake_flat_color: bool,
    cache: MungeCache,
}

impl PackedColorMunger {
    /// Creates a packed munger.
    #[must_use]
    pub fn new(color_order: ColorOrder, max_texcoord_sets: usize, bake_flat_color: bool) -> Self {
        Self {
            color_order,
            max_texcoord_sets,
            bake_flat_color,
            cache: MungeCache::default(),
        }
    }

    const fn color_format(&self) -> AttributeFormat {
        match self.color_order {
            ColorOrder::Rgba => AttributeFormat::Unorm8x4Rgba,
            ColorOrder::Bgra => AttributeFormat::Unorm8x4Bgra,
        }
    }

    fn convert(&self, data: &GeomVertexData, flat: Option<Vec4>) -> MungeResult<MungedVertexData> {
        data.validate()?;
        let texcoord_sets = data
            .columns()
            .iter()
            .filter(|c| c.contents == Contents::TexCoord)
            .count();
        if texcoord_sets > self.max_texcoord_sets {
            return Err(MungeError::TooManyTexcoordSets {
                count: texcoord_sets,
                limit: self.max_texcoord_sets,
            });
        }

        let mut layout = VertexLayout::default();
        let mut sources = Vec::new();
        let mut has_color = false;
        for column in canonical_order(data) {
            match column.contents {
                Contents::Other => continue,
                Contents::Color => {
                    if column.data.num_components() < 3 {
                        return Err(MungeError::UnencodableColumn {
                            name: column.name.clone(),
                            munger: self.name(),
                        });
                    }
                    has_color = true;
                    layout.push(column.name.clone(), Contents::Color, self.color_format());
                    sources.push(flat.map_or(Source::Column(column), Source::Constant));
                }
                _ => {
                    let format = AttributeFormat::float(column.data.num_components());
                    layout.push(column.name.clone(), column.contents, format);
                    sources.push(Source::Column(column));
                }
            }
        }
        if let (Some(color), false) = (flat, has_color) {
            layout.push(InternalName::color(), Contents::Color, self.color_format());
            sources.push(Source::Constant(color));
        }
        Ok(interleave(layout, &sources, data))
    }
}

impl Default for PackedColorMunger {
    fn default() -> Self {
        Self::new(ColorOrder::Rgba, 4, false)
    }
}

impl Munger for PackedColorMunger {
    fn name(&self) -> &'static str {
        "packed-color"
    }

    fn munge_data(
        &self,
        data: &Arc<GeomVertexData>,
        state: &RenderState,
    ) -> MungeResult<Arc<MungedVertexData>> {
        let flat = if self.bake_flat_color {
            state.flat_color()
        } else {
            None
        };
        let variant = flat.map(|c| c.to_array().map(f32::to_bits));
        self.cache.get_or_insert_with(data, variant, || {
            self.convert(data, flat).map(Arc::new)
        })
    }

    fn cache_stats(&self) -> Option<CacheStats> {
        Some(self.cache.stats())
    }
}
