//! # Render State
//!
//! Shading, blending and texturing attributes attached to a geometry batch,
//! plus the lights the state references.
//!
//! Every attribute is optional. Composing two states lets the more specific
//! state override the attributes it sets and inherit the rest.

use std::fmt;
use std::sync::Arc;

use glam::{Mat4, Vec3, Vec4};

use crate::geometry::GeomRendering;
use crate::transform::TransformState;
use crate::vertex::InternalName;

/// Source of vertex color.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColorAttrib {
    /// Use the per-vertex `color` column.
    Vertex,
    /// Use one color for every vertex.
    Flat(Vec4),
}

/// Blending mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TransparencyMode {
    /// Opaque.
    #[default]
    None,
    /// Standard alpha blending; order dependent.
    Alpha,
    /// Additive blending; order independent.
    Additive,
}

/// Rasterization mode for points and lines.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderMode {
    /// Point size or line width. Pixels, or world units when `perspective`.
    pub thickness: f32,
    /// Size points in world units so they shrink with distance.
    pub perspective: bool,
}

impl Default for RenderMode {
    fn default() -> Self {
        Self {
            thickness: 1.0,
            perspective: false,
        }
    }
}

/// A texture stage and the texcoord set it samples with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureStage {
    /// Stage name.
    pub name: Arc<str>,
    /// Texture-coordinate column the stage reads.
    pub texcoord_name: InternalName,
}

impl TextureStage {
    /// Creates a stage.
    #[must_use]
    pub fn new(name: &str, texcoord_name: InternalName) -> Self {
        Self {
            name: Arc::from(name),
            texcoord_name,
        }
    }
}

/// Kind of light source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightKind {
    /// Uniform light with no direction.
    Ambient,
    /// Infinitely distant light shining along `direction` (light space).
    Directional {
        /// Direction the light travels.
        direction: Vec3,
    },
    /// Omnidirectional light at `position` (light space).
    Point {
        /// Light position.
        position: Vec3,
    },
}

/// A light placed in the scene.
#[derive(Debug, Clone, PartialEq)]
pub struct Light {
    /// Light name for diagnostics.
    pub name: Arc<str>,
    /// Light kind and geometry.
    pub kind: LightKind,
    /// Higher priorities win when one light must be chosen.
    pub priority: i32,
    /// World transform of the light node.
    pub net_transform: Arc<TransformState>,
}

impl Light {
    /// Creates a light at the identity transform with priority 0.
    #[must_use]
    pub fn new(name: &str, kind: LightKind) -> Self {
        Self {
            name: Arc::from(name),
            kind,
            priority: 0,
            net_transform: TransformState::identity(),
        }
    }

    /// Sets the priority (builder style).
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the light's world transform (builder style).
    #[must_use]
    pub fn with_transform(mut self, net_transform: Arc<TransformState>) -> Self {
        self.net_transform = net_transform;
        self
    }

    /// True for ambient lights.
    #[must_use]
    pub const fn is_ambient(&self) -> bool {
        matches!(self.kind, LightKind::Ambient)
    }

    /// Unit vector from `point` towards the light, in the object space that
    /// `light_to_object` maps light space into.
    ///
    /// Ambient lights have no direction and return `None`, as does a point
    /// light sitting exactly on `point`.
    #[must_use]
    pub fn vector_to_light(&self, point: Vec3, light_to_object: &Mat4) -> Option<Vec3> {
        match self.kind {
            LightKind::Ambient => None,
            LightKind::Directional { direction } => {
                (-light_to_object.transform_vector3(direction)).try_normalize()
            }
            LightKind::Point { position } => {
                (light_to_object.transform_point3(position) - point).try_normalize()
            }
        }
    }
}

/// How a texgen entry fills its stage's texcoords.
#[derive(Debug, Clone, PartialEq)]
pub enum TexGenMode {
    /// Generated corner coordinates for expanded points.
    PointSprite,
    /// Tangent-space vector to a light, per vertex.
    LightVector {
        /// Light to aim at; `None` picks the state's most important light.
        light: Option<Arc<Light>>,
        /// Texcoord set whose `tangent.*`/`binormal.*` columns span tangent space.
        basis: InternalName,
    },
}

/// A texture stage whose coordinates are generated.
#[derive(Debug, Clone, PartialEq)]
pub struct TexGenEntry {
    /// Stage being generated; its texcoord name is the destination column.
    pub stage: TextureStage,
    /// Generation mode.
    pub mode: TexGenMode,
}

/// An immutable set of render attributes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderState {
    color: Option<ColorAttrib>,
    transparency: Option<TransparencyMode>,
    render_mode: Option<RenderMode>,
    textures: Option<Vec<TextureStage>>,
    tex_gen: Option<Vec<TexGenEntry>>,
    lights: Option<Vec<Arc<Light>>>,
}

impl RenderState {
    /// A state with no attributes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the color attribute (builder style).
    #[must_use]
    pub fn with_color(mut self, color: ColorAttrib) -> Self {
        self.color = Some(color);
        self
    }

    /// Sets the transparency mode (builder style).
    #[must_use]
    pub fn with_transparency(mut self, mode: TransparencyMode) -> Self {
        self.transparency = Some(mode);
        self
    }

    /// Sets the render mode (builder style).
    #[must_use]
    pub fn with_render_mode(mut self, mode: RenderMode) -> Self {
        self.render_mode = Some(mode);
        self
    }

    /// Appends a texture stage (builder style).
    #[must_use]
    pub fn with_texture_stage(mut self, stage: TextureStage) -> Self {
        self.textures.get_or_insert_with(Vec::new).push(stage);
        self
    }

    /// Appends a texgen entry (builder style).
    #[must_use]
    pub fn with_tex_gen(mut self, stage: TextureStage, mode: TexGenMode) -> Self {
        self.tex_gen
            .get_or_insert_with(Vec::new)
            .push(TexGenEntry { stage, mode });
        self
    }

    /// Adds a light (builder style).
    #[must_use]
    pub fn with_light(mut self, light: Arc<Light>) -> Self {
        self.lights.get_or_insert_with(Vec::new).push(light);
        self
    }

    /// The color attribute.
    #[must_use]
    pub const fn color(&self) -> Option<ColorAttrib> {
        self.color
    }

    /// The flat color, if the color attribute is flat.
    #[must_use]
    pub const fn flat_color(&self) -> Option<Vec4> {
        match self.color {
            Some(ColorAttrib::Flat(color)) => Some(color),
            _ => None,
        }
    }

    /// The transparency mode; opaque when unset.
    #[must_use]
    pub fn transparency(&self) -> TransparencyMode {
        self.transparency.unwrap_or_default()
    }

    /// The render mode; one-pixel non-perspective when unset.
    #[must_use]
    pub fn render_mode(&self) -> RenderMode {
        self.render_mode.unwrap_or_default()
    }

    /// Texture stages in application order.
    #[must_use]
    pub fn textures(&self) -> &[TextureStage] {
        self.textures.as_deref().unwrap_or_default()
    }

    /// Texgen entries.
    #[must_use]
    pub fn tex_gen(&self) -> &[TexGenEntry] {
        self.tex_gen.as_deref().unwrap_or_default()
    }

    /// Lights enabled by this state.
    #[must_use]
    pub fn lights(&self) -> &[Arc<Light>] {
        self.lights.as_deref().unwrap_or_default()
    }

    /// The highest-priority non-ambient light. Ties go to the earlier light.
    #[must_use]
    pub fn most_important_light(&self) -> Option<&Arc<Light>> {
        self.lights()
            .iter()
            .filter(|light| !light.is_ambient())
            .fold(None, |best: Option<&Arc<Light>>, light| match best {
                Some(b) if b.priority >= light.priority => Some(b),
                _ => Some(light),
            })
    }

    /// Texgen entries that generate light vectors.
    pub fn light_vector_stages(&self) -> impl Iterator<Item = &TexGenEntry> {
        self.tex_gen()
            .iter()
            .filter(|entry| matches!(entry.mode, TexGenMode::LightVector { .. }))
    }

    /// True if any texgen entry generates point-sprite coordinates.
    #[must_use]
    pub fn has_point_sprite(&self) -> bool {
        self.tex_gen()
            .iter()
            .any(|entry| entry.mode == TexGenMode::PointSprite)
    }

    /// Texcoord column that receives generated point-sprite coordinates.
    #[must_use]
    pub fn point_sprite_texcoord(&self) -> Option<&InternalName> {
        self.tex_gen()
            .iter()
            .find(|entry| entry.mode == TexGenMode::PointSprite)
            .map(|entry| &entry.stage.texcoord_name)
    }

    /// Returns a copy without the texgen entry for `stage_name`.
    #[must_use]
    pub fn remove_tex_gen_stage(&self, stage_name: &str) -> Self {
        let mut state = self.clone();
        if let Some(entries) = &mut state.tex_gen {
            entries.retain(|entry| &*entry.stage.name != stage_name);
            if entries.is_empty() {
                state.tex_gen = None;
            }
        }
        state
    }

    /// Returns `self` overridden by every attribute `other` sets.
    #[must_use]
    pub fn compose(&self, other: &Self) -> Self {
        Self {
            color: other.color.or(self.color),
            transparency: other.transparency.or(self.transparency),
            render_mode: other.render_mode.or(self.render_mode),
            textures: other.textures.clone().or_else(|| self.textures.clone()),
            tex_gen: other.tex_gen.clone().or_else(|| self.tex_gen.clone()),
            lights: other.lights.clone().or_else(|| self.lights.clone()),
        }
    }

    /// Adds the rendering bits this state implies to `bits`.
    #[must_use]
    pub fn geom_rendering(&self, bits: GeomRendering) -> GeomRendering {
        let mut bits = bits;
        if bits.contains(GeomRendering::POINT) {
            let mode = self.render_mode();
            if (mode.thickness - 1.0).abs() > f32::EPSILON {
                bits |= GeomRendering::POINT_UNIFORM_SIZE;
            }
            if mode.perspective {
                bits |= GeomRendering::POINT_PERSPECTIVE;
            }
            if self.has_point_sprite() {
                bits |= GeomRendering::POINT_SPRITE;
            }
        }
        if self.light_vector_stages().next().is_some() {
            bits |= GeomRendering::TEXCOORD_LIGHT_VECTOR;
        }
        bits
    }

    /// True if no attribute is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl fmt::Display for RenderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("{}");
        }
        let mut parts: Vec<String> = Vec::new();
        match self.color {
            Some(ColorAttrib::Flat(c)) => {
                parts.push(format!("color flat({:.2} {:.2} {:.2} {:.2})", c.x, c.y, c.z, c.w));
            }
            Some(ColorAttrib::Vertex) => parts.push("color vertex".into()),
            None => {}
        }
        if let Some(mode) = self.transparency {
            parts.push(format!("transparency {mode:?}"));
        }
        if let Some(mode) = self.render_mode {
            let kind = if mode.perspective { " perspective" } else { "" };
            parts.push(format!("thickness {}{kind}", mode.thickness));
        }
        if !self.textures().is_empty() {
            parts.push(format!("textures {}", self.textures().len()));
        }
        if !self.tex_gen().is_empty() {
            parts.push(format!("tex_gen {}", self.tex_gen().len()));
        }
        if !self.lights().is_empty() {
            parts.push(format!("lights {}", self.lights().len()));
        }
        write!(f, "{{{}}}", parts.join(", "))
    }
}
