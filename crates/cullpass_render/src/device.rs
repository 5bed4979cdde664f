//! # Graphics Device Interface
//!
//! The cull pass never talks to a graphics API directly. It asks a
//! [`GraphicsDevice`] what it can draw, which munger produces its vertex
//! format, and how deep a point sits, then submits [`DrawCall`]s.

use std::sync::Arc;

use cullpass_shared::{
    CoordinateSystem, GeomRendering, Geometry, PrimitiveType, RenderState, TransformState, Vec3,
};

use crate::munge::{ColorOrder, MungedVertexData, Munger, PackedColorMunger, StandardMunger};

/// What a device can draw natively.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceCapabilities {
    /// Rendering features handled by the device; the rest are emulated.
    pub supported_geom_rendering: GeomRendering,
    /// Primitive types the device accepts.
    pub supported_primitives: Vec<PrimitiveType>,
    /// Eye-space convention, which fixes the depth axis.
    pub coordinate_system: CoordinateSystem,
    /// Texture stages available to one draw.
    pub max_texture_stages: usize,
    /// Largest vertex count in one draw, if limited.
    pub max_vertices_per_draw: Option<usize>,
}

impl DeviceCapabilities {
    /// A device that draws every feature and primitive natively.
    #[must_use]
    pub fn full() -> Self {
        Self {
            supported_geom_rendering: GeomRendering::all(),
            supported_primitives: vec![
                PrimitiveType::Points,
                PrimitiveType::Lines,
                PrimitiveType::LineStrip,
                PrimitiveType::Triangles,
                PrimitiveType::TriangleStrip,
                PrimitiveType::TriangleFan,
            ],
            coordinate_system: CoordinateSystem::default(),
            max_texture_stages: 8,
            max_vertices_per_draw: None,
        }
    }

    /// A device that only rasterizes indexed triangles; points and light
    /// vectors are always emulated.
    #[must_use]
    pub fn triangles_only() -> Self {
        Self {
            supported_geom_rendering: GeomRendering::empty(),
            supported_primitives: vec![PrimitiveType::Triangles],
            coordinate_system: CoordinateSystem::default(),
            max_texture_stages: 4,
            max_vertices_per_draw: None,
        }
    }

    /// Sets the coordinate system (builder style).
    #[must_use]
    pub fn with_coordinate_system(mut self, coordinate_system: CoordinateSystem) -> Self {
        self.coordinate_system = coordinate_system;
        self
    }

    /// True if `primitive` can be drawn without conversion.
    #[must_use]
    pub fn supports_primitive(&self, primitive: PrimitiveType) -> bool {
        self.supported_primitives.contains(&primitive)
    }
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self::full()
    }
}

/// Phase of a three-pass decal draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecalPhase {
    /// Base surfaces, writing depth.
    BaseFirst,
    /// Decals on top of the base.
    Nested,
    /// Base surfaces again, for devices that draw decals without depth.
    BaseSecond,
}

/// One draw submitted to a device.
#[derive(Debug, Clone, Copy)]
pub struct DrawCall<'a> {
    /// Geometry to draw.
    pub geometry: &'a Arc<Geometry>,
    /// Device-ready vertices, if the unit was munged.
    pub munged_data: Option<&'a Arc<MungedVertexData>>,
    /// Render state.
    pub state: &'a Arc<RenderState>,
    /// Model-to-eye transform; identity for clip-space geometry.
    pub modelview_transform: &'a Arc<TransformState>,
    /// Decal phase, for phased draws.
    pub phase: Option<DecalPhase>,
}

/// A graphics device as seen by the cull pass.
pub trait GraphicsDevice {
    /// What the device can draw.
    fn capabilities(&self) -> &DeviceCapabilities;

    /// The munger producing this device's vertex format.
    fn munger(&self) -> Arc<dyn Munger>;

    /// Depth of an eye-space point, larger is farther.
    fn compute_distance_to(&self, eye: Vec3) -> f32 {
        self.capabilities().coordinate_system.depth_of(eye)
    }

    /// Submits one draw.
    fn draw(&mut self, call: &DrawCall<'_>);

    /// Prepares for a decal phase. Returns false to skip the phase.
    ///
    /// By default the second base pass is skipped.
    fn begin_decal_phase(&mut self, phase: DecalPhase) -> bool {
        phase != DecalPhase::BaseSecond
    }
}

/// A submitted draw, as recorded by [`HeadlessDevice`].
#[derive(Debug, Clone)]
pub struct DrawRecord {
    /// Geometry drawn.
    pub geometry: Arc<Geometry>,
    /// Munged vertices, if any.
    pub munged_data: Option<Arc<MungedVertexData>>,
    /// State drawn with.
    pub state: Arc<RenderState>,
    /// Decal phase.
    pub phase: Option<DecalPhase>,
}

/// A device that draws nothing and records every call.
#[derive(Debug)]
pub struct HeadlessDevice {
    capabilities: DeviceCapabilities,
    munger: Arc<dyn Munger>,
    draw_base_second: bool,
    draws: Vec<DrawRecord>,
}

impl HeadlessDevice {
    /// Creates a device with its own [`StandardMunger`].
    #[must_use]
    pub fn new(capabilities: DeviceCapabilities) -> Self {
        Self::with_munger(capabilities, Arc::new(StandardMunger::new()))
    }

    /// Creates a device with a [`PackedColorMunger`] that bakes flat colors
    /// and allows one texcoord set per texture stage.
    #[must_use]
    pub fn packed(capabilities: DeviceCapabilities, color_order: ColorOrder) -> Self {
        let munger = PackedColorMunger::new(color_order, capabilities.max_texture_stages, true);
        Self::with_munger(capabilities, Arc::new(munger))
    }

    /// Creates a device that uses `munger`.
    #[must_use]
    pub fn with_munger(capabilities: DeviceCapabilities, munger: Arc<dyn Munger>) -> Self {
        Self {
            capabilities,
            munger,
            draw_base_second: false,
            draws: Vec::new(),
        }
    }

    /// Makes the device request the second base pass (builder style).
    #[must_use]
    pub fn with_base_second_pass(mut self, enabled: bool) -> Self {
        self.draw_base_second = enabled;
        self
    }

    /// Draws recorded so far.
    #[must_use]
    pub fn draws(&self) -> &[DrawRecord] {
        &self.draws
    }

    /// Forgets recorded draws.
    pub fn clear(&mut self) {
        self.draws.clear();
    }
}

impl GraphicsDevice for HeadlessDevice {
    fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    fn munger(&self) -> Arc<dyn Munger> {
        Arc::clone(&self.munger)
    }

    fn draw(&mut self, call: &DrawCall<'_>) {
        self.draws.push(DrawRecord {
            geometry: Arc::clone(call.geometry),
            munged_data: call.munged_data.cloned(),
            state: Arc::clone(call.state),
            phase: call.phase,
        });
    }

    fn begin_decal_phase(&mut self, phase: DecalPhase) -> bool {
        phase != DecalPhase::BaseSecond || self.draw_base_second
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_distance_follows_coordinate_system() {
        let eye = Vec3::new(0.0, 3.0, -7.0);
        let y_up = HeadlessDevice::new(DeviceCapabilities::full());
        assert_relative_eq!(y_up.compute_distance_to(eye), 7.0);

        let z_up = HeadlessDevice::new(
            DeviceCapabilities::full().with_coordinate_system(CoordinateSystem::ZUpRight),
        );
        assert_relative_eq!(z_up.compute_distance_to(eye), 3.0);
    }

    #[test]
    fn test_capability_presets() {
        let full = DeviceCapabilities::full();
        assert!(full.supports_primitive(PrimitiveType::TriangleFan));
        assert!(full.supported_geom_rendering.contains(GeomRendering::POINT_BITS));

        let minimal = DeviceCapabilities::triangles_only();
        assert!(!minimal.supports_primitive(PrimitiveType::Points));
        assert!(minimal.supported_geom_rendering.is_empty());
    }

    #[test]
    fn test_default_skips_second_base_pass() {
        let mut device = HeadlessDevice::new(DeviceCapabilities::full());
        assert!(device.begin_decal_phase(DecalPhase::BaseFirst));
        assert!(!device.begin_decal_phase(DecalPhase::BaseSecond));

        let mut device = device.with_base_second_pass(true);
        assert!(device.begin_decal_phase(DecalPhase::BaseSecond));
    }

    #[test]
    fn test_packed_device_uses_stage_limit() {
        let device = HeadlessDevice::packed(DeviceCapabilities::triangles_only(), ColorOrder::Bgra);
        assert_eq!(device.munger().name(), "packed-color");
    }
}
