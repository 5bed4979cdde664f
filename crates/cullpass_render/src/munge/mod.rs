//! # Munging Pipeline
//!
//! Adapts a draw unit's geometry to what the active device can draw:
//!
//! ```text
//! required bits ─┬─ unsupported point bits ──→ points to clip-space quads
//!                └─ unsupported light vector → per-vertex light vectors
//!                        ↓
//!            primitive / size checks → Munger → cached on the unit
//! ```
//!
//! Munging never fails outward. A [`MungeError`] is logged and the unit's
//! state is swapped for a flash state so the broken batch is visible on
//! screen instead of aborting the frame.

mod cache;
mod light_vector;
mod points;
mod strategy;

use std::sync::{Arc, OnceLock};

use cullpass_shared::{
    AnimationType, ColorAttrib, GeomRendering, Geometry, RenderState, TransformState, Vec4,
};

use crate::device::GraphicsDevice;
use crate::error::{FailureClass, MungeError, MungeResult};
use crate::traverse::TraversalContext;
use crate::unit::{DrawUnit, MungeKey};

pub use cache::{CacheStats, CacheVariant, MungeCache};
pub use points::{sort_back_to_front, PointData};
pub use strategy::{
    AttributeFormat, ColorOrder, MungedVertexData, Munger, PackedColorMunger, StandardMunger,
    VertexAttribute, VertexLayout,
};

/// Flash color for CPU-side problems.
pub const FLASH_CPU_COLOR: Vec4 = Vec4::new(0.8, 0.2, 0.2, 1.0);
/// Flash color for hardware-side problems.
pub const FLASH_HARDWARE_COLOR: Vec4 = Vec4::new(0.1, 0.2, 0.8, 1.0);

/// Shared state drawn for CPU-animated or CPU-malformed batches.
#[must_use]
pub fn flash_cpu_state() -> Arc<RenderState> {
    static STATE: OnceLock<Arc<RenderState>> = OnceLock::new();
    Arc::clone(STATE.get_or_init(|| {
        Arc::new(RenderState::new().with_color(ColorAttrib::Flat(FLASH_CPU_COLOR)))
    }))
}

/// Shared state drawn for hardware-animated or hardware-limited batches.
#[must_use]
pub fn flash_hardware_state() -> Arc<RenderState> {
    static STATE: OnceLock<Arc<RenderState>> = OnceLock::new();
    Arc::clone(STATE.get_or_init(|| {
        Arc::new(RenderState::new().with_color(ColorAttrib::Flat(FLASH_HARDWARE_COLOR)))
    }))
}

/// The flash state for a failure class.
#[must_use]
pub fn flash_state(class: FailureClass) -> Arc<RenderState> {
    match class {
        FailureClass::Cpu => flash_cpu_state(),
        FailureClass::Hardware => flash_hardware_state(),
    }
}

/// What a successful pipeline run replaces on the unit.
struct MungeOutput {
    geometry: Arc<Geometry>,
    state: Arc<RenderState>,
    modelview: Arc<TransformState>,
    data: Arc<MungedVertexData>,
}

/// The state to draw this frame, alternating with a flash state for
/// animated vertices when the visualization is on.
fn animation_flash(
    state: &Arc<RenderState>,
    animation: AnimationType,
    ctx: &TraversalContext,
) -> Arc<RenderState> {
    if !ctx.config.show_vertex_animation {
        return Arc::clone(state);
    }
    let class = match animation {
        AnimationType::None => return Arc::clone(state),
        AnimationType::Cpu => FailureClass::Cpu,
        AnimationType::Hardware => FailureClass::Hardware,
    };
    // Truncation is the intent: whole flash periods elapsed.
    #[allow(clippy::cast_possible_truncation)]
    let period = (ctx.frame_time * ctx.config.flash_rate) as i64;
    if period & 1 == 0 {
        flash_state(class)
    } else {
        Arc::clone(state)
    }
}

fn run_pipeline<D: GraphicsDevice + ?Sized>(
    geometry: &Arc<Geometry>,
    state: &Arc<RenderState>,
    net_transform: &TransformState,
    modelview: &Arc<TransformState>,
    device: &D,
    munger: &Arc<dyn Munger>,
    ctx: &TraversalContext,
) -> MungeResult<MungeOutput> {
    let source = geometry.vertex_data();
    source.validate()?;
    let rows = source.num_rows();
    if let Some(&index) = geometry.vertex_list().iter().find(|&&i| i as usize >= rows) {
        return Err(MungeError::IndexOutOfRange { index, rows });
    }

    let caps = device.capabilities();
    let mut supported = caps.supported_geom_rendering;
    if !ctx.config.hardware_point_sprites {
        supported.remove(GeomRendering::POINT_PERSPECTIVE | GeomRendering::POINT_SPRITE);
    }
    let required = state.geom_rendering(geometry.geom_rendering());
    let unsupported = required.difference(supported);
    tracing::trace!(?required, ?unsupported, "munging {geometry}");

    let mut output_geometry = Arc::clone(geometry);
    let mut output_state = Arc::clone(state);
    let mut output_modelview = Arc::clone(modelview);

    if unsupported.intersects(GeomRendering::POINT_BITS) {
        let (quads, new_state) =
            points::munge_points_to_quads(&output_geometry, &output_state, modelview, device, ctx)?;
        output_geometry = Arc::new(quads);
        output_state = Arc::new(new_state);
        output_modelview = TransformState::identity();
    }

    if unsupported.contains(GeomRendering::TEXCOORD_LIGHT_VECTOR) {
        let (lit, new_state) =
            light_vector::munge_texcoord_light_vector(&output_geometry, &output_state, net_transform);
        output_geometry = Arc::new(lit);
        output_state = Arc::new(new_state);
    }

    let primitive = output_geometry.primitive();
    if !caps.supports_primitive(primitive) {
        return Err(MungeError::UnsupportedPrimitive(primitive));
    }
    let count = output_geometry.vertex_data().num_rows();
    if let Some(limit) = caps.max_vertices_per_draw.filter(|&limit| count > limit) {
        return Err(MungeError::TooManyVertices { count, limit });
    }

    let data = munger.munge_data(output_geometry.vertex_data(), &output_state)?;
    Ok(MungeOutput {
        geometry: output_geometry,
        state: output_state,
        modelview: output_modelview,
        data,
    })
}

impl DrawUnit {
    /// Converts this unit and every unit chained after it for `device`.
    ///
    /// A unit whose source geometry and munger are unchanged since its last
    /// munge keeps its cached data and `munger` is not consulted. Failures
    /// are logged and leave the unit drawing with a flash state.
    pub fn munge_geom<D: GraphicsDevice + ?Sized>(
        &mut self,
        device: &D,
        munger: &Arc<dyn Munger>,
        ctx: &TraversalContext,
    ) {
        let mut unit = Some(self);
        while let Some(current) = unit {
            current.munge_one(device, munger, ctx);
            unit = current.next_mut();
        }
    }

    fn munge_one<D: GraphicsDevice + ?Sized>(
        &mut self,
        device: &D,
        munger: &Arc<dyn Munger>,
        ctx: &TraversalContext,
    ) {
        let Some(geometry) = self.geometry.clone() else {
            return;
        };

        if let Some(key) = &self.munge_key {
            if Arc::ptr_eq(&key.munger, munger) && Arc::ptr_eq(&key.output_geometry, &geometry) {
                tracing::debug!("munge cache hit");
                if let Some(state) = &key.munged_state {
                    self.render_state = animation_flash(state, key.animation, ctx);
                }
                return;
            }
        }

        // Always munge from the inputs the unit was built with.
        let (source_geometry, source_state, source_modelview) = match self.munge_key.take() {
            Some(key) => (key.source_geometry, key.source_state, key.source_modelview),
            None => (
                geometry,
                Arc::clone(&self.render_state),
                Arc::clone(&self.modelview_transform),
            ),
        };

        let outcome = run_pipeline(
            &source_geometry,
            &source_state,
            &self.net_transform,
            &source_modelview,
            device,
            munger,
            ctx,
        );

        let (output_geometry, munged_state, animation) = match outcome {
            Ok(output) => {
                let animation = output.data.animation();
                self.render_state = animation_flash(&output.state, animation, ctx);
                self.modelview_transform = output.modelview;
                self.munged_data = Some(output.data);
                (output.geometry, Some(output.state), animation)
            }
            Err(err) => {
                tracing::warn!(
                    class = ?err.class(),
                    munger = munger.name(),
                    "failed to munge {source_geometry}: {err}"
                );
                self.render_state = flash_state(err.class());
                self.modelview_transform = Arc::clone(&source_modelview);
                self.munged_data = None;
                (Arc::clone(&source_geometry), None, AnimationType::None)
            }
        };

        self.geometry = Some(Arc::clone(&output_geometry));
        self.munger = Some(Arc::clone(munger));
        self.munge_key = Some(MungeKey {
            source_geometry,
            source_state,
            source_modelview,
            output_geometry,
            munged_state,
            animation,
            munger: Arc::clone(munger),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CullConfig;
    use crate::device::{DeviceCapabilities, HeadlessDevice};
    use cullpass_shared::{
        ColumnData, Contents, GeomVertexData, InternalName, PrimitiveType, RenderMode, Vec3,
    };

    fn point_geometry() -> Arc<Geometry> {
        Arc::new(Geometry::new(
            PrimitiveType::Points,
            Arc::new(GeomVertexData::from_points(vec![
                Vec3::new(0.0, 0.0, -5.0),
                Vec3::new(0.0, 0.0, -2.0),
            ])),
        ))
    }

    fn unit_for(geometry: Arc<Geometry>, state: RenderState) -> DrawUnit {
        DrawUnit::new(
            geometry,
            Arc::new(state),
            TransformState::identity(),
            TransformState::identity(),
            None,
        )
    }

    fn thick() -> RenderState {
        RenderState::new().with_render_mode(RenderMode {
            thickness: 4.0,
            perspective: false,
        })
    }

    #[test]
    fn test_supported_points_pass_through() {
        let device = HeadlessDevice::new(DeviceCapabilities::full());
        let munger = device.munger();
        let geometry = point_geometry();
        let mut unit = unit_for(Arc::clone(&geometry), thick());

        unit.munge_geom(&device, &munger, &TraversalContext::default());
        assert!(Arc::ptr_eq(unit.geometry().unwrap(), &geometry));
        assert_eq!(unit.munged_data().unwrap().num_rows(), 2);
    }

    #[test]
    fn test_unsupported_points_become_quads() {
        let device = HeadlessDevice::new(DeviceCapabilities::triangles_only());
        let munger = device.munger();
        let mut unit = unit_for(point_geometry(), thick());

        unit.munge_geom(&device, &munger, &TraversalContext::default());
        let geometry = unit.geometry().unwrap();
        assert_eq!(geometry.primitive(), PrimitiveType::Triangles);
        assert_eq!(geometry.num_vertices(), 12);
        assert_eq!(geometry.vertex_data().num_rows(), 8);
        assert!(unit.modelview_transform().is_identity());
        assert_eq!(unit.munged_data().unwrap().num_rows(), 8);
    }

    #[test]
    fn test_sprites_forced_to_cpu_by_config() {
        let caps = DeviceCapabilities::full();
        let device = HeadlessDevice::new(caps);
        let munger = device.munger();
        let state = RenderState::new()
            .with_render_mode(RenderMode {
                thickness: 0.5,
                perspective: true,
            })
            .with_tex_gen(
                cullpass_shared::TextureStage::new("sprite", InternalName::texcoord()),
                cullpass_shared::TexGenMode::PointSprite,
            );
        let config = CullConfig {
            hardware_point_sprites: false,
            ..CullConfig::default()
        };
        let ctx = TraversalContext::new(crate::SceneSetup::default(), Arc::new(config));
        let mut unit = unit_for(point_geometry(), state);

        unit.munge_geom(&device, &munger, &ctx);
        let geometry = unit.geometry().unwrap();
        assert_eq!(geometry.primitive(), PrimitiveType::Triangles);
        assert!(geometry.vertex_data().has_column(&InternalName::texcoord()));
        assert!(!unit.render_state().has_point_sprite());
    }

    #[test]
    fn test_repeat_munge_is_cache_hit() {
        let device = HeadlessDevice::new(DeviceCapabilities::triangles_only());
        let munger = device.munger();
        let ctx = TraversalContext::default();
        let mut unit = unit_for(point_geometry(), thick());

        unit.munge_geom(&device, &munger, &ctx);
        let first = Arc::clone(unit.munged_data().unwrap());
        let geometry = Arc::clone(unit.geometry().unwrap());
        unit.munge_geom(&device, &munger, &ctx);

        assert!(Arc::ptr_eq(unit.munged_data().unwrap(), &first));
        assert!(Arc::ptr_eq(unit.geometry().unwrap(), &geometry));
        assert_eq!(munger.cache_stats().unwrap().misses, 1);
    }

    #[test]
    fn test_new_munger_remunges_from_source() {
        let device = HeadlessDevice::new(DeviceCapabilities::triangles_only());
        let ctx = TraversalContext::default();
        let mut unit = unit_for(point_geometry(), thick());

        unit.munge_geom(&device, &device.munger(), &ctx);
        let packed: Arc<dyn Munger> = Arc::new(PackedColorMunger::default());
        unit.munge_geom(&device, &packed, &ctx);

        // Expanded once from the original points, not again from the quads.
        assert_eq!(unit.geometry().unwrap().vertex_data().num_rows(), 8);
        assert_eq!(unit.munger().unwrap().name(), "packed-color");
    }

    /// NDC width of the first quad in a munged unit.
    fn quad_width(unit: &DrawUnit) -> f32 {
        let column = unit
            .geometry()
            .and_then(|g| g.vertex_data().column(&InternalName::vertex()))
            .expect("munged quads");
        let xs: Vec<f32> = (0..4)
            .filter_map(|row| column.data.get4(row, Vec4::W))
            .map(|clip| clip.x / clip.w)
            .collect();
        let max = xs.iter().copied().fold(f32::MIN, f32::max);
        let min = xs.iter().copied().fold(f32::MAX, f32::min);
        max - min
    }

    #[test]
    fn test_new_state_reexpands_points() {
        let device = HeadlessDevice::new(DeviceCapabilities::triangles_only());
        let munger = device.munger();
        let ctx = TraversalContext::default();
        let single = Arc::new(Geometry::new(
            PrimitiveType::Points,
            Arc::new(GeomVertexData::from_points(vec![Vec3::new(0.0, 0.0, -5.0)])),
        ));
        let mut unit = unit_for(Arc::clone(&single), thick());

        unit.munge_geom(&device, &munger, &ctx);
        let narrow = quad_width(&unit);

        unit.set_render_state(Arc::new(RenderState::new().with_render_mode(RenderMode {
            thickness: 40.0,
            perspective: false,
        })));
        assert!(Arc::ptr_eq(unit.geometry().unwrap(), &single));
        assert!(unit.munged_data().is_none());

        unit.munge_geom(&device, &munger, &ctx);
        assert_eq!(unit.geometry().unwrap().primitive(), PrimitiveType::Triangles);
        approx::assert_relative_eq!(quad_width(&unit), narrow * 10.0, max_relative = 1e-4);
    }

    #[test]
    fn test_orthographic_world_sized_points_ignore_depth() {
        let device = HeadlessDevice::new(DeviceCapabilities::triangles_only());
        let munger = device.munger();
        let scene = crate::SceneSetup::orthographic(5.0, 100.0, 100.0, 0.1, 100.0);
        let ctx = TraversalContext::new(scene, Arc::new(CullConfig::default()));
        let world = RenderState::new().with_render_mode(RenderMode {
            thickness: 1.0,
            perspective: true,
        });

        let widths: Vec<f32> = [-2.0, -8.0]
            .into_iter()
            .map(|z| {
                let point = Arc::new(Geometry::new(
                    PrimitiveType::Points,
                    Arc::new(GeomVertexData::from_points(vec![Vec3::new(0.0, 0.0, z)])),
                ));
                let mut unit = unit_for(point, world.clone());
                unit.munge_geom(&device, &munger, &ctx);
                quad_width(&unit)
            })
            .collect();

        // One world unit across a ten-unit-wide view.
        approx::assert_relative_eq!(widths[0], 0.2, max_relative = 1e-4);
        approx::assert_relative_eq!(widths[0], widths[1], max_relative = 1e-4);
    }

    #[test]
    fn test_new_modelview_reexpands_points() {
        let device = HeadlessDevice::new(DeviceCapabilities::triangles_only());
        let munger = device.munger();
        let ctx = TraversalContext::default();
        let mut unit = unit_for(point_geometry(), thick());
        let state = Arc::clone(unit.render_state());

        unit.munge_geom(&device, &munger, &ctx);
        assert!(unit.modelview_transform().is_identity());

        let moved = Arc::new(TransformState::from_translation(Vec3::new(1.0, 0.0, 0.0)));
        unit.set_modelview_transform(Arc::clone(&moved));
        assert_eq!(unit.geometry().unwrap().primitive(), PrimitiveType::Points);
        assert!(Arc::ptr_eq(unit.render_state(), &state));
        assert!(Arc::ptr_eq(unit.modelview_transform(), &moved));

        unit.munge_geom(&device, &munger, &ctx);
        assert_eq!(unit.geometry().unwrap().vertex_data().num_rows(), 8);
        assert!(unit.modelview_transform().is_identity());
    }

    #[test]
    fn test_bad_index_flashes_cpu_state() {
        let device = HeadlessDevice::new(DeviceCapabilities::full());
        let munger = device.munger();
        let geometry = Geometry::new(
            PrimitiveType::Triangles,
            Arc::new(GeomVertexData::from_points(vec![Vec3::ZERO; 3])),
        )
        .with_indices(vec![0, 1, 7]);
        let mut unit = unit_for(Arc::new(geometry), RenderState::new());

        unit.munge_geom(&device, &munger, &TraversalContext::default());
        assert!(Arc::ptr_eq(unit.render_state(), &flash_cpu_state()));
        assert!(unit.munged_data().is_none());
    }

    #[test]
    fn test_unsupported_primitive_flashes_hardware_state() {
        let device = HeadlessDevice::new(DeviceCapabilities::triangles_only());
        let munger = device.munger();
        let lines = Geometry::new(
            PrimitiveType::Lines,
            Arc::new(GeomVertexData::from_points(vec![Vec3::ZERO, Vec3::X])),
        );
        let mut unit = unit_for(Arc::new(lines), RenderState::new());

        unit.munge_geom(&device, &munger, &TraversalContext::default());
        assert!(Arc::ptr_eq(unit.render_state(), &flash_hardware_state()));
    }

    #[test]
    fn test_vertex_animation_flash_alternates() {
        let device = HeadlessDevice::new(DeviceCapabilities::full());
        let munger = device.munger();
        let data = GeomVertexData::from_points(vec![Vec3::ZERO; 3])
            .with_column(
                InternalName::color(),
                Contents::Color,
                ColumnData::Float4(vec![Vec4::ONE; 3]),
            )
            .with_animation(AnimationType::Hardware);
        let geometry = Arc::new(Geometry::new(PrimitiveType::Triangles, Arc::new(data)));
        let config = Arc::new(CullConfig {
            show_vertex_animation: true,
            flash_rate: 2.0,
            ..CullConfig::default()
        });
        let mut unit = unit_for(geometry, RenderState::new());

        let ctx = TraversalContext::new(crate::SceneSetup::default(), config).with_frame_time(0.1);
        unit.munge_geom(&device, &munger, &ctx);
        assert!(Arc::ptr_eq(unit.render_state(), &flash_hardware_state()));

        let ctx = ctx.with_frame_time(0.6);
        unit.munge_geom(&device, &munger, &ctx);
        assert!(unit.render_state().is_empty());
    }
}
