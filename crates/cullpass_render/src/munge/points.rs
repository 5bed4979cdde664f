//! # Point-to-Quad Expansion
//!
//! Devices that cannot draw thick, perspective-sized, rotated or sprite
//! points get each point expanded to a two-triangle quad on the CPU.
//!
//! The quads are emitted directly in clip space, sorted back to front so
//! alpha-blended sprites composite correctly, and the unit's modelview is
//! reset to identity afterwards.

use std::sync::Arc;

use cullpass_shared::{
    ColumnData, Contents, GeomVertexData, Geometry, InternalName, PrimitiveType, RenderState,
    TexGenMode, TransformState, Vec2, Vec3, Vec4, VertexDataError,
};

use crate::device::GraphicsDevice;
use crate::error::{MungeError, MungeResult};
use crate::traverse::TraversalContext;

/// Eye-space position and depth of one point, parallel to the point list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointData {
    /// Eye-space position.
    pub eye: Vec3,
    /// Depth along the device's forward axis.
    pub dist: f32,
}

/// Sorts `order` (indices into `points`) farthest first.
///
/// The sort is stable: points at equal depth keep their relative order.
///
/// # Panics
///
/// Panics if an entry of `order` is not a valid index into `points`.
pub fn sort_back_to_front(points: &[PointData], order: &mut [usize]) {
    order.sort_by(|&a, &b| points[b].dist.total_cmp(&points[a].dist));
}

/// Sprite texcoords for corners v0..v3.
const SPRITE_UVS: [Vec2; 4] = [
    Vec2::new(1.0, 1.0),
    Vec2::new(0.0, 1.0),
    Vec2::new(1.0, 0.0),
    Vec2::new(0.0, 0.0),
];

/// Per-point corner offsets `c0`, `c1` in the (right, up) plane, rotated by
/// `degrees` counterclockwise. Corners are `p+c0, p+c1, p-c1, p-c0`.
fn corner_offsets(half_width: f32, half_height: f32, degrees: f32) -> [Vec2; 2] {
    let rotation = Vec2::from_angle(degrees.to_radians());
    [
        rotation.rotate(Vec2::new(half_width, half_height)),
        rotation.rotate(Vec2::new(-half_width, half_height)),
    ]
}

/// Expands the points of `geometry` into clip-space quads.
///
/// Returns the triangle geometry and the state with point-sprite texgen
/// stages removed (their texcoords are now baked in).
pub(crate) fn munge_points_to_quads<D: GraphicsDevice + ?Sized>(
    geometry: &Geometry,
    state: &RenderState,
    modelview: &TransformState,
    device: &D,
    ctx: &TraversalContext,
) -> MungeResult<(Geometry, RenderState)> {
    let data = geometry.vertex_data();
    let vertices = &data
        .column(&InternalName::vertex())
        .ok_or(VertexDataError::MissingVertexColumn)?
        .data;
    let sizes = data.column(&InternalName::size()).map(|c| &c.data);
    let aspects = data.column(&InternalName::aspect_ratio()).map(|c| &c.data);
    let rotations = data.column(&InternalName::rotate()).map(|c| &c.data);
    let normals = data.column(&InternalName::normal()).map(|c| &c.data);
    let colors = data
        .columns()
        .iter()
        .find(|c| c.contents == Contents::Color)
        .map(|c| &c.data);
    let sprite_texcoord = state.point_sprite_texcoord();

    let rows: Vec<usize> = geometry.vertex_list().iter().map(|&i| i as usize).collect();
    let num_quad_vertices = rows.len() * 4;
    if u32::try_from(num_quad_vertices).is_err() {
        return Err(MungeError::TooManyVertices {
            count: num_quad_vertices,
            limit: u32::MAX as usize,
        });
    }

    // Depth of every point, then the back-to-front permutation.
    let points: Vec<PointData> = rows
        .iter()
        .map(|&row| {
            let eye = modelview.xform_point(vertices.get3(row).unwrap_or_default());
            PointData {
                eye,
                dist: device.compute_distance_to(eye),
            }
        })
        .collect();
    let mut order: Vec<usize> = (0..points.len()).collect();
    sort_back_to_front(&points, &mut order);

    let coords = device.capabilities().coordinate_system;
    let (right, up) = (coords.right(), coords.up());
    let scene = &ctx.scene;
    let mode = state.render_mode();
    let world_scale = modelview.scale_along(up);

    let mut out_vertices = Vec::with_capacity(num_quad_vertices);
    let mut out_normals = normals.map(|_| Vec::with_capacity(num_quad_vertices));
    let mut out_colors = colors.map(|_| Vec::with_capacity(num_quad_vertices));
    let mut out_uvs = sprite_texcoord.map(|_| Vec::with_capacity(num_quad_vertices));
    let mut indices = Vec::with_capacity(rows.len() * 6);

    for (quad, &i) in order.iter().enumerate() {
        let row = rows[i];
        let point = points[i];
        let size = sizes.and_then(|c| c.get1(row)).unwrap_or(mode.thickness);
        let aspect = aspects.and_then(|c| c.get1(row)).unwrap_or(1.0);
        let degrees = rotations.and_then(|c| c.get1(row)).unwrap_or(0.0);

        let half_height = size * 0.5;
        let [c0, c1] = corner_offsets(half_height * aspect, half_height, degrees);
        let center = scene.projection * point.eye.extend(1.0);

        let corner = |offset: Vec2| -> Vec4 {
            if mode.perspective {
                // World-sized: offset in eye space, then project.
                let eye_offset = (right * offset.x + up * offset.y) * world_scale;
                scene.projection * (point.eye + eye_offset).extend(1.0)
            } else {
                // Pixel-sized: offset in NDC, scaled by w to stay in clip space.
                let ndc = Vec2::new(
                    offset.x * 2.0 / scene.viewport_width,
                    offset.y * 2.0 / scene.viewport_height,
                );
                center + (ndc * center.w).extend(0.0).extend(0.0)
            }
        };
        out_vertices.extend([corner(c0), corner(c1), corner(-c1), corner(-c0)]);

        if let (Some(out), Some(column)) = (out_normals.as_mut(), normals) {
            let n = modelview
                .xform_vec(column.get3(row).unwrap_or_default())
                .normalize_or_zero();
            out.extend([n; 4]);
        }
        if let (Some(out), Some(column)) = (out_colors.as_mut(), colors) {
            out.extend([column.get4(row, Vec4::W).unwrap_or(Vec4::ONE); 4]);
        }
        if let Some(out) = out_uvs.as_mut() {
            out.extend(SPRITE_UVS);
        }

        // Bounded by the u32 check above.
        #[allow(clippy::cast_possible_truncation)]
        let base = (quad * 4) as u32;
        indices.extend([base, base + 1, base + 2, base + 2, base + 1, base + 3]);
    }

    let mut quads = GeomVertexData::new()
        .with_animation(data.animation())
        .with_column(
            InternalName::vertex(),
            Contents::ClipPoint,
            ColumnData::Float4(out_vertices),
        );
    if let Some(out) = out_normals {
        quads = quads.with_column(InternalName::normal(), Contents::Vector, ColumnData::Float3(out));
    }
    if let Some(out) = out_colors {
        quads = quads.with_column(InternalName::color(), Contents::Color, ColumnData::Float4(out));
    }
    if let (Some(out), Some(name)) = (out_uvs, sprite_texcoord) {
        quads = quads.with_column(name.clone(), Contents::TexCoord, ColumnData::Float2(out));
    }

    let mut new_state = state.clone();
    for entry in state.tex_gen() {
        if entry.mode == TexGenMode::PointSprite {
            new_state = new_state.remove_tex_gen_stage(&entry.stage.name);
        }
    }

    tracing::debug!(points = points.len(), "expanded points to quads");
    let triangles = Geometry::new(PrimitiveType::Triangles, Arc::new(quads)).with_indices(indices);
    Ok((triangles, new_state))
}
