//! Tangent-space light vectors.
//!
//! Normal-mapping stages on devices without the hardware path get a
//! per-vertex vector to the light, expressed in each vertex's
//! tangent/binormal/normal frame and stored as a texcoord set.

use std::sync::Arc;

use cullpass_shared::{
    ColumnData, Contents, Geometry, InternalName, RenderState, TexGenMode, TransformState, Vec3,
};

/// Fills every light-vector stage it can and removes those stages from the
/// state.
///
/// A stage is skipped, and left in the state, when no usable light exists or
/// the vertex data lacks a `normal` column or the tangent/binormal pair for
/// the stage's basis.
pub(crate) fn munge_texcoord_light_vector(
    geometry: &Geometry,
    state: &RenderState,
    net_transform: &TransformState,
) -> (Geometry, RenderState) {
    let source = geometry.vertex_data();
    let mut data = None;
    let mut new_state = state.clone();

    for entry in state.light_vector_stages() {
        let TexGenMode::LightVector { light, basis } = &entry.mode else {
            continue;
        };
        let Some(light) = light.as_ref().or_else(|| state.most_important_light()) else {
            tracing::trace!(stage = &*entry.stage.name, "no light for light-vector stage");
            continue;
        };
        let columns = (
            source.column(&InternalName::vertex()),
            source.column(&InternalName::normal()),
            source.column(&InternalName::tangent_name(basis)),
            source.column(&InternalName::binormal_name(basis)),
        );
        let (Some(vertex), Some(normal), Some(tangent), Some(binormal)) = columns else {
            tracing::trace!(stage = &*entry.stage.name, "missing tangent basis, stage skipped");
            continue;
        };

        let light_to_object = net_transform.invert_compose(&light.net_transform);
        let vectors: Vec<Vec3> = (0..source.num_rows())
            .map(|row| {
                let point = vertex.data.get3(row).unwrap_or_default();
                let Some(lv) = light.vector_to_light(point, light_to_object.mat()) else {
                    return Vec3::ZERO;
                };
                let t = tangent.data.get3(row).unwrap_or_default();
                let b = binormal.data.get3(row).unwrap_or_default();
                let n = normal.data.get3(row).unwrap_or_default();
                Vec3::new(lv.dot(t), lv.dot(b), lv.dot(n))
            })
            .collect();

        let current = data.take().unwrap_or_else(|| (**source).clone());
        data = Some(current.with_column(
            entry.stage.texcoord_name.clone(),
            Contents::TexCoord,
            ColumnData::Float3(vectors),
        ));
        new_state = new_state.remove_tex_gen_stage(&entry.stage.name);
    }

    let geometry = match data {
        Some(data) => geometry.replace_vertex_data(Arc::new(data)),
        None => geometry.clone(),
    };
    (geometry, new_state)
}
