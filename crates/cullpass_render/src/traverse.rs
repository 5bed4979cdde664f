//! # Traversal Context
//!
//! What the scene-graph walk hands the cull pass for each visible node: the
//! accumulated transforms and state, the camera setup, and the node's
//! drawable list. The walk itself lives outside this crate.

use std::sync::Arc;

use cullpass_shared::{Geometry, Mat4, RenderState, TransformState};

use crate::config::CullConfig;

/// Camera projection and viewport for the current pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneSetup {
    /// Eye-to-clip projection.
    pub projection: Mat4,
    /// Viewport width in pixels.
    pub viewport_width: f32,
    /// Viewport height in pixels.
    pub viewport_height: f32,
}

impl SceneSetup {
    /// Right-handed perspective camera with a vertical field of view.
    #[must_use]
    pub fn perspective(fov_y_radians: f32, width: f32, height: f32, near: f32, far: f32) -> Self {
        Self {
            projection: Mat4::perspective_rh(fov_y_radians, width / height, near, far),
            viewport_width: width,
            viewport_height: height,
        }
    }

    /// Right-handed orthographic camera spanning `half_height` above and
    /// below the view axis.
    #[must_use]
    pub fn orthographic(half_height: f32, width: f32, height: f32, near: f32, far: f32) -> Self {
        let half_width = half_height * width / height;
        Self {
            projection: Mat4::orthographic_rh(
                -half_width,
                half_width,
                -half_height,
                half_height,
                near,
                far,
            ),
            viewport_width: width,
            viewport_height: height,
        }
    }
}

impl Default for SceneSetup {
    fn default() -> Self {
        Self::perspective(std::f32::consts::FRAC_PI_3, 1920.0, 1080.0, 0.1, 1000.0)
    }
}

/// A scene node's drawable list.
#[derive(Debug, Clone, Default)]
pub struct DrawableNode {
    /// Node name for diagnostics.
    pub name: String,
    /// Geometry batches, each with the node-local state it is drawn with.
    pub geoms: Vec<(Arc<Geometry>, Arc<RenderState>)>,
}

impl DrawableNode {
    /// Creates an empty node.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            geoms: Vec::new(),
        }
    }

    /// Appends a geometry batch (builder style).
    #[must_use]
    pub fn with_geom(mut self, geometry: Arc<Geometry>, state: Arc<RenderState>) -> Self {
        self.geoms.push((geometry, state));
        self
    }

    /// Number of geometry batches.
    #[inline]
    #[must_use]
    pub fn num_geoms(&self) -> usize {
        self.geoms.len()
    }
}

/// Per-node traversal state.
#[derive(Debug, Clone)]
pub struct TraversalContext {
    /// Camera setup.
    pub scene: SceneSetup,
    /// Cull-pass tunables.
    pub config: Arc<CullConfig>,
    /// Model-to-world transform.
    pub net_transform: Arc<TransformState>,
    /// Model-to-eye transform.
    pub modelview_transform: Arc<TransformState>,
    /// State inherited from ancestors.
    pub state: Arc<RenderState>,
    /// Seconds since the start of rendering.
    pub frame_time: f64,
}

impl TraversalContext {
    /// Creates a context at the identity transform with an empty state.
    #[must_use]
    pub fn new(scene: SceneSetup, config: Arc<CullConfig>) -> Self {
        Self {
            scene,
            config,
            net_transform: TransformState::identity(),
            modelview_transform: TransformState::identity(),
            state: Arc::new(RenderState::new()),
            frame_time: 0.0,
        }
    }

    /// Sets both transforms (builder style).
    #[must_use]
    pub fn with_transforms(
        mut self,
        net_transform: Arc<TransformState>,
        modelview_transform: Arc<TransformState>,
    ) -> Self {
        self.net_transform = net_transform;
        self.modelview_transform = modelview_transform;
        self
    }

    /// Sets the inherited state (builder style).
    #[must_use]
    pub fn with_state(mut self, state: Arc<RenderState>) -> Self {
        self.state = state;
        self
    }

    /// Sets the frame time (builder style).
    #[must_use]
    pub fn with_frame_time(mut self, frame_time: f64) -> Self {
        self.frame_time = frame_time;
        self
    }
}

impl Default for TraversalContext {
    fn default() -> Self {
        Self::new(SceneSetup::default(), Arc::new(CullConfig::default()))
    }
}
