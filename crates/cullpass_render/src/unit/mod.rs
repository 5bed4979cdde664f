//! # Draw Units
//!
//! A draw unit is one visible geometry batch, bundled with the render state
//! and transforms it is drawn with. Units own an optional chain of further
//! units through `next`; a chain is a base surface followed by the decals
//! stacked on it.
//!
//! Thousands of units live and die every frame, so chained units sit in
//! pooled blocks (see [`PooledUnit`]) and teardown walks the chain
//! iteratively.

mod pool;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use cullpass_shared::{AnimationType, Geometry, RenderState, TransformState};

use crate::munge::{MungedVertexData, Munger};
use crate::traverse::{DrawableNode, TraversalContext};

pub use pool::{reserve_unit_pool, unit_pool_stats, warm_unit_pool, PooledUnit};

// =============================================================================
// PROCESS-WIDE COUNTERS
// =============================================================================
static UNITS_EVER_ALLOCATED: AtomicU64 = AtomicU64::new(0);
static UNITS_EVER_CONSTRUCTED: AtomicU64 = AtomicU64::new(0);

/// Shared empty state; lets `Default` avoid allocating.
fn empty_state() -> Arc<RenderState> {
    static EMPTY: OnceLock<Arc<RenderState>> = OnceLock::new();
    Arc::clone(EMPTY.get_or_init(|| Arc::new(RenderState::new())))
}

/// What the cached munge result was produced from.
#[derive(Clone)]
pub(crate) struct MungeKey {
    pub(crate) source_geometry: Arc<Geometry>,
    pub(crate) source_state: Arc<RenderState>,
    pub(crate) source_modelview: Arc<TransformState>,
    pub(crate) output_geometry: Arc<Geometry>,
    /// State after munging, before any animation flash. `None` if munging failed.
    pub(crate) munged_state: Option<Arc<RenderState>>,
    pub(crate) animation: AnimationType,
    pub(crate) munger: Arc<dyn Munger>,
}

/// One geometry batch ready for the cull pass.
pub struct DrawUnit {
    pub(crate) geometry: Option<Arc<Geometry>>,
    pub(crate) munger: Option<Arc<dyn Munger>>,
    pub(crate) munged_data: Option<Arc<MungedVertexData>>,
    pub(crate) render_state: Arc<RenderState>,
    pub(crate) net_transform: Arc<TransformState>,
    pub(crate) modelview_transform: Arc<TransformState>,
    pub(crate) next: Option<PooledUnit>,
    pub(crate) munge_key: Option<MungeKey>,
}

impl DrawUnit {
    /// Builds a unit from explicit parts.
    #[must_use]
    pub fn new(
        geometry: Arc<Geometry>,
        state: Arc<RenderState>,
        net_transform: Arc<TransformState>,
        modelview_transform: Arc<TransformState>,
        next: Option<PooledUnit>,
    ) -> Self {
        Self::counted(Some(geometry), state, net_transform, modelview_transform, next)
    }

    /// Builds a unit for drawable `index` of `node`.
    ///
    /// The unit's state is the inherited state overridden by the drawable's
    /// own. An out-of-range index asserts in debug builds; release builds get
    /// a unit with no geometry, which every later step skips.
    #[must_use]
    pub fn from_node(
        ctx: &TraversalContext,
        node: &DrawableNode,
        index: usize,
        next: Option<PooledUnit>,
    ) -> Self {
        debug_assert!(
            index < node.num_geoms(),
            "geometry index {index} out of range for node `{}` with {} geoms",
            node.name,
            node.num_geoms()
        );
        let (geometry, render_state) = match node.geoms.get(index) {
            Some((geometry, own)) => (Some(Arc::clone(geometry)), compose_states(&ctx.state, own)),
            None => (None, Arc::clone(&ctx.state)),
        };
        Self::counted(
            geometry,
            render_state,
            Arc::clone(&ctx.net_transform),
            Arc::clone(&ctx.modelview_transform),
            next,
        )
    }

    /// An empty unit separating a chain's base units from its decals.
    #[must_use]
    pub fn separator(next: Option<PooledUnit>) -> Self {
        Self::counted(
            None,
            empty_state(),
            TransformState::identity(),
            TransformState::identity(),
            next,
        )
    }

    fn counted(
        geometry: Option<Arc<Geometry>>,
        render_state: Arc<RenderState>,
        net_transform: Arc<TransformState>,
        modelview_transform: Arc<TransformState>,
        next: Option<PooledUnit>,
    ) -> Self {
        UNITS_EVER_CONSTRUCTED.fetch_add(1, Ordering::Relaxed);
        Self {
            geometry,
            munger: None,
            munged_data: None,
            render_state,
            net_transform,
            modelview_transform,
            next,
            munge_key: None,
        }
    }

    /// Number of fresh unit blocks ever allocated by any thread's pool.
    ///
    /// Reused blocks are not counted, and the count never decreases.
    #[must_use]
    pub fn num_ever_allocated() -> u64 {
        UNITS_EVER_ALLOCATED.load(Ordering::Relaxed)
    }

    /// Number of units ever built through a constructor or `clone`.
    #[must_use]
    pub fn num_ever_constructed() -> u64 {
        UNITS_EVER_CONSTRUCTED.load(Ordering::Relaxed)
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    /// The geometry, or `None` for separators.
    #[inline]
    #[must_use]
    pub fn geometry(&self) -> Option<&Arc<Geometry>> {
        self.geometry.as_ref()
    }

    /// The munger used by the last munge.
    #[must_use]
    pub fn munger(&self) -> Option<&Arc<dyn Munger>> {
        self.munger.as_ref()
    }

    /// Device-ready vertex data, once munged.
    #[inline]
    #[must_use]
    pub fn munged_data(&self) -> Option<&Arc<MungedVertexData>> {
        self.munged_data.as_ref()
    }

    /// The render state.
    #[inline]
    #[must_use]
    pub fn render_state(&self) -> &Arc<RenderState> {
        &self.render_state
    }

    /// Model-to-world transform.
    #[inline]
    #[must_use]
    pub fn net_transform(&self) -> &Arc<TransformState> {
        &self.net_transform
    }

    /// Model-to-eye transform.
    #[inline]
    #[must_use]
    pub fn modelview_transform(&self) -> &Arc<TransformState> {
        &self.modelview_transform
    }

    /// True for chain separators.
    #[inline]
    #[must_use]
    pub fn is_separator(&self) -> bool {
        self.geometry.is_none()
    }

    /// Replaces the geometry and drops any munged data.
    pub fn set_geometry(&mut self, geometry: Option<Arc<Geometry>>) {
        self.invalidate_munge();
        self.geometry = geometry;
    }

    /// Replaces the render state and drops any munged data.
    ///
    /// A munged unit reverts to its source geometry and transform first, so
    /// the next munge starts from the original batch.
    pub fn set_render_state(&mut self, state: Arc<RenderState>) {
        self.invalidate_munge();
        self.render_state = state;
    }

    /// Replaces the model-to-eye transform and drops any munged data.
    ///
    /// A munged unit reverts to its source geometry and state first.
    pub fn set_modelview_transform(&mut self, transform: Arc<TransformState>) {
        self.invalidate_munge();
        self.modelview_transform = transform;
    }

    /// Restores the inputs the cached munge was built from, then forgets it.
    fn invalidate_munge(&mut self) {
        self.munged_data = None;
        if let Some(key) = self.munge_key.take() {
            self.geometry = Some(key.source_geometry);
            self.render_state = key.source_state;
            self.modelview_transform = key.source_modelview;
        }
    }

    // =========================================================================
    // DECAL CHAIN
    // =========================================================================

    /// True if another unit is chained after this one.
    #[inline]
    #[must_use]
    pub fn has_decals(&self) -> bool {
        self.next.is_some()
    }

    /// The next unit in the chain.
    #[must_use]
    pub fn next(&self) -> Option<&Self> {
        self.next.as_deref()
    }

    /// The next unit in the chain, mutably.
    pub fn next_mut(&mut self) -> Option<&mut Self> {
        self.next.as_deref_mut()
    }

    /// Replaces the rest of the chain, returning the old tail.
    pub fn set_next(&mut self, next: Option<PooledUnit>) -> Option<PooledUnit> {
        std::mem::replace(&mut self.next, next)
    }

    /// Detaches and returns the rest of the chain.
    pub fn take_next(&mut self) -> Option<PooledUnit> {
        self.next.take()
    }

    /// Number of units in the chain, this one included.
    #[must_use]
    pub fn chain_len(&self) -> usize {
        self.iter_chain().count()
    }

    /// Walks the chain starting at this unit.
    pub fn iter_chain(&self) -> impl Iterator<Item = &Self> {
        std::iter::successors(Some(self), |unit| unit.next())
    }

    /// Copies every field except the chain.
    fn clone_unlinked(&self) -> Self {
        UNITS_EVER_CONSTRUCTED.fetch_add(1, Ordering::Relaxed);
        Self {
            geometry: self.geometry.clone(),
            munger: self.munger.clone(),
            munged_data: self.munged_data.clone(),
            render_state: Arc::clone(&self.render_state),
            net_transform: Arc::clone(&self.net_transform),
            modelview_transform: Arc::clone(&self.modelview_transform),
            next: None,
            munge_key: self.munge_key.clone(),
        }
    }
}

/// `inherited` overridden by `own`, sharing an input when the other is empty.
fn compose_states(inherited: &Arc<RenderState>, own: &Arc<RenderState>) -> Arc<RenderState> {
    if inherited.is_empty() {
        Arc::clone(own)
    } else if own.is_empty() {
        Arc::clone(inherited)
    } else {
        Arc::new(inherited.compose(own))
    }
}

/// An uncounted empty unit; the contents of an idle pool block.
impl Default for DrawUnit {
    fn default() -> Self {
        Self {
            geometry: None,
            munger: None,
            munged_data: None,
            render_state: empty_state(),
            net_transform: TransformState::identity(),
            modelview_transform: TransformState::identity(),
            next: None,
            munge_key: None,
        }
    }
}

/// Shares every reference and gives the copy its own copy of the chain.
impl Clone for DrawUnit {
    fn clone(&self) -> Self {
        let mut head = self.clone_unlinked();
        let mut copies: Vec<Self> = self.iter_chain().skip(1).map(Self::clone_unlinked).collect();
        let mut next = None;
        while let Some(mut unit) = copies.pop() {
            unit.next = next;
            next = Some(PooledUnit::new(unit));
        }
        head.next = next;
        head
    }
}

impl Drop for DrawUnit {
    fn drop(&mut self) {
        // Unlink one unit at a time so a long chain never recurses.
        let mut next = self.next.take();
        while let Some(mut unit) = next {
            next = unit.take_next();
        }
    }
}

impl fmt::Debug for DrawUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DrawUnit")
            .field("geometry", &self.geometry)
            .field("munger", &self.munger.as_ref().map(|m| m.name()))
            .field("munged", &self.munged_data.is_some())
            .field("render_state", &self.render_state)
            .field("chain_len", &self.chain_len())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for DrawUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.geometry {
            Some(geometry) => write!(f, "{geometry}")?,
            None => f.write_str("(separator)")?,
        }
        write!(f, " {}", self.render_state)?;
        if let Some(munger) = &self.munger {
            write!(f, " munger={}", munger.name())?;
        }
        if let Some(data) = &self.munged_data {
            write!(f, " layout={}", data.layout())?;
        }
        if self.has_decals() {
            write!(f, " decals={}", self.chain_len() - 1)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cullpass_shared::{ColorAttrib, GeomVertexData, PrimitiveType, TransparencyMode, Vec3, Vec4};

    fn tri() -> Arc<Geometry> {
        Arc::new(Geometry::new(
            PrimitiveType::Triangles,
            Arc::new(GeomVertexData::from_points(vec![Vec3::ZERO, Vec3::X, Vec3::Y])),
        ))
    }

    fn unit(next: Option<PooledUnit>) -> DrawUnit {
        DrawUnit::new(
            tri(),
            Arc::new(RenderState::new()),
            TransformState::identity(),
            TransformState::identity(),
            next,
        )
    }

    fn chain(len: usize) -> DrawUnit {
        let mut next = None;
        for _ in 1..len {
            next = Some(PooledUnit::new(unit(next)));
        }
        unit(next)
    }

    #[test]
    fn test_has_decals_tracks_next() {
        let mut head = unit(None);
        assert!(!head.has_decals());
        assert_eq!(head.chain_len(), 1);

        head.set_next(Some(PooledUnit::new(unit(None))));
        assert!(head.has_decals());
        assert_eq!(head.chain_len(), 2);

        let tail = head.take_next();
        assert!(tail.is_some());
        assert!(!head.has_decals());
    }

    #[test]
    fn test_has_decals_for_every_length() {
        for len in 1..6 {
            let head = chain(len);
            assert_eq!(head.chain_len(), len);
            for (i, link) in head.iter_chain().enumerate() {
                assert_eq!(link.has_decals(), i + 1 < len);
            }
        }
    }

    #[test]
    fn test_from_node_composes_state() {
        let inherited = Arc::new(
            RenderState::new()
                .with_color(ColorAttrib::Flat(Vec4::ONE))
                .with_transparency(TransparencyMode::Alpha),
        );
        let own = Arc::new(RenderState::new().with_color(ColorAttrib::Vertex));
        let node = DrawableNode::new("decal").with_geom(tri(), own);
        let ctx = TraversalContext::default().with_state(inherited);

        let unit = DrawUnit::from_node(&ctx, &node, 0, None);
        assert!(unit.geometry().is_some());
        assert_eq!(unit.render_state().color(), Some(ColorAttrib::Vertex));
        assert_eq!(unit.render_state().transparency(), TransparencyMode::Alpha);
    }

    #[test]
    fn test_from_node_shares_state_when_nothing_inherited() {
        let own = Arc::new(RenderState::new().with_color(ColorAttrib::Vertex));
        let node = DrawableNode::new("n").with_geom(tri(), Arc::clone(&own));
        let unit = DrawUnit::from_node(&TraversalContext::default(), &node, 0, None);
        assert!(Arc::ptr_eq(unit.render_state(), &own));
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "out of range")]
    fn test_from_node_bad_index_asserts() {
        let node = DrawableNode::new("empty");
        let _ = DrawUnit::from_node(&TraversalContext::default(), &node, 3, None);
    }

    #[test]
    fn test_clone_deep_copies_chain() {
        const K: usize = 4;
        let geometry = tri();
        let state = Arc::new(RenderState::new());
        let transform = Arc::new(TransformState::from_translation(Vec3::Z));

        let mut next = None;
        for _ in 0..K {
            next = Some(PooledUnit::new(DrawUnit::new(
                Arc::clone(&geometry),
                Arc::clone(&state),
                Arc::clone(&transform),
                Arc::clone(&transform),
                next,
            )));
        }
        let original = next.unwrap();
        let mut copy = PooledUnit::new((*original).clone());
        assert_eq!(copy.chain_len(), K);

        // Shared references, separate chain.
        assert!(Arc::ptr_eq(original.geometry().unwrap(), copy.geometry().unwrap()));
        assert_eq!(Arc::strong_count(&geometry), 2 * K + 1);
        assert_eq!(Arc::strong_count(&transform), 4 * K + 1);
        let tail = copy.take_next();
        assert_eq!(original.chain_len(), K);
        assert_eq!(copy.chain_len(), 1);
        copy.set_next(tail);

        let before = unit_pool_stats();
        drop(original);
        drop(copy);
        let after = unit_pool_stats();

        assert_eq!(after.releases - before.releases, 2 * K as u64);
        assert_eq!(after.free_blocks - before.free_blocks, 2 * K);
        assert_eq!(Arc::strong_count(&geometry), 1);
        assert_eq!(Arc::strong_count(&state), 1);
        assert_eq!(Arc::strong_count(&transform), 1);
    }

    #[test]
    fn test_construction_counter() {
        let before = DrawUnit::num_ever_constructed();
        let head = chain(3);
        let _copy = head.clone();
        let _sep = DrawUnit::separator(None);
        let _idle = DrawUnit::default();
        assert!(DrawUnit::num_ever_constructed() >= before + 7);
    }

    #[test]
    fn test_long_chain_drops_without_recursion() {
        let head = chain(100_000);
        assert_eq!(head.chain_len(), 100_000);
        drop(head);
    }

    #[test]
    fn test_setters_invalidate_munged_data() {
        let mut unit = unit(None);
        unit.set_render_state(Arc::new(RenderState::new().with_color(ColorAttrib::Vertex)));
        assert!(unit.munged_data().is_none());
        unit.set_geometry(None);
        assert!(unit.is_separator());
    }

    #[test]
    fn test_display() {
        let head = unit(Some(PooledUnit::new(DrawUnit::separator(None))));
        assert_eq!(head.to_string(), "triangles: 1 primitives, 3 vertices {} decals=1");
        assert_eq!(DrawUnit::separator(None).to_string(), "(separator) {}");
    }
}
