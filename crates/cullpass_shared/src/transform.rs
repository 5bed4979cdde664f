//! Accumulated transforms and coordinate-system conventions.

use std::fmt;
use std::sync::{Arc, OnceLock};

use glam::{Mat4, Vec3};

/// Handedness and up-axis convention of eye space.
///
/// Decides which eye-space axis points away from the camera, which is the
/// axis depth sorting measures along.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CoordinateSystem {
    /// Y up, right-handed. The camera looks down -Z.
    #[default]
    YUpRight,
    /// Z up, right-handed. The camera looks down +Y.
    ZUpRight,
    /// Y up, left-handed. The camera looks down +Z.
    YUpLeft,
}

impl CoordinateSystem {
    /// Unit vector pointing away from the camera in eye space.
    #[inline]
    #[must_use]
    pub const fn forward(self) -> Vec3 {
        match self {
            Self::YUpRight => Vec3::NEG_Z,
            Self::ZUpRight => Vec3::Y,
            Self::YUpLeft => Vec3::Z,
        }
    }

    /// Unit vector pointing up in eye space.
    #[inline]
    #[must_use]
    pub const fn up(self) -> Vec3 {
        match self {
            Self::YUpRight | Self::YUpLeft => Vec3::Y,
            Self::ZUpRight => Vec3::Z,
        }
    }

    /// Unit vector pointing right in eye space.
    #[inline]
    #[must_use]
    pub const fn right(self) -> Vec3 {
        Vec3::X
    }

    /// Eye-space depth of a point: its distance along [`Self::forward`].
    ///
    /// This is the planar depth used by depth sorting, not the Euclidean
    /// distance to the eye.
    #[inline]
    #[must_use]
    pub fn depth_of(self, eye: Vec3) -> f32 {
        eye.dot(self.forward())
    }
}

/// An immutable accumulated transform.
///
/// Matrices are column-major and transform column vectors, so
/// `a.compose(&b)` applies `b` first.
#[derive(Clone, Copy, PartialEq)]
pub struct TransformState {
    mat: Mat4,
}

impl TransformState {
    /// Wraps a matrix.
    #[must_use]
    pub const fn from_mat(mat: Mat4) -> Self {
        Self { mat }
    }

    /// A pure translation.
    #[must_use]
    pub fn from_translation(translation: Vec3) -> Self {
        Self::from_mat(Mat4::from_translation(translation))
    }

    /// The shared identity transform.
    ///
    /// Every call returns a clone of the same `Arc`.
    #[must_use]
    pub fn identity() -> Arc<Self> {
        static IDENTITY: OnceLock<Arc<TransformState>> = OnceLock::new();
        Arc::clone(IDENTITY.get_or_init(|| Arc::new(Self::from_mat(Mat4::IDENTITY))))
    }

    /// Returns the matrix.
    #[inline]
    #[must_use]
    pub const fn mat(&self) -> &Mat4 {
        &self.mat
    }

    /// True if this transform is exactly the identity.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.mat == Mat4::IDENTITY
    }

    /// Returns `self * other`: `other` expressed in the space of `self`.
    #[must_use]
    pub fn compose(&self, other: &Self) -> Self {
        Self::from_mat(self.mat * other.mat)
    }

    /// Returns `self⁻¹ * other`: the transform from `other`'s space into
    /// `self`'s local space.
    #[must_use]
    pub fn invert_compose(&self, other: &Self) -> Self {
        Self::from_mat(self.mat.inverse() * other.mat)
    }

    /// Transforms a point (w = 1).
    #[inline]
    #[must_use]
    pub fn xform_point(&self, point: Vec3) -> Vec3 {
        self.mat.transform_point3(point)
    }

    /// Transforms a direction (w = 0).
    #[inline]
    #[must_use]
    pub fn xform_vec(&self, vector: Vec3) -> Vec3 {
        self.mat.transform_vector3(vector)
    }

    /// Length of the transformed unit vector along `axis`; the transform's
    /// scale in that direction.
    #[must_use]
    pub fn scale_along(&self, axis: Vec3) -> f32 {
        self.xform_vec(axis).length()
    }
}

impl Default for TransformState {
    fn default() -> Self {
        Self::from_mat(Mat4::IDENTITY)
    }
}

impl fmt::Debug for TransformState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_identity() {
            f.write_str("TransformState(identity)")
        } else {
            f.debug_tuple("TransformState").field(&self.mat).finish()
        }
    }
}
