//! Geometric transforms for the voxel → world → camera → image pipeline.
//!
//! Poses are 4×4 homogeneous rigid transforms (rotation `R`, translation
//! `t`).  A *camera-to-world* pose maps points expressed in the camera frame
//! into the world frame; [`invert`] / [`invert_rigid`] produce the
//! *world-to-camera* transform needed to reproject voxels into an image.
//!
//! Batch operations ([`transform_points`], [`project`]) are order-preserving
//! parallel maps: output row `i` always corresponds to input row `i`.
//!
//! # Example
//!
//! ```rust
//! use nalgebra::{Matrix3, Matrix4, Point3};
//! use voxfuse_perception::transform::{invert, project, transform_points};
//!
//! // Camera sits 1 m along +X of the world origin, same orientation.
//! let mut pose = Matrix4::<f32>::identity();
//! pose[(0, 3)] = 1.0;
//!
//! let world_to_camera = invert(&pose).unwrap();
//! let cam = transform_points(&world_to_camera, &[Point3::new(1.0, 0.0, 2.0)]);
//! assert!((cam[0].x).abs() < 1e-6);
//!
//! let k = Matrix3::new(100.0, 0.0, 32.0, 0.0, 100.0, 24.0, 0.0, 0.0, 1.0);
//! let uv = project(&k, &cam);
//! assert!((uv[0].x - 32.0).abs() < 1e-4);
//! ```

use nalgebra::{Matrix3, Matrix4, Point2, Point3};
use rayon::prelude::*;
use voxfuse_types::VoxError;

/// Maximum element-wise deviation tolerated by [`invert`] when checking that
/// the rotation block is orthonormal.
pub const ORTHONORMAL_TOLERANCE: f32 = 1e-3;

// ────────────────────────────────────────────────────────────────────────────
// Rigid transforms
// ────────────────────────────────────────────────────────────────────────────

/// Invert a rigid camera-to-world pose, validating it first.
///
/// The inverse is computed as `R⁻¹ = Rᵀ`, `t' = −Rᵀt`.
///
/// # Errors
///
/// Returns [`VoxError::InvalidTransform`] when the upper-left 3×3 block is
/// not a proper rotation (`RᵀR ≠ I` or `det R ≠ 1` beyond
/// [`ORTHONORMAL_TOLERANCE`]) or the bottom row is not `[0, 0, 0, 1]`.
pub fn invert(pose: &Matrix4<f32>) -> Result<Matrix4<f32>, VoxError> {
    let rotation: Matrix3<f32> = pose.fixed_view::<3, 3>(0, 0).into_owned();

    let deviation = (rotation.transpose() * rotation - Matrix3::identity()).amax();
    if !deviation.is_finite() || deviation > ORTHONORMAL_TOLERANCE {
        return Err(VoxError::InvalidTransform(format!(
            "rotation block is not orthonormal (max |RᵀR − I| = {deviation})"
        )));
    }

    let det = rotation.determinant();
    if (det - 1.0).abs() > ORTHONORMAL_TOLERANCE {
        return Err(VoxError::InvalidTransform(format!(
            "rotation block has determinant {det}, expected 1"
        )));
    }

    let bottom = [pose[(3, 0)], pose[(3, 1)], pose[(3, 2)], pose[(3, 3)] - 1.0];
    if bottom.iter().any(|v| v.abs() > ORTHONORMAL_TOLERANCE) {
        return Err(VoxError::InvalidTransform(
            "bottom row must be [0, 0, 0, 1]".to_string(),
        ));
    }

    Ok(invert_rigid(pose))
}

/// Invert a pose assumed to be rigid, without validation.
///
/// A non-rigid input silently produces a geometrically meaningless result.
pub fn invert_rigid(pose: &Matrix4<f32>) -> Matrix4<f32> {
    let rotation_t = pose.fixed_view::<3, 3>(0, 0).transpose();
    let translation = pose.fixed_view::<3, 1>(0, 3).into_owned();
    let inv_translation = -(rotation_t * translation);

    let mut inverse = Matrix4::identity();
    inverse.fixed_view_mut::<3, 3>(0, 0).copy_from(&rotation_t);
    inverse.fixed_view_mut::<3, 1>(0, 3).copy_from(&inv_translation);
    inverse
}

/// Apply a 4×4 transform to every point (homogeneous coordinate 1, dropped
/// afterwards without perspective division).
pub fn transform_points(transform: &Matrix4<f32>, points: &[Point3<f32>]) -> Vec<Point3<f32>> {
    points
        .par_iter()
        .map(|p| {
            let h = transform * p.to_homogeneous();
            Point3::new(h.x, h.y, h.z)
        })
        .collect()
}

// ────────────────────────────────────────────────────────────────────────────
// Pinhole camera
// ────────────────────────────────────────────────────────────────────────────

/// Integer pixel coordinate.  Signed so that projections falling left of or
/// above the image stay representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelCoord {
    /// Column.
    pub u: i64,
    /// Row.
    pub v: i64,
}

impl PixelCoord {
    pub fn new(u: i64, v: i64) -> Self {
        Self { u, v }
    }

    /// Nearest pixel to a continuous image coordinate (ties round to even).
    ///
    /// Non-finite coordinates saturate; callers screen them out through the
    /// depth test.
    pub fn nearest(uv: &Point2<f32>) -> Self {
        Self::new(uv.x.round_ties_even() as i64, uv.y.round_ties_even() as i64)
    }
}

/// Project camera-frame points through 3×3 intrinsics
/// `[[fu, 0, u0], [0, fv, v0], [0, 0, 1]]`:
///
/// ```text
/// u = fu · x / z + u0
/// v = fv · y / z + v0
/// ```
///
/// Points with `z ≤ 0` produce meaningless (possibly non-finite) results;
/// callers must treat them as invalid.
pub fn project(intrinsics: &Matrix3<f32>, camera_points: &[Point3<f32>]) -> Vec<Point2<f32>> {
    let (fu, fv) = (intrinsics[(0, 0)], intrinsics[(1, 1)]);
    let (u0, v0) = (intrinsics[(0, 2)], intrinsics[(1, 2)]);
    camera_points
        .par_iter()
        .map(|p| Point2::new(fu * p.x / p.z + u0, fv * p.y / p.z + v0))
        .collect()
}

/// Lift an image coordinate at a given depth back into the camera frame.
/// Inverse of [`project`] for `depth > 0`.
pub fn back_project(intrinsics: &Matrix3<f32>, u: f32, v: f32, depth: f32) -> Point3<f32> {
    let (fu, fv) = (intrinsics[(0, 0)], intrinsics[(1, 1)]);
    let (u0, v0) = (intrinsics[(0, 2)], intrinsics[(1, 2)]);
    Point3::new((u - u0) * depth / fu, (v - v0) * depth / fv, depth)
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
