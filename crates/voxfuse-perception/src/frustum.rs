//! Camera view frustum in world coordinates.
//!
//! Used to size a volume before fusion: the union of the frusta of every
//! frame in a sequence bounds everything the camera could have seen.

use nalgebra::{Matrix3, Matrix4, Point3};
use ndarray::ArrayView2;

use crate::grid::VolumeBounds;
use crate::transform::{back_project, transform_points};

/// Largest finite depth in the image, or `0.0` when there is none.
pub fn max_depth(depth_image: &ArrayView2<'_, f32>) -> f32 {
    depth_image
        .iter()
        .copied()
        .filter(|d| d.is_finite())
        .fold(0.0, f32::max)
}

/// The camera centre followed by the four image corners back-projected to
/// the frame's maximum depth, all in world coordinates.
///
/// A frame without valid depth collapses to five copies of the camera
/// centre.
pub fn view_frustum(
    depth_image: ArrayView2<'_, f32>,
    intrinsics: &Matrix3<f32>,
    camera_pose: &Matrix4<f32>,
) -> [Point3<f32>; 5] {
    let (height, width) = depth_image.dim();
    let depth = max_depth(&depth_image);
    let (w, h) = (width as f32, height as f32);

    let camera_points = [
        Point3::origin(),
        back_project(intrinsics, 0.0, 0.0, depth),
        back_project(intrinsics, w, 0.0, depth),
        back_project(intrinsics, 0.0, h, depth),
        back_project(intrinsics, w, h, depth),
    ];
    let world = transform_points(camera_pose, &camera_points);
    [world[0], world[1], world[2], world[3], world[4]]
}

/// Bounds enclosing the frustum of one frame.
pub fn frustum_bounds(
    depth_image: ArrayView2<'_, f32>,
    intrinsics: &Matrix3<f32>,
    camera_pose: &Matrix4<f32>,
) -> Result<VolumeBounds, voxfuse_types::VoxError> {
    VolumeBounds::enclosing(&view_frustum(depth_image, intrinsics, camera_pose))
}
