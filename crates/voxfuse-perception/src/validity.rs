//! Per-frame voxel visibility and integration eligibility.
//!
//! Eligibility is decided in two independent passes over the voxel list:
//!
//! 1. [`is_observable`]: the voxel projects inside the image, lies in front
//!    of the camera (`z > 0`), and the depth image has data (non-zero) at
//!    its nearest pixel.
//! 2. [`is_within_truncation`]: the measured depth is positive and the voxel
//!    is not more than one truncation margin *behind* the observed surface.
//!
//! Voxels far in front of the surface pass the second test and contribute a
//! clamped `+1` through [`truncated_distance`].

use ndarray::ArrayView2;
use rayon::prelude::*;

use crate::transform::PixelCoord;

/// True when the pixel lies inside a `width × height` image and the voxel
/// is in front of the camera.
pub fn in_view(pixel: PixelCoord, z: f32, width: usize, height: usize) -> bool {
    z > 0.0
        && pixel.u >= 0
        && pixel.v >= 0
        && pixel.u < width as i64
        && pixel.v < height as i64
}

/// Measured depth at the voxel's pixel, or `0.0` (no data) when the voxel is
/// not [`in_view`].
pub fn sample_depth(depth_image: &ArrayView2<'_, f32>, pixel: PixelCoord, z: f32) -> f32 {
    let (height, width) = depth_image.dim();
    if in_view(pixel, z, width, height) {
        depth_image[[pixel.v as usize, pixel.u as usize]]
    } else {
        0.0
    }
}

/// First pass: in view and backed by depth data.
pub fn is_observable(depth_image: &ArrayView2<'_, f32>, pixel: PixelCoord, z: f32) -> bool {
    sample_depth(depth_image, pixel, z) != 0.0
}

/// First-pass mask over the full voxel list.
///
/// `pixels[i]` and `voxel_z[i]` describe voxel `i` in the current camera.
pub fn valid_points(
    depth_image: &ArrayView2<'_, f32>,
    pixels: &[PixelCoord],
    voxel_z: &[f32],
) -> Vec<bool> {
    debug_assert_eq!(pixels.len(), voxel_z.len());
    pixels
        .par_iter()
        .zip(voxel_z.par_iter())
        .map(|(&pixel, &z)| is_observable(depth_image, pixel, z))
        .collect()
}

/// Second pass: positive measurement, voxel at most `margin` behind it.
pub fn is_within_truncation(measured_depth: f32, voxel_z: f32, margin: f32) -> bool {
    measured_depth > 0.0 && measured_depth - voxel_z >= -margin
}

/// Signed distance from voxel to observed surface along the ray, in units of
/// `margin`, clamped to `[-1, 1]`.
pub fn truncated_distance(measured_depth: f32, voxel_z: f32, margin: f32) -> f32 {
    ((measured_depth - voxel_z) / margin).clamp(-1.0, 1.0)
}
