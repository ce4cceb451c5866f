//! The TSDF volume and its per-frame integration.
//!
//! [`TsdfVolume`] owns three co-indexed dense volumes shaped after its
//! [`VoxelGrid`]:
//!
//! | Volume | Shape | Initial value |
//! |--------|-------|---------------|
//! | distance | `(nx, ny, nz)` | `1.0` (free space, nothing seen) |
//! | weight | `(nx, ny, nz)` | `0.0` |
//! | color | `(nx, ny, nz, 3)` | `0.0` (RGB) |
//!
//! [`TsdfVolume::integrate`] fuses one RGB-D frame:
//!
//! 1. every voxel is mapped to world and then camera coordinates;
//! 2. voxels are projected to their nearest pixel;
//! 3. the first-pass mask keeps voxels in view with depth data;
//! 4. the truncated signed distance is computed for those voxels;
//! 5. the second pass drops voxels far behind the observed surface;
//! 6. old values are gathered and fused with the observation;
//! 7. the results are scattered back into the volumes.
//!
//! # Example
//!
//! ```rust
//! use nalgebra::{Matrix3, Matrix4};
//! use ndarray::{Array2, Array3};
//! use voxfuse_perception::grid::VolumeBounds;
//! use voxfuse_perception::volume::TsdfVolume;
//!
//! let bounds = VolumeBounds::new([[0.0, 1.0], [0.0, 1.0], [0.0, 1.0]]).unwrap();
//! let mut volume = TsdfVolume::new(bounds, 0.5).unwrap();
//!
//! // Camera 0.1 m in front of the volume, looking along +Z at a wall 2 m away.
//! let mut pose = Matrix4::<f32>::identity();
//! pose[(0, 3)] = 0.25;
//! pose[(1, 3)] = 0.25;
//! pose[(2, 3)] = -0.1;
//! let k = Matrix3::new(1.0, 0.0, 10.0, 0.0, 1.0, 10.0, 0.0, 0.0, 1.0);
//! let depth = Array2::from_elem((20, 20), 2.0f32);
//! let color = Array3::from_elem((20, 20, 3), 128.0f32);
//!
//! let stats = volume.integrate(color.view(), depth.view(), &k, &pose, 1.0).unwrap();
//! assert_eq!(stats.integrated, 8);
//! ```

use nalgebra::{Matrix3, Matrix4};
use ndarray::{Array3, Array4, ArrayView2, ArrayView3, ArrayView4};
use rayon::prelude::*;
use tracing::{debug, info};
use voxfuse_types::{TriangleMesh, VoxError};

use crate::extraction::{IsoSurfaceExtractor, MarchingCubes};
use crate::fusion::{fuse_colors, fuse_tsdf};
use crate::grid::{VolumeBounds, VoxelGrid, voxel_to_world};
use crate::transform::{PixelCoord, invert_rigid, project, transform_points};
use crate::validity::{is_within_truncation, sample_depth, truncated_distance, valid_points};

/// Truncation margin in voxels.
pub const TRUNCATION_VOXELS: f32 = 2.0;

/// Iso-level of the surface inside the distance volume.
pub const SURFACE_LEVEL: f32 = 0.0;

// ────────────────────────────────────────────────────────────────────────────
// IntegrationStats
// ────────────────────────────────────────────────────────────────────────────

/// Voxel counts from one call to [`TsdfVolume::integrate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IntegrationStats {
    /// Voxels in the grid.
    pub voxels: usize,
    /// Voxels passing the first-pass (in view, depth present) test.
    pub candidates: usize,
    /// Voxels actually fused this frame.
    pub integrated: usize,
}

/// One eligible voxel of the current frame.
#[derive(Debug, Clone, Copy)]
struct Observation {
    index: usize,
    pixel: PixelCoord,
    distance: f32,
}

// ────────────────────────────────────────────────────────────────────────────
// TsdfVolume
// ────────────────────────────────────────────────────────────────────────────

/// Volumetric TSDF fusion of RGB-D frames into a dense voxel grid.
///
/// Construct with [`TsdfVolume::new`], feed frames in order through
/// [`TsdfVolume::integrate`], then call [`TsdfVolume::get_mesh`].
#[derive(Debug, Clone)]
pub struct TsdfVolume {
    grid: VoxelGrid,
    truncation_margin: f32,
    tsdf: Array3<f32>,
    weight: Array3<f32>,
    color: Array4<f32>,
    voxel_coords: Vec<[usize; 3]>,
}

impl TsdfVolume {
    /// Allocate a volume covering `bounds` with cubic voxels of `voxel_size`.
    ///
    /// # Errors
    ///
    /// Returns [`VoxError::InvalidVoxelSize`] if `voxel_size ≤ 0`.
    pub fn new(bounds: VolumeBounds, voxel_size: f32) -> Result<Self, VoxError> {
        let grid = VoxelGrid::new(bounds, voxel_size)?;
        let [nx, ny, nz] = grid.dims();
        info!(
            nx,
            ny,
            nz,
            voxels = grid.voxel_count(),
            voxel_size,
            "allocated TSDF volume"
        );

        Ok(Self {
            truncation_margin: TRUNCATION_VOXELS * voxel_size,
            tsdf: Array3::from_elem((nx, ny, nz), 1.0),
            weight: Array3::zeros((nx, ny, nz)),
            color: Array4::zeros((nx, ny, nz, 3)),
            voxel_coords: grid.voxel_coords(),
            grid,
        })
    }

    /// Allocate a volume from a 3×2 `[[min, max]; 3]` bounds matrix.
    ///
    /// # Errors
    ///
    /// Returns [`VoxError::InvalidBounds`] when the matrix is not 3×2 or an
    /// axis is empty, and [`VoxError::InvalidVoxelSize`] if `voxel_size ≤ 0`.
    pub fn from_bounds_matrix(bounds: ArrayView2<'_, f32>, voxel_size: f32) -> Result<Self, VoxError> {
        Self::new(VolumeBounds::try_from(bounds)?, voxel_size)
    }

    pub fn grid(&self) -> &VoxelGrid {
        &self.grid
    }

    /// Distance beyond which signed distances are clamped to ±1.
    pub fn truncation_margin(&self) -> f32 {
        self.truncation_margin
    }

    /// Every voxel index, in storage order.
    pub fn voxel_coords(&self) -> &[[usize; 3]] {
        &self.voxel_coords
    }

    /// The distance and color volumes.
    pub fn get_volume(&self) -> (ArrayView3<'_, f32>, ArrayView4<'_, f32>) {
        (self.tsdf.view(), self.color.view())
    }

    /// Accumulated observation weight per voxel.
    pub fn weights(&self) -> ArrayView3<'_, f32> {
        self.weight.view()
    }

    /// Fuse one RGB-D frame into the volume.
    ///
    /// - `color_image` – `h × w × 3` RGB, any non-negative float scale
    ///   (typically 0–255).
    /// - `depth_image` – `h × w` depth along the optical axis, in the same
    ///   units as the volume bounds; `0` means no measurement.
    /// - `intrinsics` – `[[fu, 0, u0], [0, fv, v0], [0, 0, 1]]`.
    /// - `camera_pose` – camera-to-world rigid transform.  It is not
    ///   validated; a non-rigid pose silently yields wrong geometry.
    /// - `observation_weight` – weight of this frame in the running average.
    ///
    /// A frame that sees none of the volume is a no-op.
    ///
    /// # Errors
    ///
    /// - [`VoxError::ImageShapeMismatch`] – color image is not `h × w × 3`
    ///   for the depth image's `h × w`.
    /// - [`VoxError::InvalidObservationWeight`] – weight not positive and finite.
    pub fn integrate(
        &mut self,
        color_image: ArrayView3<'_, f32>,
        depth_image: ArrayView2<'_, f32>,
        intrinsics: &Matrix3<f32>,
        camera_pose: &Matrix4<f32>,
        observation_weight: f32,
    ) -> Result<IntegrationStats, VoxError> {
        let (height, width) = depth_image.dim();
        if color_image.dim() != (height, width, 3) {
            return Err(VoxError::ImageShapeMismatch {
                depth_height: height,
                depth_width: width,
                color_shape: color_image.shape().to_vec(),
            });
        }
        if !(observation_weight.is_finite() && observation_weight > 0.0) {
            return Err(VoxError::InvalidObservationWeight(observation_weight));
        }

        // Voxel → world → camera → image.
        let world_points = voxel_to_world(
            &self.grid.origin(),
            &self.voxel_coords,
            self.grid.voxel_size(),
        );
        let camera_points = transform_points(&invert_rigid(camera_pose), &world_points);
        let voxel_z: Vec<f32> = camera_points.par_iter().map(|p| p.z).collect();
        let pixels: Vec<PixelCoord> = project(intrinsics, &camera_points)
            .par_iter()
            .map(PixelCoord::nearest)
            .collect();

        let candidates = valid_points(&depth_image, &pixels, &voxel_z);
        let candidate_count = candidates.iter().filter(|&&c| c).count();

        let margin = self.truncation_margin;
        let observations: Vec<Observation> = candidates
            .par_iter()
            .enumerate()
            .filter_map(|(index, &candidate)| {
                if !candidate {
                    return None;
                }
                let (pixel, z) = (pixels[index], voxel_z[index]);
                let measured = sample_depth(&depth_image, pixel, z);
                is_within_truncation(measured, z, margin).then(|| Observation {
                    index,
                    pixel,
                    distance: truncated_distance(measured, z, margin),
                })
            })
            .collect();

        let stats = IntegrationStats {
            voxels: self.voxel_coords.len(),
            candidates: candidate_count,
            integrated: observations.len(),
        };
        if observations.is_empty() {
            debug!(candidates = candidate_count, "frame observes no voxels; skipping");
            return Ok(stats);
        }

        self.fuse_observations(&observations, &color_image, observation_weight);
        debug!(
            candidates = stats.candidates,
            integrated = stats.integrated,
            "frame integrated"
        );
        Ok(stats)
    }

    /// Gather, fuse and scatter back the eligible voxels of one frame.
    fn fuse_observations(
        &mut self,
        observations: &[Observation],
        color_image: &ArrayView3<'_, f32>,
        observation_weight: f32,
    ) {
        let coords: Vec<[usize; 3]> = observations
            .iter()
            .map(|o| self.voxel_coords[o.index])
            .collect();

        let tsdf_old: Vec<f32> = coords.iter().map(|&c| self.tsdf[c]).collect();
        let w_old: Vec<f32> = coords.iter().map(|&c| self.weight[c]).collect();
        let color_old: Vec<[f32; 3]> = coords
            .iter()
            .map(|&[x, y, z]| [0usize, 1, 2].map(|ch| self.color[[x, y, z, ch]]))
            .collect();
        let color_new: Vec<[f32; 3]> = observations
            .iter()
            .map(|o| {
                let (u, v) = (o.pixel.u as usize, o.pixel.v as usize);
                [0usize, 1, 2].map(|ch| color_image[[v, u, ch]])
            })
            .collect();
        let observed: Vec<f32> = observations.iter().map(|o| o.distance).collect();

        let update = fuse_tsdf(&tsdf_old, &observed, &w_old, observation_weight);
        let colors = fuse_colors(&color_old, &color_new, &w_old, &update, observation_weight);

        for (i, &[x, y, z]) in coords.iter().enumerate() {
            self.tsdf[[x, y, z]] = update.distance[i];
            self.weight[[x, y, z]] = update.weight[i];
            for (ch, value) in colors[i].into_iter().enumerate() {
                self.color[[x, y, z, ch]] = value;
            }
        }
    }

    /// Extract the zero level set as a colored triangle mesh using
    /// [`MarchingCubes`].
    ///
    /// An unobserved volume (no zero crossing) yields an empty mesh.
    pub fn get_mesh(&self) -> Result<TriangleMesh, VoxError> {
        self.extract_mesh_with(&MarchingCubes)
    }

    /// Extract the zero level set with a custom extractor.
    ///
    /// Vertex positions are mapped from voxel space to world space; each
    /// vertex takes the color of its nearest voxel, floored to `u8`.
    pub fn extract_mesh_with(
        &self,
        extractor: &dyn IsoSurfaceExtractor,
    ) -> Result<TriangleMesh, VoxError> {
        let surface = extractor.extract(self.tsdf.view(), SURFACE_LEVEL)?;
        debug!(
            vertices = surface.vertices.len(),
            triangles = surface.triangles.len(),
            "extracted iso-surface"
        );

        let points = voxel_to_world(
            &self.grid.origin(),
            &surface.vertices,
            self.grid.voxel_size(),
        )
        .into_iter()
        .map(|p| [p.x, p.y, p.z])
        .collect();
        let colors = surface
            .vertices
            .iter()
            .map(|v| self.nearest_voxel_color(*v))
            .collect();

        TriangleMesh::new(points, Some(surface.normals), Some(colors), surface.triangles)
    }

    /// Surface vertices with their colors and no faces.
    pub fn get_point_cloud(&self) -> Result<TriangleMesh, VoxError> {
        let mesh = self.get_mesh()?;
        TriangleMesh::new(mesh.points, None, mesh.colors, Vec::new())
    }

    /// Color of the voxel nearest to a voxel-space position.
    fn nearest_voxel_color(&self, position: [f32; 3]) -> [u8; 3] {
        let dims = self.grid.dims();
        let [x, y, z] = [0usize, 1, 2].map(|axis| {
            let max = (dims[axis] - 1) as f32;
            position[axis].round_ties_even().clamp(0.0, max) as usize
        });
        [0usize, 1, 2].map(|ch| self.color[[x, y, z, ch]].floor() as u8)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::IsoSurface;
    use approx::assert_relative_eq;
    use nalgebra::{Isometry3, Vector3};
    use ndarray::{Array2, array};
    use std::f32::consts::PI;

    const IMAGE: usize = 20;

    fn unit_volume() -> TsdfVolume {
        let bounds = VolumeBounds::new([[0.0, 1.0], [0.0, 1.0], [0.0, 1.0]]).unwrap();
        TsdfVolume::new(bounds, 0.5).unwrap()
    }

    /// Pinhole camera with unit focal length centred in a 20×20 image.
    fn intrinsics() -> Matrix3<f32> {
        Matrix3::new(1.0, 0.0, 10.0, 0.0, 1.0, 10.0, 0.0, 0.0, 1.0)
    }

    /// Camera looking along world +Z from `(x, y, z)`.
    fn pose_at(x: f32, y: f32, z: f32) -> Matrix4<f32> {
        let mut pose = Matrix4::identity();
        pose[(0, 3)] = x;
        pose[(1, 3)] = y;
        pose[(2, 3)] = z;
        pose
    }

    fn depth(value: f32) -> Array2<f32> {
        Array2::from_elem((IMAGE, IMAGE), value)
    }

    fn color(rgb: [f32; 3]) -> Array3<f32> {
        Array3::from_shape_fn((IMAGE, IMAGE, 3), |(_, _, ch)| rgb[ch])
    }

    // ── Construction ────────────────────────────────────────────────────────

    #[test]
    fn new_rejects_unaddressable_grid() {
        let bounds = VolumeBounds::new([[0.0, 1e4], [0.0, 1e4], [0.0, 1e4]]).unwrap();
        let err = TsdfVolume::new(bounds, 1e-3).unwrap_err();
        assert!(matches!(err, VoxError::InvalidBounds(_)));
    }

    #[test]
    fn new_volume_is_unobserved() {
        let volume = unit_volume();
        let (tsdf, colors) = volume.get_volume();
        assert_eq!(tsdf.dim(), (2, 2, 2));
        assert_eq!(colors.dim(), (2, 2, 2, 3));
        assert!(tsdf.iter().all(|&d| d == 1.0));
        assert!(volume.weights().iter().all(|&w| w == 0.0));
        assert!(colors.iter().all(|&c| c == 0.0));
        assert_eq!(volume.truncation_margin(), 1.0);
        assert_eq!(volume.voxel_coords().len(), 8);
    }

    #[test]
    fn bounds_matrix_must_be_three_by_two() {
        let bad = array![[0.0f32, 1.0], [0.0, 1.0]];
        assert!(matches!(
            TsdfVolume::from_bounds_matrix(bad.view(), 0.5),
            Err(VoxError::InvalidBounds(_))
        ));
        let good = array![[0.0f32, 1.0], [0.0, 1.0], [0.0, 1.0]];
        let volume = TsdfVolume::from_bounds_matrix(good.view(), 0.5).unwrap();
        assert_eq!(volume.grid().dims(), [2, 2, 2]);
    }

    #[test]
    fn non_positive_voxel_size_is_rejected() {
        let bounds = VolumeBounds::new([[0.0, 1.0], [0.0, 1.0], [0.0, 1.0]]).unwrap();
        assert!(matches!(
            TsdfVolume::new(bounds, 0.0),
            Err(VoxError::InvalidVoxelSize(_))
        ));
    }

    // ── Integration ─────────────────────────────────────────────────────────

    #[test]
    fn free_space_frame_then_plane_frame() {
        let mut volume = unit_volume();
        let pose = pose_at(0.25, 0.25, -0.1);

        // Wall 2 m from the camera: every voxel is ≥ one margin in front.
        let stats = volume
            .integrate(color([100.0; 3]).view(), depth(2.0).view(), &intrinsics(), &pose, 1.0)
            .unwrap();
        assert_eq!(stats, IntegrationStats { voxels: 8, candidates: 8, integrated: 8 });
        assert!(volume.get_volume().0.iter().all(|&d| d == 1.0));
        assert!(volume.weights().iter().all(|&w| w == 1.0));

        // Plane at world z = 0.5, i.e. 0.6 m from the camera.
        volume
            .integrate(color([200.0; 3]).view(), depth(0.6).view(), &intrinsics(), &pose, 1.0)
            .unwrap();
        let (tsdf, colors) = volume.get_volume();
        for x in 0..2 {
            for y in 0..2 {
                // On the plane: observation 0 averaged with the earlier +1.
                assert_relative_eq!(tsdf[[x, y, 1]], 0.5, epsilon = 1e-5);
                // 0.5 m in front of the plane with a 1 m margin: observation 0.5.
                assert_relative_eq!(tsdf[[x, y, 0]], 0.75, epsilon = 1e-5);
                assert_eq!(colors[[x, y, 1, 0]], 150.0);
            }
        }
        assert!(volume.weights().iter().all(|&w| w == 2.0));
    }

    #[test]
    fn observation_weight_scales_accumulated_weight() {
        let mut volume = unit_volume();
        let pose = pose_at(0.25, 0.25, -0.1);
        for _ in 0..2 {
            volume
                .integrate(color([0.0; 3]).view(), depth(0.6).view(), &intrinsics(), &pose, 0.5)
                .unwrap();
        }
        assert!(volume.weights().iter().all(|&w| w == 1.0));
    }

    #[test]
    fn camera_facing_away_is_a_no_op() {
        let mut volume = unit_volume();
        // Rotate 180° about X: the camera now looks along world −Z.
        let pose =
            Isometry3::new(Vector3::new(0.25, 0.25, -0.1), Vector3::x() * PI).to_homogeneous();
        let stats = volume
            .integrate(color([50.0; 3]).view(), depth(1.0).view(), &intrinsics(), &pose, 1.0)
            .unwrap();
        assert_eq!(stats.candidates, 0);
        assert_eq!(stats.integrated, 0);
        assert!(volume.weights().iter().all(|&w| w == 0.0));
        assert!(volume.get_volume().0.iter().all(|&d| d == 1.0));
    }

    #[test]
    fn missing_depth_is_a_no_op() {
        let mut volume = unit_volume();
        let stats = volume
            .integrate(
                color([50.0; 3]).view(),
                depth(0.0).view(),
                &intrinsics(),
                &pose_at(0.25, 0.25, -0.1),
                1.0,
            )
            .unwrap();
        assert_eq!(stats.integrated, 0);
        assert!(volume.weights().iter().all(|&w| w == 0.0));
    }

    #[test]
    fn voxels_far_behind_surface_are_not_updated() {
        let bounds = VolumeBounds::new([[0.0, 1.0], [0.0, 1.0], [0.0, 2.0]]).unwrap();
        let mut volume = TsdfVolume::new(bounds, 0.25).unwrap();
        assert_eq!(volume.truncation_margin(), 0.5);

        let pose = pose_at(0.5, 0.5, -0.1);
        volume
            .integrate(color([10.0; 3]).view(), depth(0.4).view(), &intrinsics(), &pose, 1.0)
            .unwrap();

        let weights = volume.weights();
        let tsdf = volume.get_volume().0;
        for z in 0..8 {
            let world_z = z as f32 * 0.25;
            let expected_weight = if world_z + 0.1 <= 0.9 { 1.0 } else { 0.0 };
            for x in 0..4 {
                for y in 0..4 {
                    assert_eq!(weights[[x, y, z]], expected_weight, "voxel ({x},{y},{z})");
                    assert!(tsdf[[x, y, z]] >= -1.0 && tsdf[[x, y, z]] <= 1.0);
                }
            }
        }
    }

    #[test]
    fn partially_visible_frame_updates_only_visible_voxels() {
        let mut volume = unit_volume();
        // Depth present only in the left half of the image.
        let mut d = depth(2.0);
        d.slice_mut(ndarray::s![.., 10..]).fill(0.0);
        volume
            .integrate(color([1.0; 3]).view(), d.view(), &intrinsics(), &pose_at(0.25, 0.25, -0.1), 1.0)
            .unwrap();
        let weights = volume.weights();
        // Near layer: x = 0 lands on column 8, x = 1 on column 12.
        // Far layer: both land on column 10, which has no depth.
        for y in 0..2 {
            assert_eq!(weights[[0, y, 0]], 1.0);
            assert_eq!(weights[[1, y, 0]], 0.0);
            assert_eq!(weights[[0, y, 1]], 0.0);
            assert_eq!(weights[[1, y, 1]], 0.0);
        }
    }

    #[test]
    fn mismatched_color_image_is_rejected() {
        let mut volume = unit_volume();
        let small = Array3::<f32>::zeros((IMAGE, IMAGE / 2, 3));
        let err = volume
            .integrate(small.view(), depth(1.0).view(), &intrinsics(), &Matrix4::identity(), 1.0)
            .unwrap_err();
        assert!(matches!(err, VoxError::ImageShapeMismatch { .. }));
    }

    #[test]
    fn non_positive_observation_weight_is_rejected() {
        let mut volume = unit_volume();
        for w in [0.0, -1.0, f32::NAN] {
            let err = volume
                .integrate(color([0.0; 3]).view(), depth(1.0).view(), &intrinsics(), &Matrix4::identity(), w)
                .unwrap_err();
            assert!(matches!(err, VoxError::InvalidObservationWeight(_)));
        }
    }

    // ── Extraction ──────────────────────────────────────────────────────────

    #[test]
    fn unobserved_volume_has_no_triangles() {
        let mesh = unit_volume().get_mesh().unwrap();
        assert!(mesh.triangles.is_empty());
        assert!(mesh.points.is_empty());
    }

    /// Returns a fixed surface so world mapping and coloring can be checked
    /// independently of any triangulation algorithm.
    struct FixedSurface(IsoSurface);

    impl IsoSurfaceExtractor for FixedSurface {
        fn extract(&self, _: ArrayView3<'_, f32>, _: f32) -> Result<IsoSurface, VoxError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn mesh_vertices_map_to_world_and_nearest_voxel_color() {
        let bounds = VolumeBounds::new([[-1.0, 1.0], [0.0, 2.0], [0.0, 2.0]]).unwrap();
        let mut volume = TsdfVolume::new(bounds, 0.5).unwrap();
        volume.color[[1, 2, 3, 0]] = 200.7;
        volume.color[[1, 2, 3, 1]] = 10.2;
        volume.color[[1, 2, 3, 2]] = 99.9;

        let extractor = FixedSurface(IsoSurface {
            vertices: vec![[1.4, 2.0, 2.6], [0.0, 0.0, 0.0], [-0.3, 9.0, 3.0]],
            normals: vec![[0.0, 0.0, 1.0]; 3],
            triangles: vec![[0, 1, 2]],
        });
        let mesh = volume.extract_mesh_with(&extractor).unwrap();

        // Fractional voxel coordinates keep their exact position.
        assert_relative_eq!(mesh.points[0][0], -1.0 + 1.4 * 0.5, epsilon = 1e-6);
        assert_relative_eq!(mesh.points[0][1], 1.0, epsilon = 1e-6);
        assert_relative_eq!(mesh.points[0][2], 1.3, epsilon = 1e-6);
        assert_eq!(mesh.points[1], [-1.0, 0.0, 0.0]);

        let colors = mesh.colors.unwrap();
        assert_eq!(colors[0], [200, 10, 99]);
        assert_eq!(colors[1], [0, 0, 0]);
        // Out-of-grid coordinates clamp to the nearest edge voxel.
        assert_eq!(colors[2], [0, 0, 0]);
        assert_eq!(mesh.triangles, vec![[0, 1, 2]]);
        assert_eq!(mesh.normals.unwrap().len(), 3);
    }

    #[test]
    fn observed_plane_produces_a_mesh() {
        let bounds = VolumeBounds::new([[0.0, 1.0], [0.0, 1.0], [0.0, 1.0]]).unwrap();
        let mut volume = TsdfVolume::new(bounds, 0.125).unwrap();
        let k = Matrix3::new(5.0, 0.0, 10.0, 0.0, 5.0, 10.0, 0.0, 0.0, 1.0);
        // Wall at world z = 0.5 seen from 1 m in front of the volume.
        volume
            .integrate(
                color([90.0, 120.0, 30.0]).view(),
                depth(1.5).view(),
                &k,
                &pose_at(0.5, 0.5, -1.0),
                1.0,
            )
            .unwrap();

        let mesh = volume.get_mesh().unwrap();
        assert!(!mesh.triangles.is_empty());
        assert_eq!(mesh.points.len(), mesh.colors.as_ref().unwrap().len());
        assert_eq!(mesh.points.len(), mesh.normals.as_ref().unwrap().len());

        let cloud = volume.get_point_cloud().unwrap();
        assert_eq!(cloud.points, mesh.points);
        assert!(cloud.triangles.is_empty());
        assert!(cloud.normals.is_none());
    }
}
