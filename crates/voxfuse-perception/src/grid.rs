//! Voxel grid geometry.
//!
//! A [`VoxelGrid`] discretises an axis-aligned [`VolumeBounds`] box into
//! cubic voxels of edge `voxel_size`.  The requested max corner is pushed
//! outward so that every axis spans a whole number of voxels; voxel `(0,0,0)`
//! sits at the min corner (the grid *origin*).
//!
//! Voxels are enumerated x-major, then y, then z (z fastest), which is also
//! the row-major storage order of the dense volumes in
//! [`volume`][crate::volume].
//!
//! # Example
//!
//! ```rust
//! use voxfuse_perception::grid::{VolumeBounds, VoxelGrid};
//!
//! let bounds = VolumeBounds::new([[0.0, 1.0], [0.0, 1.0], [0.0, 0.9]]).unwrap();
//! let grid = VoxelGrid::new(bounds, 0.5).unwrap();
//! assert_eq!(grid.dims(), [2, 2, 2]);
//! // z was rounded up from 0.9 to 1.0.
//! assert_eq!(grid.bounds().max().z, 1.0);
//! ```

use nalgebra::Point3;
use ndarray::ArrayView2;
use rayon::prelude::*;
use voxfuse_types::VoxError;

// ────────────────────────────────────────────────────────────────────────────
// VolumeBounds
// ────────────────────────────────────────────────────────────────────────────

/// An axis-aligned box in world units, stored as min/max per axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeBounds {
    min: [f32; 3],
    max: [f32; 3],
}

impl VolumeBounds {
    /// Build bounds from a 3×2 matrix: rows are x, y, z; columns are min, max.
    ///
    /// # Errors
    ///
    /// Returns [`VoxError::InvalidBounds`] if a value is not finite or if
    /// `max ≤ min` on any axis.
    pub fn new(rows: [[f32; 2]; 3]) -> Result<Self, VoxError> {
        const AXES: [&str; 3] = ["x", "y", "z"];
        for (axis, [lo, hi]) in AXES.iter().zip(rows) {
            if !lo.is_finite() || !hi.is_finite() {
                return Err(VoxError::InvalidBounds(format!(
                    "{axis} bounds [{lo}, {hi}] are not finite"
                )));
            }
            if hi <= lo {
                return Err(VoxError::InvalidBounds(format!(
                    "{axis} max {hi} must be greater than min {lo}"
                )));
            }
        }
        Ok(Self {
            min: [rows[0][0], rows[1][0], rows[2][0]],
            max: [rows[0][1], rows[1][1], rows[2][1]],
        })
    }

    /// Smallest bounds containing every point.
    ///
    /// Degenerate axes (all points sharing one coordinate) are widened by a
    /// millimetre so the result is still a valid box.
    ///
    /// # Errors
    ///
    /// Returns [`VoxError::InvalidBounds`] when `points` is empty or holds a
    /// non-finite coordinate.
    pub fn enclosing(points: &[Point3<f32>]) -> Result<Self, VoxError> {
        if points.is_empty() {
            return Err(VoxError::InvalidBounds(
                "cannot enclose an empty point set".to_string(),
            ));
        }
        let mut min = [f32::INFINITY; 3];
        let mut max = [f32::NEG_INFINITY; 3];
        for p in points {
            for axis in 0..3 {
                min[axis] = min[axis].min(p[axis]);
                max[axis] = max[axis].max(p[axis]);
            }
        }
        for axis in 0..3 {
            if max[axis] <= min[axis] {
                max[axis] = min[axis] + 1e-3;
            }
        }
        Self::new([[min[0], max[0]], [min[1], max[1]], [min[2], max[2]]])
    }

    /// Smallest bounds containing both boxes.
    pub fn union(&self, other: &Self) -> Self {
        let mut out = *self;
        for axis in 0..3 {
            out.min[axis] = out.min[axis].min(other.min[axis]);
            out.max[axis] = out.max[axis].max(other.max[axis]);
        }
        out
    }

    pub fn min(&self) -> Point3<f32> {
        Point3::from(self.min)
    }

    pub fn max(&self) -> Point3<f32> {
        Point3::from(self.max)
    }

    /// The bounds as a 3×2 `[[min, max]; 3]` matrix.
    pub fn rows(&self) -> [[f32; 2]; 3] {
        [
            [self.min[0], self.max[0]],
            [self.min[1], self.max[1]],
            [self.min[2], self.max[2]],
        ]
    }
}

impl TryFrom<ArrayView2<'_, f32>> for VolumeBounds {
    type Error = VoxError;

    fn try_from(matrix: ArrayView2<'_, f32>) -> Result<Self, Self::Error> {
        if matrix.dim() != (3, 2) {
            return Err(VoxError::InvalidBounds(format!(
                "expected a 3x2 matrix, got {}x{}",
                matrix.nrows(),
                matrix.ncols()
            )));
        }
        Self::new([
            [matrix[[0, 0]], matrix[[0, 1]]],
            [matrix[[1, 0]], matrix[[1, 1]]],
            [matrix[[2, 0]], matrix[[2, 1]]],
        ])
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Voxel coordinates
// ────────────────────────────────────────────────────────────────────────────

/// A voxel-space coordinate triple.
///
/// Integer voxel indices and fractional voxel-space positions (e.g.
/// marching-cubes vertices) both map to world space through
/// [`voxel_to_world`].
pub trait VoxelCoord: Copy + Send + Sync {
    fn to_f32(self) -> [f32; 3];
}

impl VoxelCoord for [usize; 3] {
    fn to_f32(self) -> [f32; 3] {
        [self[0] as f32, self[1] as f32, self[2] as f32]
    }
}

impl VoxelCoord for [f32; 3] {
    fn to_f32(self) -> [f32; 3] {
        self
    }
}

/// Map voxel-space coordinates to world points: `origin + coord * voxel_size`.
///
/// Every row is independent, so the map runs in parallel; the output keeps
/// the input order.  This runs over the full voxel list on every frame.
pub fn voxel_to_world<C: VoxelCoord>(
    origin: &Point3<f32>,
    voxel_coords: &[C],
    voxel_size: f32,
) -> Vec<Point3<f32>> {
    voxel_coords
        .par_iter()
        .map(|c| {
            let [x, y, z] = c.to_f32();
            Point3::new(
                origin.x + x * voxel_size,
                origin.y + y * voxel_size,
                origin.z + z * voxel_size,
            )
        })
        .collect()
}

// ────────────────────────────────────────────────────────────────────────────
// VoxelGrid
// ────────────────────────────────────────────────────────────────────────────

/// Dense grid sizing: voxel counts per axis, adjusted bounds and origin.
#[derive(Debug, Clone, PartialEq)]
pub struct VoxelGrid {
    bounds: VolumeBounds,
    voxel_size: f32,
    dims: [usize; 3],
}

impl VoxelGrid {
    /// Size a grid covering `bounds` with cubic voxels of edge `voxel_size`.
    ///
    /// Per axis, `dims = ceil((max − min) / voxel_size)` and the max corner
    /// is moved to `min + dims · voxel_size`.
    ///
    /// # Errors
    ///
    /// Returns [`VoxError::InvalidVoxelSize`] if `voxel_size` is not a
    /// positive finite number, and [`VoxError::InvalidBounds`] if the grid
    /// would hold more voxels than can be indexed.
    pub fn new(bounds: VolumeBounds, voxel_size: f32) -> Result<Self, VoxError> {
        if !(voxel_size.is_finite() && voxel_size > 0.0) {
            return Err(VoxError::InvalidVoxelSize(voxel_size));
        }

        let size = f64::from(voxel_size);
        let mut adjusted = bounds;
        let mut dims = [0usize; 3];
        for axis in 0..3 {
            let lo = f64::from(bounds.min[axis]);
            let hi = f64::from(bounds.max[axis]);
            let count = ((hi - lo) / size).ceil().max(1.0);
            if !(count < usize::MAX as f64) {
                return Err(unaddressable(count, axis));
            }
            dims[axis] = count as usize;
            adjusted.max[axis] = ((lo + count * size) as f32).max(bounds.max[axis]);
        }

        // The per-voxel color and coordinate arrays hold three values each,
        // and ndarray caps element counts at isize::MAX.
        let elements = dims
            .iter()
            .try_fold(3usize, |acc, &n| acc.checked_mul(n))
            .filter(|&n| n <= isize::MAX as usize);
        if elements.is_none() {
            return Err(VoxError::InvalidBounds(format!(
                "{} x {} x {} voxels cannot be addressed",
                dims[0], dims[1], dims[2]
            )));
        }

        Ok(Self {
            bounds: adjusted,
            voxel_size,
            dims,
        })
    }

    /// Voxel counts `[nx, ny, nz]`.
    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    pub fn voxel_count(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn voxel_size(&self) -> f32 {
        self.voxel_size
    }

    /// World-space location of voxel `(0, 0, 0)`.
    pub fn origin(&self) -> Point3<f32> {
        self.bounds.min()
    }

    /// Bounds after the max corner was snapped to a whole number of voxels.
    pub fn bounds(&self) -> &VolumeBounds {
        &self.bounds
    }

    /// Every voxel index, x-major then y then z.
    pub fn voxel_coords(&self) -> Vec<[usize; 3]> {
        let [nx, ny, nz] = self.dims;
        (0..nx)
            .flat_map(|x| (0..ny).flat_map(move |y| (0..nz).map(move |z| [x, y, z])))
            .collect()
    }

    /// Row-major offset of a voxel; equals its position in [`Self::voxel_coords`].
    pub fn flat_index(&self, [x, y, z]: [usize; 3]) -> usize {
        let [_, ny, nz] = self.dims;
        (x * ny + y) * nz + z
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

fn unaddressable(count: f64, axis: usize) -> VoxError {
    const AXES: [&str; 3] = ["x", "y", "z"];
    VoxError::InvalidBounds(format!(
        "{count:e} voxels along {} cannot be addressed",
        AXES[axis]
    ))
}
