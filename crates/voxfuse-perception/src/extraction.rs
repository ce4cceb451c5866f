//! Iso-surface extraction seam.
//!
//! The fusion core does not triangulate surfaces itself; it hands the
//! distance volume to an [`IsoSurfaceExtractor`].  [`MarchingCubes`] is the
//! default extractor and delegates to the `mcubes` crate.
//!
//! Extractors work in *voxel-index space*: a vertex at `[1.5, 0.0, 2.0]`
//! lies halfway between voxels `(1,0,2)` and `(2,0,2)`.  Conversion to world
//! coordinates and vertex coloring happen in
//! [`TsdfVolume::extract_mesh_with`][crate::volume::TsdfVolume::extract_mesh_with].
//!
//! Surfaces are single-sided and indexed: each crossing is triangulated once,
//! vertices on a shared cube edge are stored once, and normals point toward
//! increasing field values (free space for a TSDF).  Triangles wind
//! counter-clockwise when seen from the side their normals point to.

use std::collections::HashMap;

use lin_alg::f32::Vec3 as McVec3;
use mcubes::MeshSide;
use nalgebra::Vector3;
use ndarray::ArrayView3;
use voxfuse_types::VoxError;

/// Weld grid resolution: vertices closer than this fraction of a voxel merge.
const WELD_STEPS_PER_VOXEL: f32 = 1024.0;

/// Triangulated iso-surface in voxel-index space.
///
/// Triangles index into `vertices`; a vertex is shared by every triangle
/// that touches it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IsoSurface {
    pub vertices: Vec<[f32; 3]>,
    /// One normal per vertex.
    pub normals: Vec<[f32; 3]>,
    pub triangles: Vec<[u32; 3]>,
}

impl IsoSurface {
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }
}

/// A capability that triangulates the level set of a dense scalar field.
pub trait IsoSurfaceExtractor: Send + Sync {
    /// Extract the surface where `field == level`.
    ///
    /// Returns an empty surface when the field never crosses `level`.
    ///
    /// # Errors
    ///
    /// Returns [`VoxError::Extraction`] if the underlying algorithm rejects
    /// the input.
    fn extract(&self, field: ArrayView3<'_, f32>, level: f32) -> Result<IsoSurface, VoxError>;
}

/// True when `level` lies inside the value range of `field` and the range is
/// not a single value.  Non-finite samples are ignored.
pub fn spans_level(field: &ArrayView3<'_, f32>, level: f32) -> bool {
    let (lo, hi) = field
        .iter()
        .filter(|v| v.is_finite())
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    lo < hi && lo <= level && level <= hi
}

/// Marching cubes backed by the `mcubes` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarchingCubes;

impl IsoSurfaceExtractor for MarchingCubes {
    fn extract(&self, field: ArrayView3<'_, f32>, level: f32) -> Result<IsoSurface, VoxError> {
        let (nx, ny, nz) = field.dim();
        if nx < 2 || ny < 2 || nz < 2 || !spans_level(&field, level) {
            return Ok(IsoSurface::default());
        }

        // mcubes walks its samples x-fastest; reversing the axes of the
        // row-major view yields exactly that order.
        let values: Vec<f32> = field.t().iter().copied().collect();

        // One sampling interval per voxel so vertices come out in index space.
        let extent = ((nx - 1) as f32, (ny - 1) as f32, (nz - 1) as f32);
        let generator = mcubes::MarchingCubes::new(
            (nx, ny, nz),
            extent,
            extent,
            McVec3::new(0.0, 0.0, 0.0),
            values,
            level,
        )
        .map_err(|e| VoxError::Extraction(e.to_string()))?;
        let mesh = generator.generate(MeshSide::OutsideOnly);

        let mut welder = VertexWelder::default();
        let mut triangles = Vec::with_capacity(mesh.indices.len() / 3);
        for corners in mesh.indices.chunks_exact(3) {
            let [a, b, c] = [corners[0], corners[1], corners[2]].map(|i| {
                let v = &mesh.vertices[i];
                // mcubes normals are −∇field; flip them toward free space.
                welder.insert(
                    [v.posit.x, v.posit.y, v.posit.z],
                    [-v.normal.x, -v.normal.y, -v.normal.z],
                )
            });
            // Vertices sitting exactly on a cube corner collapse some faces.
            if a == b || b == c || a == c {
                continue;
            }
            triangles.push(welder.orient([a, b, c]));
        }

        Ok(IsoSurface {
            vertices: welder.vertices,
            normals: welder.normals,
            triangles,
        })
    }
}

/// Merges the per-triangle vertices marching cubes emits into one indexed
/// vertex list.
#[derive(Debug, Default)]
struct VertexWelder {
    lookup: HashMap<[i64; 3], u32>,
    vertices: Vec<[f32; 3]>,
    normals: Vec<[f32; 3]>,
}

impl VertexWelder {
    fn insert(&mut self, position: [f32; 3], normal: [f32; 3]) -> u32 {
        let key = position.map(|c| (c * WELD_STEPS_PER_VOXEL).round() as i64);
        let Self {
            lookup,
            vertices,
            normals,
        } = self;
        *lookup.entry(key).or_insert_with(|| {
            vertices.push(position);
            normals.push(normal);
            (vertices.len() - 1) as u32
        })
    }

    /// Wind `triangle` counter-clockwise around its vertex normals.
    ///
    /// Triangles whose normals are undefined (flat gradient) keep the
    /// order they came with.
    fn orient(&self, [a, b, c]: [u32; 3]) -> [u32; 3] {
        let position = |i: u32| Vector3::from(self.vertices[i as usize]);
        let face = (position(b) - position(a)).cross(&(position(c) - position(a)));
        let normal: Vector3<f32> = [a, b, c]
            .iter()
            .map(|&i| Vector3::from(self.normals[i as usize]))
            .sum();
        if face.dot(&normal) < 0.0 {
            [b, a, c]
        } else {
            [a, b, c]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;
    use std::collections::HashSet;

    #[test]
    fn constant_field_does_not_span_level() {
        let field = Array3::from_elem((3, 3, 3), 1.0f32);
        assert!(!spans_level(&field.view(), 0.0));
        assert!(!spans_level(&field.view(), 1.0));
    }

    #[test]
    fn signed_field_spans_zero() {
        let field = Array3::from_shape_fn((2, 2, 4), |(_, _, z)| z as f32 - 1.5);
        assert!(spans_level(&field.view(), 0.0));
        assert!(!spans_level(&field.view(), 2.0));
    }

    #[test]
    fn nan_samples_are_ignored() {
        let mut field = Array3::from_elem((2, 2, 2), 1.0f32);
        field[[0, 0, 0]] = f32::NAN;
        assert!(!spans_level(&field.view(), 0.0));
    }

    #[test]
    fn unobserved_volume_extracts_nothing() {
        let field = Array3::from_elem((4, 5, 6), 1.0f32);
        let surface = MarchingCubes.extract(field.view(), 0.0).unwrap();
        assert!(surface.is_empty());
        assert!(surface.triangles.is_empty());
    }

    #[test]
    fn flat_grid_extracts_nothing() {
        let field = Array3::from_shape_fn((1, 4, 4), |(_, y, _)| y as f32 - 1.5);
        let surface = MarchingCubes.extract(field.view(), 0.0).unwrap();
        assert!(surface.is_empty());
    }

    /// Geometric normal of a triangle from its winding.
    fn face_normal(surface: &IsoSurface, [a, b, c]: [u32; 3]) -> Vector3<f32> {
        let p = |i: u32| Vector3::from(surface.vertices[i as usize]);
        (p(b) - p(a)).cross(&(p(c) - p(a)))
    }

    #[test]
    fn plane_field_yields_single_sided_indexed_surface() {
        let field = Array3::from_shape_fn((6, 6, 6), |(_, _, z)| (z as f32 - 2.5) / 2.5);
        let surface = MarchingCubes.extract(field.view(), 0.0).unwrap();

        // 5 × 5 cells crossed once, two triangles each, on a 6 × 6 vertex lattice.
        assert_eq!(surface.triangles.len(), 50);
        assert_eq!(surface.vertices.len(), 36);
        assert_eq!(surface.normals.len(), 36);
        let n = surface.vertices.len() as u32;
        assert!(surface.triangles.iter().flatten().all(|&i| i < n));
        assert!(surface.vertices.iter().all(|v| (v[2] - 2.5).abs() < 1e-5));

        let mut seen = HashSet::new();
        for t in &surface.triangles {
            let mut key = *t;
            key.sort_unstable();
            assert!(seen.insert(key), "triangle {t:?} emitted twice");
        }
    }

    #[test]
    fn normals_point_to_free_space_and_match_winding() {
        let field = Array3::from_shape_fn((6, 6, 6), |(_, _, z)| (z as f32 - 2.5) / 2.5);
        let surface = MarchingCubes.extract(field.view(), 0.0).unwrap();
        assert!(surface.normals.iter().all(|n| n[2] > 0.99));
        for &t in &surface.triangles {
            assert!(face_normal(&surface, t).z > 0.0, "triangle {t:?} wound backwards");
        }

        // Same plane with free space below: everything flips.
        let flipped = Array3::from_shape_fn((6, 6, 6), |(_, _, z)| (2.5 - z as f32) / 2.5);
        let surface = MarchingCubes.extract(flipped.view(), 0.0).unwrap();
        assert_eq!(surface.triangles.len(), 50);
        assert!(surface.normals.iter().all(|n| n[2] < -0.99));
        for &t in &surface.triangles {
            assert!(face_normal(&surface, t).z < 0.0, "triangle {t:?} wound backwards");
        }
    }

    #[test]
    fn sphere_field_shares_every_vertex() {
        let c = 4.5f32;
        let field = Array3::from_shape_fn((10, 10, 10), |(x, y, z)| {
            let d = Vector3::new(x as f32 - c, y as f32 - c, z as f32 - c);
            // Negative inside a ball of radius 3, like an occupied object.
            d.norm() - 3.0
        });
        let surface = MarchingCubes.extract(field.view(), 0.0).unwrap();
        assert!(!surface.triangles.is_empty());
        // Closed and welded: roughly one vertex per two triangles.
        assert!(surface.vertices.len() < surface.triangles.len());
        for &t in &surface.triangles {
            let centroid = t
                .iter()
                .map(|&i| Vector3::from(surface.vertices[i as usize]))
                .sum::<Vector3<f32>>()
                / 3.0;
            let outward = centroid - Vector3::new(c, c, c);
            assert!(face_normal(&surface, t).dot(&outward) > 0.0);
        }
    }
}
