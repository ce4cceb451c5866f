use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A triangle mesh (or, with no triangles, a colored point cloud).
///
/// Produced by surface extraction in `voxfuse-perception` and serialised by
/// `voxfuse-mesh`.  `normals` and `colors` are optional per-point attributes;
/// when present they hold exactly one row per point.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriangleMesh {
    pub points: Vec<[f32; 3]>,
    pub normals: Option<Vec<[f32; 3]>>,
    pub colors: Option<Vec<[u8; 3]>>,
    /// Vertex index triples into `points`.
    pub triangles: Vec<[u32; 3]>,
}

impl TriangleMesh {
    /// Assemble a mesh, checking that per-point attributes line up with
    /// `points` and that every triangle references an existing point.
    ///
    /// # Errors
    ///
    /// Returns [`VoxError::MeshFormat`] on an attribute count mismatch or an
    /// out-of-range triangle index.
    pub fn new(
        points: Vec<[f32; 3]>,
        normals: Option<Vec<[f32; 3]>>,
        colors: Option<Vec<[u8; 3]>>,
        triangles: Vec<[u32; 3]>,
    ) -> Result<Self, VoxError> {
        if let Some(n) = &normals
            && n.len() != points.len()
        {
            return Err(VoxError::MeshFormat(format!(
                "{} normals for {} points",
                n.len(),
                points.len()
            )));
        }
        if let Some(c) = &colors
            && c.len() != points.len()
        {
            return Err(VoxError::MeshFormat(format!(
                "{} colors for {} points",
                c.len(),
                points.len()
            )));
        }
        if let Some(bad) = triangles
            .iter()
            .flatten()
            .find(|&&i| i as usize >= points.len())
        {
            return Err(VoxError::MeshFormat(format!(
                "triangle references vertex {bad} but mesh has {} points",
                points.len()
            )));
        }
        Ok(Self {
            points,
            normals,
            colors,
            triangles,
        })
    }

    /// True when the mesh has no points at all.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Global error type spanning volume construction, frame integration, mesh
/// interchange and dataset loading.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VoxError {
    #[error("Invalid volume bounds: {0}")]
    InvalidBounds(String),

    #[error("Invalid voxel size {0}: must be positive")]
    InvalidVoxelSize(f32),

    #[error("Invalid transform: {0}")]
    InvalidTransform(String),

    #[error("Invalid observation weight {0}: must be positive")]
    InvalidObservationWeight(f32),

    #[error("Image shape mismatch: depth is {depth_height}x{depth_width}, color is {color_shape:?}")]
    ImageShapeMismatch {
        depth_height: usize,
        depth_width: usize,
        color_shape: Vec<usize>,
    },

    #[error("Surface extraction failed: {0}")]
    Extraction(String),

    #[error("Mesh Format Error: {0}")]
    MeshFormat(String),

    #[error("Dataset Error: {0}")]
    Dataset(String),

    #[error("I/O Error: {0}")]
    Io(String),

    #[error("Config Error: {0}")]
    Config(String),
}

impl From<std::io::Error> for VoxError {
    fn from(e: std::io::Error) -> Self {
        VoxError::Io(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mesh_new_accepts_consistent_attributes() {
        let mesh = TriangleMesh::new(
            vec![[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            Some(vec![[0.0, 0.0, 1.0]; 3]),
            Some(vec![[255, 0, 0]; 3]),
            vec![[0, 1, 2]],
        )
        .unwrap();
        assert_eq!(mesh.points.len(), 3);
        assert_eq!(mesh.triangles, vec![[0, 1, 2]]);
        assert!(!mesh.is_empty());
    }

    #[test]
    fn mesh_new_rejects_normal_count_mismatch() {
        let err = TriangleMesh::new(vec![[0.0; 3]; 2], Some(vec![[0.0; 3]]), None, vec![])
            .unwrap_err();
        assert!(matches!(err, VoxError::MeshFormat(_)));
        assert!(err.to_string().contains("1 normals for 2 points"));
    }

    #[test]
    fn mesh_new_rejects_color_count_mismatch() {
        let err = TriangleMesh::new(vec![[0.0; 3]; 2], None, Some(vec![[0; 3]; 3]), vec![])
            .unwrap_err();
        assert!(err.to_string().contains("3 colors for 2 points"));
    }

    #[test]
    fn mesh_new_rejects_dangling_triangle_index() {
        let err =
            TriangleMesh::new(vec![[0.0; 3]; 3], None, None, vec![[0, 1, 3]]).unwrap_err();
        assert!(err.to_string().contains("vertex 3"));
    }

    #[test]
    fn default_mesh_is_empty() {
        assert!(TriangleMesh::default().is_empty());
    }

    #[test]
    fn mesh_serialization_roundtrip() {
        let mesh = TriangleMesh::new(
            vec![[0.5, 1.5, 2.5]],
            None,
            Some(vec![[10, 20, 30]]),
            vec![],
        )
        .unwrap();
        let json = serde_json::to_string(&mesh).unwrap();
        let back: TriangleMesh = serde_json::from_str(&json).unwrap();
        assert_eq!(mesh, back);
    }

    #[test]
    fn vox_error_display() {
        let err = VoxError::InvalidVoxelSize(-0.5);
        assert!(err.to_string().contains("-0.5"));

        let err2 = VoxError::ImageShapeMismatch {
            depth_height: 480,
            depth_width: 640,
            color_shape: vec![480, 320, 3],
        };
        assert!(err2.to_string().contains("480x640"));
    }

    #[test]
    fn io_error_converts_to_vox_error() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.ply");
        let err: VoxError = io.into();
        assert!(matches!(err, VoxError::Io(ref m) if m.contains("missing.ply")));
    }
}
