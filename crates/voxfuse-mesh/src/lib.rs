//! `voxfuse-mesh` – mesh interchange.
//!
//! Serialises [`TriangleMesh`][voxfuse_types::TriangleMesh] values (meshes
//! and colored point clouds) to and from ASCII PLY, readable by MeshLab,
//! CloudCompare and Open3D.

pub mod ply;

pub use ply::{read_ply, read_ply_from, write_ply, write_ply_to};
