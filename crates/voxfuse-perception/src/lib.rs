//! `voxfuse-perception` – volumetric TSDF fusion core.
//!
//! Turns a sequence of posed RGB-D frames into a dense truncated signed
//! distance field, then into a colored triangle mesh.
//!
//! # Modules
//!
//! - [`transform`] – rigid pose inversion, point transforms, pinhole
//!   projection and the nearest-pixel rule.
//! - [`grid`] – [`VolumeBounds`][grid::VolumeBounds] and
//!   [`VoxelGrid`][grid::VoxelGrid]: sizing of the dense grid and the
//!   voxel → world map.
//! - [`validity`] – the two per-frame eligibility passes and the truncated
//!   signed distance.
//! - [`fusion`] – weighted running average of distances and colors.
//! - [`volume`] – [`TsdfVolume`][volume::TsdfVolume]: owns the volumes,
//!   integrates frames and extracts meshes.
//! - [`extraction`] – the [`IsoSurfaceExtractor`][extraction::IsoSurfaceExtractor]
//!   seam and the default marching-cubes extractor.
//! - [`frustum`] – per-frame view frusta used to size a volume up front.

pub mod extraction;
pub mod frustum;
pub mod fusion;
pub mod grid;
pub mod transform;
pub mod validity;
pub mod volume;

pub use extraction::{IsoSurface, IsoSurfaceExtractor, MarchingCubes};
pub use grid::{VolumeBounds, VoxelGrid};
pub use volume::{IntegrationStats, TsdfVolume};
