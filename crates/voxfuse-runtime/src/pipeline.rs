//! [`FusionPipeline`] – drives a [`TsdfVolume`] from a [`FrameSource`].
//!
//! A run is:
//!
//! 1. **Size** – take the configured bounds, or fold the view frusta of every
//!    frame with [`estimate_bounds`].
//! 2. **Fuse** – integrate frames strictly in source order, one
//!    `frame` span per frame.
//! 3. **Extract** – read the mesh or point cloud from the final volume.
//!
//! The stop flag is checked between frames only, so a frame is never half
//! integrated and extraction always sees a consistent volume.
//!
//! # Example
//!
//! ```rust
//! use std::sync::atomic::AtomicBool;
//! use voxfuse_hal::FrameSequence;
//! use voxfuse_perception::VolumeBounds;
//! use voxfuse_runtime::pipeline::FusionPipeline;
//!
//! let bounds = VolumeBounds::new([[0.0, 1.0], [0.0, 1.0], [0.0, 1.0]]).unwrap();
//! let mut pipeline = FusionPipeline::new(bounds, 0.25, 1.0).unwrap();
//! let mut source = FrameSequence::new("empty", Vec::new());
//! let report = pipeline.run(&mut source, None, &AtomicBool::new(false)).unwrap();
//! assert_eq!(report.frames, 0);
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tracing::{debug, info, info_span, warn};
use voxfuse_hal::{FrameSource, RgbdFrame};
use voxfuse_perception::frustum::frustum_bounds;
use voxfuse_perception::{IntegrationStats, TsdfVolume, VolumeBounds};
use voxfuse_types::{TriangleMesh, VoxError};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Weight given to each frame when none is configured.
pub const DEFAULT_OBSERVATION_WEIGHT: f32 = 1.0;

/// Voxel edge length in metres when none is configured.
pub const DEFAULT_VOXEL_SIZE: f32 = 0.02;

/// Configuration bundle for [`FusionPipeline::from_source`].
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub voxel_size: f32,
    /// Fixed volume bounds.  `None` estimates them from the frames.
    pub bounds: Option<VolumeBounds>,
    pub observation_weight: f32,
    /// Stop after this many frames.
    pub max_frames: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            voxel_size: DEFAULT_VOXEL_SIZE,
            bounds: None,
            observation_weight: DEFAULT_OBSERVATION_WEIGHT,
            max_frames: None,
        }
    }
}

/// Outcome of [`FusionPipeline::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunReport {
    /// Frames integrated during this run.
    pub frames: usize,
    /// Sum over frames of voxels fused.
    pub voxels_updated: usize,
    /// True when the stop flag ended the run early.
    pub interrupted: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// FusionPipeline
// ─────────────────────────────────────────────────────────────────────────────

/// Owns one [`TsdfVolume`] and feeds it frames.
#[derive(Debug, Clone)]
pub struct FusionPipeline {
    volume: TsdfVolume,
    observation_weight: f32,
    frames_integrated: usize,
}

impl FusionPipeline {
    /// Allocate the volume.
    ///
    /// # Errors
    ///
    /// Returns [`VoxError::InvalidVoxelSize`] or
    /// [`VoxError::InvalidObservationWeight`] for non-positive inputs.
    pub fn new(
        bounds: VolumeBounds,
        voxel_size: f32,
        observation_weight: f32,
    ) -> Result<Self, VoxError> {
        if !(observation_weight.is_finite() && observation_weight > 0.0) {
            return Err(VoxError::InvalidObservationWeight(observation_weight));
        }
        Ok(Self {
            volume: TsdfVolume::new(bounds, voxel_size)?,
            observation_weight,
            frames_integrated: 0,
        })
    }

    /// Build a pipeline for `source`, estimating bounds from its frames when
    /// `config.bounds` is `None`.  The source is rewound afterwards.
    pub fn from_source(
        source: &mut dyn FrameSource,
        config: &PipelineConfig,
        stop: &AtomicBool,
    ) -> Result<Self, VoxError> {
        let bounds = match config.bounds {
            Some(bounds) => bounds,
            None => estimate_bounds(source, config.max_frames, stop)?,
        };
        info!(
            source = source.id(),
            bounds = ?bounds.rows(),
            voxel_size = config.voxel_size,
            "volume bounds"
        );
        Self::new(bounds, config.voxel_size, config.observation_weight)
    }

    /// Integrate one frame with the configured observation weight.
    pub fn integrate_frame(&mut self, frame: &RgbdFrame) -> Result<IntegrationStats, VoxError> {
        let stats = self.volume.integrate(
            frame.color.view(),
            frame.depth.view(),
            &frame.intrinsics,
            &frame.pose,
            self.observation_weight,
        )?;
        self.frames_integrated += 1;
        Ok(stats)
    }

    /// Integrate frames from `source` until it is exhausted, `max_frames`
    /// have been integrated, or `stop` is set.
    ///
    /// # Errors
    ///
    /// The first frame that fails to load or integrate aborts the run; the
    /// frames before it stay integrated.
    pub fn run(
        &mut self,
        source: &mut dyn FrameSource,
        max_frames: Option<usize>,
        stop: &AtomicBool,
    ) -> Result<RunReport, VoxError> {
        let started = Instant::now();
        let limit = max_frames.unwrap_or(usize::MAX);
        let mut report = RunReport::default();

        while report.frames < limit {
            if stop.load(Ordering::SeqCst) {
                warn!(frames = report.frames, "stop requested; ending fusion early");
                report.interrupted = true;
                break;
            }
            let Some(frame) = source.next_frame()? else {
                break;
            };

            let span = info_span!("frame", index = self.frames_integrated);
            let _enter = span.enter();
            let frame_started = Instant::now();
            let stats = self.integrate_frame(&frame)?;
            if stats.integrated == 0 {
                warn!(candidates = stats.candidates, "frame observed no voxels");
            } else {
                info!(
                    candidates = stats.candidates,
                    integrated = stats.integrated,
                    elapsed_ms = frame_started.elapsed().as_millis() as u64,
                    "frame fused"
                );
            }
            report.frames += 1;
            report.voxels_updated += stats.integrated;
        }

        info!(
            frames = report.frames,
            voxels_updated = report.voxels_updated,
            interrupted = report.interrupted,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "fusion run finished"
        );
        Ok(report)
    }

    pub fn volume(&self) -> &TsdfVolume {
        &self.volume
    }

    /// Frames integrated over the pipeline's lifetime.
    pub fn frames_integrated(&self) -> usize {
        self.frames_integrated
    }

    pub fn observation_weight(&self) -> f32 {
        self.observation_weight
    }

    /// Extract the surface mesh from the volume as it stands.
    pub fn mesh(&self) -> Result<TriangleMesh, VoxError> {
        let mesh = self.volume.get_mesh()?;
        if mesh.triangles.is_empty() {
            warn!("extracted mesh is empty; no surface crossed the volume");
        }
        Ok(mesh)
    }

    /// Extract the colored surface vertices without faces.
    pub fn point_cloud(&self) -> Result<TriangleMesh, VoxError> {
        self.volume.get_point_cloud()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Bounds estimation
// ─────────────────────────────────────────────────────────────────────────────

/// Bounds enclosing the view frusta of the first `max_frames` frames of
/// `source` (all of them when `None`).  The source is rewound before and
/// after.
///
/// # Errors
///
/// Returns [`VoxError::Dataset`] when the source yields no frames, and any
/// error the source raises while loading.
pub fn estimate_bounds(
    source: &mut dyn FrameSource,
    max_frames: Option<usize>,
    stop: &AtomicBool,
) -> Result<VolumeBounds, VoxError> {
    source.rewind()?;
    let limit = max_frames.unwrap_or(usize::MAX);
    let mut bounds: Option<VolumeBounds> = None;
    let mut frames = 0usize;

    while frames < limit && !stop.load(Ordering::SeqCst) {
        let Some(frame) = source.next_frame()? else {
            break;
        };
        let frame_bounds = frustum_bounds(frame.depth.view(), &frame.intrinsics, &frame.pose)?;
        bounds = Some(match bounds {
            Some(acc) => acc.union(&frame_bounds),
            None => frame_bounds,
        });
        frames += 1;
    }
    source.rewind()?;

    let bounds = bounds.ok_or_else(|| {
        VoxError::Dataset(format!("{}: no frames to estimate bounds from", source.id()))
    })?;
    debug!(frames, bounds = ?bounds.rows(), "estimated volume bounds");
    Ok(bounds)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Matrix3, Matrix4};
    use ndarray::{Array2, Array3};
    use voxfuse_hal::FrameSequence;

    /// 16×16 camera at `(x, 0, 0)` looking along +Z at a wall `depth` away.
    fn wall_frame(x: f32, depth: f32) -> RgbdFrame {
        let mut pose = Matrix4::identity();
        pose[(0, 3)] = x;
        RgbdFrame::new(
            Array3::from_elem((16, 16, 3), 180.0),
            Array2::from_elem((16, 16), depth),
            Matrix3::new(10.0, 0.0, 8.0, 0.0, 10.0, 8.0, 0.0, 0.0, 1.0),
            pose,
        )
        .unwrap()
    }

    fn wall_bounds() -> VolumeBounds {
        VolumeBounds::new([[-0.5, 0.5], [-0.5, 0.5], [0.5, 1.5]]).unwrap()
    }

    fn no_stop() -> AtomicBool {
        AtomicBool::new(false)
    }

    // ── Construction ────────────────────────────────────────────────────────

    #[test]
    fn rejects_bad_observation_weight() {
        assert!(matches!(
            FusionPipeline::new(wall_bounds(), 0.1, 0.0),
            Err(VoxError::InvalidObservationWeight(_))
        ));
    }

    #[test]
    fn config_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.voxel_size, 0.02);
        assert_eq!(config.observation_weight, 1.0);
        assert!(config.bounds.is_none());
        assert!(config.max_frames.is_none());
    }

    // ── Run loop ────────────────────────────────────────────────────────────

    #[test]
    fn run_integrates_every_frame_and_extracts_surface() {
        let mut pipeline = FusionPipeline::new(wall_bounds(), 0.1, 1.0).unwrap();
        let mut source =
            FrameSequence::new("wall", vec![wall_frame(0.0, 1.0), wall_frame(0.05, 1.0)]);

        let report = pipeline.run(&mut source, None, &no_stop()).unwrap();
        assert_eq!(report.frames, 2);
        assert!(!report.interrupted);
        assert!(report.voxels_updated > 0);
        assert_eq!(pipeline.frames_integrated(), 2);
        assert!(pipeline.volume().weights().iter().any(|&w| w == 2.0));

        let mesh = pipeline.mesh().unwrap();
        assert!(!mesh.triangles.is_empty());
        let cloud = pipeline.point_cloud().unwrap();
        assert_eq!(cloud.points.len(), mesh.points.len());
    }

    #[test]
    fn run_respects_frame_limit() {
        let mut pipeline = FusionPipeline::new(wall_bounds(), 0.1, 1.0).unwrap();
        let mut source = FrameSequence::new("wall", vec![wall_frame(0.0, 1.0); 3]);
        let report = pipeline.run(&mut source, Some(2), &no_stop()).unwrap();
        assert_eq!(report.frames, 2);
        // The third frame is still pending.
        assert!(source.next_frame().unwrap().is_some());
    }

    #[test]
    fn stop_flag_ends_run_before_next_frame() {
        let mut pipeline = FusionPipeline::new(wall_bounds(), 0.1, 1.0).unwrap();
        let mut source = FrameSequence::new("wall", vec![wall_frame(0.0, 1.0); 2]);
        let stop = AtomicBool::new(true);
        let report = pipeline.run(&mut source, None, &stop).unwrap();
        assert_eq!(report.frames, 0);
        assert!(report.interrupted);
        assert!(pipeline.volume().weights().iter().all(|&w| w == 0.0));
        // Extraction still works on the untouched volume.
        assert!(pipeline.mesh().unwrap().triangles.is_empty());
    }

    #[test]
    fn frame_outside_volume_is_counted_but_updates_nothing() {
        let mut pipeline = FusionPipeline::new(wall_bounds(), 0.1, 1.0).unwrap();
        // Camera far to the side sees none of the volume.
        let mut source = FrameSequence::new("away", vec![wall_frame(50.0, 1.0)]);
        let report = pipeline.run(&mut source, None, &no_stop()).unwrap();
        assert_eq!(report.frames, 1);
        assert_eq!(report.voxels_updated, 0);
    }

    #[test]
    fn observation_weight_is_forwarded() {
        let mut pipeline = FusionPipeline::new(wall_bounds(), 0.1, 0.5).unwrap();
        let stats = pipeline.integrate_frame(&wall_frame(0.0, 1.0)).unwrap();
        assert!(stats.integrated > 0);
        let max_weight = pipeline.volume().weights().iter().copied().fold(0.0, f32::max);
        assert_eq!(max_weight, 0.5);
    }

    // ── Bounds estimation ───────────────────────────────────────────────────

    #[test]
    fn estimate_bounds_covers_all_frusta() {
        let mut source =
            FrameSequence::new("pair", vec![wall_frame(0.0, 1.0), wall_frame(1.0, 2.0)]);
        let bounds = estimate_bounds(&mut source, None, &no_stop()).unwrap();
        let [x, y, z] = bounds.rows();
        // Frame 0 reaches x = -0.8 at depth 1; frame 1 reaches x = 1 + 1.6 at depth 2.
        assert!((x[0] + 0.8).abs() < 1e-5);
        assert!((x[1] - 2.6).abs() < 1e-5);
        assert!((y[0] + 1.6).abs() < 1e-5);
        assert_eq!(z, [0.0, 2.0]);
        // Rewound for the fusion pass.
        assert!(source.next_frame().unwrap().is_some());
    }

    #[test]
    fn estimate_bounds_honours_frame_limit() {
        let mut source =
            FrameSequence::new("pair", vec![wall_frame(0.0, 1.0), wall_frame(1.0, 2.0)]);
        let bounds = estimate_bounds(&mut source, Some(1), &no_stop()).unwrap();
        assert_eq!(bounds.rows()[2], [0.0, 1.0]);
    }

    #[test]
    fn estimate_bounds_without_frames_fails() {
        let mut source = FrameSequence::new("empty", Vec::new());
        let err = estimate_bounds(&mut source, None, &no_stop()).unwrap_err();
        assert!(matches!(err, VoxError::Dataset(_)));
    }

    #[test]
    fn from_source_estimates_bounds_when_unset() {
        let mut source = FrameSequence::new("wall", vec![wall_frame(0.0, 1.0)]);
        let config = PipelineConfig {
            voxel_size: 0.1,
            ..PipelineConfig::default()
        };
        let pipeline = FusionPipeline::from_source(&mut source, &config, &no_stop()).unwrap();
        let origin = pipeline.volume().grid().origin();
        assert!((origin.x + 0.8).abs() < 1e-5);
        assert_eq!(origin.z, 0.0);
    }

    #[test]
    fn from_source_prefers_configured_bounds() {
        let mut source = FrameSequence::new("empty", Vec::new());
        let config = PipelineConfig {
            voxel_size: 0.1,
            bounds: Some(wall_bounds()),
            ..PipelineConfig::default()
        };
        let pipeline = FusionPipeline::from_source(&mut source, &config, &no_stop()).unwrap();
        assert_eq!(pipeline.volume().grid().origin().z, 0.5);
    }
}
