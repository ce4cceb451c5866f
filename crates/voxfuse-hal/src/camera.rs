//! RGB-D frames and the `FrameSource` trait for anything that yields them.

use nalgebra::{Matrix3, Matrix4};
use ndarray::{Array2, Array3};
use voxfuse_types::VoxError;

/// One posed RGB-D observation.
#[derive(Debug, Clone, PartialEq)]
pub struct RgbdFrame {
    /// `h × w × 3` RGB, 0–255.
    pub color: Array3<f32>,
    /// `h × w` depth in metres; `0` means no measurement.
    pub depth: Array2<f32>,
    /// Pinhole intrinsics `[[fu, 0, u0], [0, fv, v0], [0, 0, 1]]`.
    pub intrinsics: Matrix3<f32>,
    /// Camera-to-world rigid transform.
    pub pose: Matrix4<f32>,
}

impl RgbdFrame {
    /// Assemble a frame, checking that the color and depth images agree.
    ///
    /// # Errors
    ///
    /// Returns [`VoxError::ImageShapeMismatch`] when `color` is not
    /// `h × w × 3` for the `h × w` depth image.
    pub fn new(
        color: Array3<f32>,
        depth: Array2<f32>,
        intrinsics: Matrix3<f32>,
        pose: Matrix4<f32>,
    ) -> Result<Self, VoxError> {
        let (height, width) = depth.dim();
        if color.dim() != (height, width, 3) {
            return Err(VoxError::ImageShapeMismatch {
                depth_height: height,
                depth_width: width,
                color_shape: color.shape().to_vec(),
            });
        }
        Ok(Self {
            color,
            depth,
            intrinsics,
            pose,
        })
    }

    pub fn width(&self) -> usize {
        self.depth.ncols()
    }

    pub fn height(&self) -> usize {
        self.depth.nrows()
    }
}

/// A source of RGB-D frames in capture order.
///
/// Implementations include on-disk sequences
/// ([`SequenceDataset`][crate::dataset::SequenceDataset]) and in-memory
/// replays ([`FrameSequence`]).
pub trait FrameSource: Send {
    /// Stable identifier for this source, e.g. the dataset directory.
    fn id(&self) -> &str;

    /// Return the next frame, or `None` once the source is exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`VoxError::Dataset`] if the frame exists but cannot be read.
    fn next_frame(&mut self) -> Result<Option<RgbdFrame>, VoxError>;

    /// Restart from the first frame.
    fn rewind(&mut self) -> Result<(), VoxError>;

    /// Number of frames, when known up front.
    fn len_hint(&self) -> Option<usize> {
        None
    }
}

/// Frames held in memory, replayed in insertion order.
#[derive(Debug, Clone, Default)]
pub struct FrameSequence {
    id: String,
    frames: Vec<RgbdFrame>,
    cursor: usize,
}

impl FrameSequence {
    pub fn new(id: impl Into<String>, frames: Vec<RgbdFrame>) -> Self {
        Self {
            id: id.into(),
            frames,
            cursor: 0,
        }
    }
}

impl FrameSource for FrameSequence {
    fn id(&self) -> &str {
        &self.id
    }

    fn next_frame(&mut self) -> Result<Option<RgbdFrame>, VoxError> {
        let frame = self.frames.get(self.cursor).cloned();
        if frame.is_some() {
            self.cursor += 1;
        }
        Ok(frame)
    }

    fn rewind(&mut self) -> Result<(), VoxError> {
        self.cursor = 0;
        Ok(())
    }

    fn len_hint(&self) -> Option<usize> {
        Some(self.frames.len())
    }
}
