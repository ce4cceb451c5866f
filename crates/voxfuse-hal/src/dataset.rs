//! On-disk RGB-D sequences.
//!
//! A sequence is a directory laid out as:
//!
//! ```text
//! camera-intrinsics.txt          3×3 intrinsics, whitespace separated
//! frame-000000.color.png|jpg     8-bit RGB
//! frame-000000.depth.png         16-bit depth, raw units
//! frame-000000.pose.txt          4×4 camera-to-world pose
//! frame-000001.…
//! ```
//!
//! Frames are numbered from zero without gaps; the first missing pose file
//! ends the sequence.  Raw depth values are divided by the depth scale
//! (default 1000, i.e. millimetres to metres); a raw `0` stays `0`, meaning
//! no measurement.

use std::path::{Path, PathBuf};

use nalgebra::{DMatrix, Matrix3, Matrix4};
use ndarray::{Array2, Array3};
use tracing::{debug, info};
use voxfuse_types::VoxError;

use crate::camera::{FrameSource, RgbdFrame};

/// Raw depth units per metre.
pub const DEFAULT_DEPTH_SCALE: f32 = 1000.0;

pub const INTRINSICS_FILE: &str = "camera-intrinsics.txt";

const COLOR_EXTENSIONS: [&str; 2] = ["png", "jpg"];

// ────────────────────────────────────────────────────────────────────────────
// Matrix files
// ────────────────────────────────────────────────────────────────────────────

/// Parse a whitespace-separated matrix, one row per non-empty line.
///
/// # Errors
///
/// Returns [`VoxError::Dataset`] for a non-numeric token, ragged rows or an
/// empty input.  `source` names the input in error messages.
pub fn parse_matrix(text: &str, source: &str) -> Result<DMatrix<f32>, VoxError> {
    let mut rows: Vec<Vec<f32>> = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let row = line
            .split_whitespace()
            .map(|tok| {
                tok.parse::<f32>().map_err(|_| {
                    VoxError::Dataset(format!(
                        "{source}:{}: '{tok}' is not a number",
                        line_no + 1
                    ))
                })
            })
            .collect::<Result<Vec<f32>, VoxError>>()?;
        rows.push(row);
    }

    let ncols = rows.first().map(Vec::len).unwrap_or(0);
    if ncols == 0 {
        return Err(VoxError::Dataset(format!("{source}: empty matrix")));
    }
    if let Some(bad) = rows.iter().find(|r| r.len() != ncols) {
        return Err(VoxError::Dataset(format!(
            "{source}: ragged matrix, expected {ncols} columns, found a row with {}",
            bad.len()
        )));
    }
    Ok(DMatrix::from_row_iterator(
        rows.len(),
        ncols,
        rows.into_iter().flatten(),
    ))
}

/// Read a whitespace-separated matrix file.
pub fn read_matrix_file(path: impl AsRef<Path>) -> Result<DMatrix<f32>, VoxError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .map_err(|e| VoxError::Dataset(format!("{}: {e}", path.display())))?;
    parse_matrix(&text, &path.display().to_string())
}

fn expect_shape(m: &DMatrix<f32>, rows: usize, cols: usize, source: &Path) -> Result<(), VoxError> {
    if m.shape() != (rows, cols) {
        return Err(VoxError::Dataset(format!(
            "{}: expected a {rows}x{cols} matrix, got {}x{}",
            source.display(),
            m.nrows(),
            m.ncols()
        )));
    }
    Ok(())
}

/// Read a 3×3 intrinsics file.
pub fn read_intrinsics(path: impl AsRef<Path>) -> Result<Matrix3<f32>, VoxError> {
    let path = path.as_ref();
    let m = read_matrix_file(path)?;
    expect_shape(&m, 3, 3, path)?;
    Ok(m.fixed_view::<3, 3>(0, 0).into_owned())
}

/// Read a 4×4 camera-to-world pose file.
pub fn read_pose(path: impl AsRef<Path>) -> Result<Matrix4<f32>, VoxError> {
    let path = path.as_ref();
    let m = read_matrix_file(path)?;
    expect_shape(&m, 4, 4, path)?;
    Ok(m.fixed_view::<4, 4>(0, 0).into_owned())
}

// ────────────────────────────────────────────────────────────────────────────
// Images
// ────────────────────────────────────────────────────────────────────────────

fn open_image(path: &Path) -> Result<image::DynamicImage, VoxError> {
    image::open(path).map_err(|e| VoxError::Dataset(format!("{}: {e}", path.display())))
}

/// Load an 8-bit RGB image as `h × w × 3` floats in 0–255.
pub fn load_color(path: impl AsRef<Path>) -> Result<Array3<f32>, VoxError> {
    let path = path.as_ref();
    let rgb = open_image(path)?.to_rgb8();
    let (w, h) = rgb.dimensions();
    let data = rgb.into_raw().into_iter().map(f32::from).collect();
    Array3::from_shape_vec((h as usize, w as usize, 3), data)
        .map_err(|e| VoxError::Dataset(format!("{}: {e}", path.display())))
}

/// Load a 16-bit depth image as `h × w` metres (`raw / depth_scale`).
pub fn load_depth(path: impl AsRef<Path>, depth_scale: f32) -> Result<Array2<f32>, VoxError> {
    let path = path.as_ref();
    let gray = open_image(path)?.to_luma16();
    let (w, h) = gray.dimensions();
    let data = gray
        .into_raw()
        .into_iter()
        .map(|raw| f32::from(raw) / depth_scale)
        .collect();
    Array2::from_shape_vec((h as usize, w as usize), data)
        .map_err(|e| VoxError::Dataset(format!("{}: {e}", path.display())))
}

// ────────────────────────────────────────────────────────────────────────────
// SequenceDataset
// ────────────────────────────────────────────────────────────────────────────

/// A numbered RGB-D sequence on disk, read lazily one frame at a time.
#[derive(Debug, Clone)]
pub struct SequenceDataset {
    id: String,
    root: PathBuf,
    intrinsics: Matrix3<f32>,
    depth_scale: f32,
    frame_count: usize,
    cursor: usize,
}

impl SequenceDataset {
    /// Open a sequence directory and count its frames.
    ///
    /// # Errors
    ///
    /// Returns [`VoxError::Dataset`] if the intrinsics file is missing or
    /// malformed, or the directory holds no frames.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, VoxError> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(VoxError::Dataset(format!(
                "{} is not a directory",
                root.display()
            )));
        }
        let intrinsics = read_intrinsics(root.join(INTRINSICS_FILE))?;
        let frame_count = (0..)
            .take_while(|&i| Self::frame_path(&root, i, "pose.txt").is_file())
            .count();
        if frame_count == 0 {
            return Err(VoxError::Dataset(format!(
                "{}: no frame-000000.pose.txt found",
                root.display()
            )));
        }
        info!(dataset = %root.display(), frames = frame_count, "opened RGB-D sequence");

        Ok(Self {
            id: root.display().to_string(),
            root,
            intrinsics,
            depth_scale: DEFAULT_DEPTH_SCALE,
            frame_count,
            cursor: 0,
        })
    }

    /// Use a different raw-depth-units-per-metre factor.
    pub fn with_depth_scale(mut self, depth_scale: f32) -> Self {
        self.depth_scale = depth_scale;
        self
    }

    /// Only expose the first `max_frames` frames.
    pub fn with_max_frames(mut self, max_frames: Option<usize>) -> Self {
        if let Some(n) = max_frames {
            self.frame_count = self.frame_count.min(n);
        }
        self
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn intrinsics(&self) -> &Matrix3<f32> {
        &self.intrinsics
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn frame_path(root: &Path, index: usize, suffix: &str) -> PathBuf {
        root.join(format!("frame-{index:06}.{suffix}"))
    }

    fn color_path(&self, index: usize) -> Result<PathBuf, VoxError> {
        COLOR_EXTENSIONS
            .iter()
            .map(|ext| Self::frame_path(&self.root, index, &format!("color.{ext}")))
            .find(|p| p.is_file())
            .ok_or_else(|| {
                VoxError::Dataset(format!(
                    "{}: frame {index} has no color image",
                    self.root.display()
                ))
            })
    }

    /// Load frame `index` regardless of the cursor.
    ///
    /// # Errors
    ///
    /// Returns [`VoxError::Dataset`] for an index past the end, a missing or
    /// unreadable file, or color and depth images of different sizes.
    pub fn load_frame(&self, index: usize) -> Result<RgbdFrame, VoxError> {
        if index >= self.frame_count {
            return Err(VoxError::Dataset(format!(
                "frame {index} out of range (sequence has {})",
                self.frame_count
            )));
        }
        let color = load_color(self.color_path(index)?)?;
        let depth = load_depth(
            Self::frame_path(&self.root, index, "depth.png"),
            self.depth_scale,
        )?;
        let pose = read_pose(Self::frame_path(&self.root, index, "pose.txt"))?;
        debug!(frame = index, "loaded frame");

        RgbdFrame::new(color, depth, self.intrinsics, pose).map_err(|e| {
            VoxError::Dataset(format!("{}: frame {index}: {e}", self.root.display()))
        })
    }
}

impl FrameSource for SequenceDataset {
    fn id(&self) -> &str {
        &self.id
    }

    fn next_frame(&mut self) -> Result<Option<RgbdFrame>, VoxError> {
        if self.cursor >= self.frame_count {
            return Ok(None);
        }
        let frame = self.load_frame(self.cursor)?;
        self.cursor += 1;
        Ok(Some(frame))
    }

    fn rewind(&mut self) -> Result<(), VoxError> {
        self.cursor = 0;
        Ok(())
    }

    fn len_hint(&self) -> Option<usize> {
        Some(self.frame_count)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
