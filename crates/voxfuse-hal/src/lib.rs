//! `voxfuse-hal` – frame sources.
//!
//! # Modules
//!
//! - [`camera`] – [`RgbdFrame`][camera::RgbdFrame] and the
//!   [`FrameSource`][camera::FrameSource] trait, plus an in-memory
//!   [`FrameSequence`][camera::FrameSequence].
//! - [`dataset`] – [`SequenceDataset`][dataset::SequenceDataset]: numbered
//!   color/depth/pose files on disk, and the matrix file parser.

pub mod camera;
pub mod dataset;

pub use camera::{FrameSequence, FrameSource, RgbdFrame};
pub use dataset::{SequenceDataset, read_matrix_file};
