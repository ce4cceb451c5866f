//! Run configuration – reads/writes `voxfuse.toml`.
//!
//! Settings are layered: built-in defaults, then the TOML file, then
//! `VOXFUSE_*` environment variables, then command-line flags (applied in
//! `main`).

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use voxfuse_hal::dataset::DEFAULT_DEPTH_SCALE;
use voxfuse_perception::VolumeBounds;
use voxfuse_runtime::pipeline::{DEFAULT_OBSERVATION_WEIGHT, DEFAULT_VOXEL_SIZE, PipelineConfig};
use voxfuse_types::VoxError;

/// File looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "voxfuse.toml";

/// Persisted run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// RGB-D sequence directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset: Option<PathBuf>,

    /// Integrate at most this many frames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_frames: Option<usize>,

    /// Voxel edge length in metres.
    #[serde(default = "default_voxel_size")]
    pub voxel_size: f32,

    /// Volume bounds `[[xmin, xmax], [ymin, ymax], [zmin, zmax]]` in metres.
    /// Estimated from the camera frusta when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<[[f32; 2]; 3]>,

    #[serde(default = "default_observation_weight")]
    pub observation_weight: f32,

    /// Raw depth units per metre.
    #[serde(default = "default_depth_scale")]
    pub depth_scale: f32,

    #[serde(default = "default_output_mesh")]
    pub output_mesh: PathBuf,

    /// Also write the colored surface vertices here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_point_cloud: Option<PathBuf>,
}

fn default_voxel_size() -> f32 {
    DEFAULT_VOXEL_SIZE
}
fn default_observation_weight() -> f32 {
    DEFAULT_OBSERVATION_WEIGHT
}
fn default_depth_scale() -> f32 {
    DEFAULT_DEPTH_SCALE
}
fn default_output_mesh() -> PathBuf {
    PathBuf::from("mesh.ply")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dataset: None,
            max_frames: None,
            voxel_size: default_voxel_size(),
            bounds: None,
            observation_weight: default_observation_weight(),
            depth_scale: default_depth_scale(),
            output_mesh: default_output_mesh(),
            output_point_cloud: None,
        }
    }
}

impl Config {
    /// Check the values a run cannot start without.
    ///
    /// # Errors
    ///
    /// Returns [`VoxError::Config`] naming the first offending setting.
    pub fn validate(&self) -> Result<(), VoxError> {
        if self.dataset.is_none() {
            return Err(VoxError::Config(
                "no dataset given (use --dataset, VOXFUSE_DATASET or `dataset` in the config file)"
                    .to_string(),
            ));
        }
        for (name, value) in [
            ("voxel_size", self.voxel_size),
            ("observation_weight", self.observation_weight),
            ("depth_scale", self.depth_scale),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(VoxError::Config(format!("{name} must be positive, got {value}")));
            }
        }
        if self.max_frames == Some(0) {
            return Err(VoxError::Config("max_frames must be at least 1".to_string()));
        }
        Ok(())
    }

    /// The fusion settings for [`FusionPipeline::from_source`][voxfuse_runtime::FusionPipeline::from_source].
    pub fn pipeline_config(&self) -> Result<PipelineConfig, VoxError> {
        let bounds = self.bounds.map(VolumeBounds::new).transpose()?;
        Ok(PipelineConfig {
            voxel_size: self.voxel_size,
            bounds,
            observation_weight: self.observation_weight,
            max_frames: self.max_frames,
        })
    }
}

/// Load the config from a specific path, then apply environment overrides.
/// Returns `Ok(None)` if the file does not exist.
pub fn load_from(path: &Path) -> Result<Option<Config>, VoxError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        VoxError::Config(format!("failed to read config at {}: {e}", path.display()))
    })?;
    let mut cfg: Config = toml::from_str(&raw)
        .map_err(|e| VoxError::Config(format!("failed to parse {}: {e}", path.display())))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `VOXFUSE_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `VOXFUSE_DATASET` | `dataset` |
/// | `VOXFUSE_VOXEL_SIZE` | `voxel_size` |
/// | `VOXFUSE_MAX_FRAMES` | `max_frames` |
/// | `VOXFUSE_OUTPUT` | `output_mesh` |
///
/// Unparsable numbers are ignored with a warning.
pub fn apply_env_overrides(cfg: &mut Config) {
    apply_overrides_from(cfg, |key| std::env::var(key).ok());
}

fn apply_overrides_from(cfg: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("VOXFUSE_DATASET") {
        cfg.dataset = Some(PathBuf::from(v));
    }
    if let Some(v) = lookup("VOXFUSE_VOXEL_SIZE") {
        match v.parse::<f32>() {
            Ok(size) => cfg.voxel_size = size,
            Err(_) => warn!(value = %v, "ignoring unparsable VOXFUSE_VOXEL_SIZE"),
        }
    }
    if let Some(v) = lookup("VOXFUSE_MAX_FRAMES") {
        match v.parse::<usize>() {
            Ok(n) => cfg.max_frames = Some(n),
            Err(_) => warn!(value = %v, "ignoring unparsable VOXFUSE_MAX_FRAMES"),
        }
    }
    if let Some(v) = lookup("VOXFUSE_OUTPUT") {
        cfg.output_mesh = PathBuf::from(v);
    }
}

/// Save the config to a specific path, creating parent directories.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), VoxError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| {
            VoxError::Config(format!("failed to create {}: {e}", parent.display()))
        })?;
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| VoxError::Config(format!("failed to serialize config: {e}")))?;
    fs::write(path, raw).map_err(|e| {
        VoxError::Config(format!("failed to write config at {}: {e}", path.display()))
    })
}
