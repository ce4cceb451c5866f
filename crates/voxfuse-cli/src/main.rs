//! `voxfuse` – fuse a posed RGB-D sequence into a colored mesh.
//!
//! This binary:
//!
//! 1. Resolves the run configuration: `voxfuse.toml` (or `--config`), then
//!    `VOXFUSE_*` environment variables, then command-line flags.
//! 2. Opens the sequence and sizes the volume (configured bounds, or the
//!    union of every frame's view frustum).
//! 3. Integrates frames in order.  **Ctrl-C** stops after the current frame
//!    and still writes a mesh from what was fused so far.
//! 4. Writes the mesh (and optionally a point cloud) as ASCII PLY.

mod config;

use clap::Parser;
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

use voxfuse_hal::SequenceDataset;
use voxfuse_mesh::write_ply;
use voxfuse_runtime::{FusionPipeline, init_tracing};
use voxfuse_types::VoxError;

use crate::config::{Config, DEFAULT_CONFIG_FILE};

/// Command-line flags.  Every flag overrides the matching config setting.
#[derive(Debug, Parser)]
#[command(name = "voxfuse", version)]
#[command(about = "Fuse posed RGB-D frames into a colored TSDF mesh", long_about = None)]
struct Cli {
    /// Config file (default: ./voxfuse.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// RGB-D sequence directory
    #[arg(short, long)]
    dataset: Option<PathBuf>,

    /// Integrate at most this many frames
    #[arg(short = 'n', long)]
    frames: Option<usize>,

    /// Voxel edge length in metres
    #[arg(short = 's', long)]
    voxel_size: Option<f32>,

    /// Output mesh (PLY)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Also write the colored surface vertices (PLY)
    #[arg(long)]
    point_cloud: Option<PathBuf>,

    /// Write the resolved configuration to this file and exit
    #[arg(long)]
    save_config: Option<PathBuf>,
}

impl Cli {
    fn apply(&self, cfg: &mut Config) {
        if let Some(d) = &self.dataset {
            cfg.dataset = Some(d.clone());
        }
        if let Some(n) = self.frames {
            cfg.max_frames = Some(n);
        }
        if let Some(s) = self.voxel_size {
            cfg.voxel_size = s;
        }
        if let Some(o) = &self.output {
            cfg.output_mesh = o.clone();
        }
        if let Some(p) = &self.point_cloud {
            cfg.output_point_cloud = Some(p.clone());
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    // Held until exit so pending spans are flushed.
    let _telemetry = init_tracing("voxfuse");

    print_banner();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("  {} {e}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

/// Defaults, then the config file, then environment, then flags.
fn resolve_config(cli: &Cli) -> Result<Config, VoxError> {
    let path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let mut cfg = match config::load_from(&path)? {
        Some(cfg) => {
            println!("  Config loaded from {}", path.display().to_string().bold());
            cfg
        }
        None if cli.config.is_some() => {
            return Err(VoxError::Config(format!("{} does not exist", path.display())));
        }
        None => {
            let mut cfg = Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    };
    cli.apply(&mut cfg);
    Ok(cfg)
}

fn run(cli: &Cli) -> Result<(), VoxError> {
    let cfg = resolve_config(cli)?;

    if let Some(path) = &cli.save_config {
        config::save_to(&cfg, path)?;
        println!(
            "  {} Config saved to {}",
            "✓".green().bold(),
            path.display().to_string().bold()
        );
        return Ok(());
    }
    cfg.validate()?;

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let stop = Arc::new(AtomicBool::new(false));
    let stop_handler = Arc::clone(&stop);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!(
            "{}",
            "⚠  Ctrl-C received – finishing the current frame …".yellow().bold()
        );
        stop_handler.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler; runs cannot be interrupted cleanly");
    }

    // ── Fusion ────────────────────────────────────────────────────────────
    let dataset_path = cfg
        .dataset
        .as_deref()
        .ok_or_else(|| VoxError::Config("no dataset given".to_string()))?;
    let mut dataset = SequenceDataset::open(dataset_path)?
        .with_depth_scale(cfg.depth_scale)
        .with_max_frames(cfg.max_frames);
    println!(
        "  Dataset {} ({} frames)",
        dataset_path.display().to_string().bold(),
        dataset.frame_count()
    );

    let mut pipeline = FusionPipeline::from_source(&mut dataset, &cfg.pipeline_config()?, &stop)?;
    let dims = pipeline.volume().grid().dims();
    println!(
        "  Volume {}×{}×{} voxels at {} m",
        dims[0],
        dims[1],
        dims[2],
        cfg.voxel_size
    );

    let report = pipeline.run(&mut dataset, cfg.max_frames, &stop)?;
    let status = if report.interrupted {
        "interrupted".yellow()
    } else {
        "done".green()
    };
    println!(
        "  Fused {} frame(s), {} voxel updates ({})",
        report.frames, report.voxels_updated, status
    );

    // ── Extraction ────────────────────────────────────────────────────────
    let mesh = pipeline.mesh()?;
    write_ply(&cfg.output_mesh, &mesh)?;
    print_written(&cfg.output_mesh, mesh.points.len(), mesh.triangles.len());

    if let Some(path) = &cfg.output_point_cloud {
        let cloud = pipeline.point_cloud()?;
        write_ply(path, &cloud)?;
        print_written(path, cloud.points.len(), 0);
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("  {} {}", "voxfuse".bold().cyan(), format!("v{}", env!("CARGO_PKG_VERSION")).dimmed());
    println!("  Volumetric TSDF fusion of RGB-D sequences");
    println!();
}

fn print_written(path: &Path, points: usize, triangles: usize) {
    println!(
        "  {} {} ({} points, {} triangles)",
        "✓".green().bold(),
        path.display().to_string().bold(),
        points,
        triangles
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
