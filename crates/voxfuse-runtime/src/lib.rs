//! `voxfuse-runtime` – the fusion run loop.
//!
//! # Modules
//!
//! - [`pipeline`] – [`FusionPipeline`][pipeline::FusionPipeline]: sizes a
//!   volume (explicit bounds or [`estimate_bounds`][pipeline::estimate_bounds]),
//!   integrates frames from any [`FrameSource`][voxfuse_hal::FrameSource] in
//!   order and extracts the result.  A shared stop flag ends a run between
//!   frames.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: installs the
//!   global `tracing` subscriber with an optional OTLP span exporter.  Set
//!   `OTEL_EXPORTER_OTLP_ENDPOINT` to send per-frame spans to Jaeger, Grafana
//!   Tempo, or any OTLP-compatible collector.

pub mod pipeline;
pub mod telemetry;

pub use pipeline::{FusionPipeline, PipelineConfig, RunReport, estimate_bounds};
pub use telemetry::{TracerProviderGuard, init_tracing};
