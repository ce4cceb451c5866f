//! Logging and trace export for voxfuse processes.
//!
//! Call [`init_tracing`] once at startup.  Per-frame spans opened by
//! [`FusionPipeline`][crate::pipeline::FusionPipeline] and the `info!`/`debug!`
//! events of the fusion core all flow through the subscriber installed here.
//!
//! # Environment variables
//!
//! | Variable | Effect |
//! |---|---|
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | OTLP/HTTP collector base URL (e.g. `http://localhost:4318`). Enables span export. |
//! | `RUST_LOG` | Log filter (default `"info"`). |
//! | `VOXFUSE_LOG_FORMAT=json` | Emit newline-delimited JSON logs instead of compact text. |
//!
//! # Example
//!
//! ```rust,no_run
//! let _guard = voxfuse_runtime::telemetry::init_tracing("voxfuse");
//! ```

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable selecting the log line format.
pub const LOG_FORMAT_ENV: &str = "VOXFUSE_LOG_FORMAT";

/// Console log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl LogFormat {
    /// `"json"` (any case) selects JSON; anything else, or unset, is compact.
    pub fn from_env_value(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }

    fn from_env() -> Self {
        Self::from_env_value(std::env::var(LOG_FORMAT_ENV).ok().as_deref())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Public API
// ─────────────────────────────────────────────────────────────────────────────

/// Install the global `tracing` subscriber.
///
/// The filter comes from `RUST_LOG` (default `info`), the line format from
/// [`LOG_FORMAT_ENV`].  When `OTEL_EXPORTER_OTLP_ENDPOINT` is set an
/// OpenTelemetry layer forwards every span to the collector as well.
///
/// A second call leaves the first subscriber in place.  Hold the returned
/// [`TracerProviderGuard`] until exit; dropping it flushes pending spans.
pub fn init_tracing(service_name: &str) -> TracerProviderGuard {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let format = LogFormat::from_env();
    let provider = build_provider(service_name);

    let otel_layer = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer("voxfuse")));
    let json_layer =
        (format == LogFormat::Json).then(|| tracing_subscriber::fmt::layer().json());
    let compact_layer =
        (format == LogFormat::Compact).then(|| tracing_subscriber::fmt::layer().compact());

    let installed = tracing_subscriber::registry()
        .with(env_filter)
        .with(otel_layer)
        .with(json_layer)
        .with(compact_layer)
        .try_init();
    if let Err(e) = installed {
        eprintln!("[voxfuse] tracing subscriber already installed: {e}");
    }

    TracerProviderGuard(provider)
}

// ─────────────────────────────────────────────────────────────────────────────
// RAII guard
// ─────────────────────────────────────────────────────────────────────────────

/// Shuts down the OTel [`SdkTracerProvider`] on drop, flushing pending spans.
pub struct TracerProviderGuard(Option<SdkTracerProvider>);

impl TracerProviderGuard {
    /// True when spans are being exported to an OTLP collector.
    pub fn is_exporting(&self) -> bool {
        self.0.is_some()
    }
}

impl Drop for TracerProviderGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.0.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("[voxfuse] OpenTelemetry provider shutdown error: {e}");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Build an [`SdkTracerProvider`] when `OTEL_EXPORTER_OTLP_ENDPOINT` is set.
///
/// Exporter failures are reported on stderr and disable export rather than
/// aborting the run.
fn build_provider(service_name: &str) -> Option<SdkTracerProvider> {
    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok()?;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| eprintln!("[voxfuse] OTLP exporter init failed: {e}"))
        .ok()?;

    let resource = Resource::builder()
        .with_service_name(service_name.to_string())
        .build();

    // Fusion is synchronous; the simple exporter needs no async runtime.
    Some(
        SdkTracerProvider::builder()
            .with_resource(resource)
            .with_simple_exporter(exporter)
            .build(),
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
