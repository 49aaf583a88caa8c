//! Tracing setup for hosts embedding the engine, and the spans the engine
//! opens around its episodes.
//!
//! Call [`init_tracing`] once at process startup. The engine itself only
//! emits `tracing` events and spans; it never installs a subscriber.
//!
//! # Environment variables
//!
//! | Variable | Effect |
//! |---|---|
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | OTLP collector base URL (e.g. `http://localhost:4318`). When set, spans are exported over OTLP/HTTP. |
//! | `RUST_LOG` | Log filter (default `"info"`). |
//! | `SPATIAL_LOG_FORMAT=json` | Emit newline-delimited JSON logs. |
//!
//! # Spans
//!
//! - `select_target` (fields `object_type`, `episode_id`): one target
//!   selection, including any clarification dialogue. `episode_id` is
//!   filled in once a dialogue starts.
//! - `observe` (field `object_id`): one observation run.
//!
//! # Example
//!
//! ```rust,no_run
//! // Hold the guard for the entire lifetime of the process.
//! let _guard = spatial_runtime::telemetry::init_tracing("spatial-engine");
//! ```

use opentelemetry::KeyValue;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use tracing::{Span, info_span};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Instrumentation scope of every exported span.
const TRACER_NAME: &str = "spatial-engine";
const DEFAULT_FILTER: &str = "info";

// ─────────────────────────────────────────────────────────────────────────────
// Settings
// ─────────────────────────────────────────────────────────────────────────────

/// Console log layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl LogFormat {
    /// `json` in any case selects JSON; anything else is compact.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some(v) if v.trim().eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Compact,
        }
    }
}

/// Everything [`init_with`] needs, resolved up front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetrySettings {
    pub service_name: String,
    /// `EnvFilter` directives.
    pub filter: String,
    pub format: LogFormat,
    pub otlp_endpoint: Option<String>,
}

impl TelemetrySettings {
    /// Read the settings from the process environment.
    pub fn from_env(service_name: &str) -> Self {
        Self::from_lookup(service_name, |name| std::env::var(name).ok())
    }

    /// Read the settings through `lookup`. Blank values count as unset.
    pub fn from_lookup(service_name: &str, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_blank = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        Self {
            service_name: service_name.to_string(),
            filter: non_blank("RUST_LOG").unwrap_or_else(|| DEFAULT_FILTER.to_string()),
            format: LogFormat::parse(non_blank("SPATIAL_LOG_FORMAT").as_deref()),
            otlp_endpoint: non_blank("OTEL_EXPORTER_OTLP_ENDPOINT"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Initialisation
// ─────────────────────────────────────────────────────────────────────────────

/// Install the global `tracing` subscriber configured from the environment.
///
/// The returned [`TracerProviderGuard`] must be held for the lifetime of the
/// process; dropping it flushes pending spans.
pub fn init_tracing(service_name: &str) -> TracerProviderGuard {
    init_with(&TelemetrySettings::from_env(service_name))
}

/// Install the global `tracing` subscriber described by `settings`.
///
/// A second installation in the same process is reported on stderr and
/// leaves the first one in place.
pub fn init_with(settings: &TelemetrySettings) -> TracerProviderGuard {
    let env_filter = EnvFilter::try_new(&settings.filter).unwrap_or_else(|e| {
        eprintln!("[spatial] invalid log filter {:?}: {e}", settings.filter);
        EnvFilter::new(DEFAULT_FILTER)
    });

    let provider = settings
        .otlp_endpoint
        .as_deref()
        .and_then(|endpoint| build_provider(&settings.service_name, endpoint));
    let otel_layer = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer(TRACER_NAME)));

    // Exactly one of the two is present.
    let (json, compact) = match settings.format {
        LogFormat::Json => (Some(tracing_subscriber::fmt::layer().json()), None),
        LogFormat::Compact => (None, Some(tracing_subscriber::fmt::layer().compact())),
    };

    if let Err(e) = tracing_subscriber::registry()
        .with(env_filter)
        .with(otel_layer)
        .with(json)
        .with(compact)
        .try_init()
    {
        eprintln!("[spatial] tracing subscriber already installed: {e}");
    }

    TracerProviderGuard(provider)
}

// ─────────────────────────────────────────────────────────────────────────────
// Engine spans
// ─────────────────────────────────────────────────────────────────────────────

/// Span around one target selection. Record `episode_id` once a
/// clarification dialogue begins.
pub fn selection_span(object_type: &str) -> Span {
    info_span!("select_target", object_type, episode_id = tracing::field::Empty)
}

/// Span around one observation run.
pub fn observation_span(object_id: &str) -> Span {
    info_span!("observe", object_id)
}

// ─────────────────────────────────────────────────────────────────────────────
// RAII guard
// ─────────────────────────────────────────────────────────────────────────────

/// Shuts down the OTel [`SdkTracerProvider`] on drop.
pub struct TracerProviderGuard(Option<SdkTracerProvider>);

impl TracerProviderGuard {
    /// Whether spans are being exported.
    pub fn is_exporting(&self) -> bool {
        self.0.is_some()
    }
}

impl Drop for TracerProviderGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.0.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("[spatial] OpenTelemetry provider shutdown error: {e}");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Resource attributes attached to every exported span besides the service
/// name.
fn engine_attributes() -> Vec<KeyValue> {
    vec![
        KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
        KeyValue::new("spatial.tracer", TRACER_NAME),
    ]
}

/// Returns `None` when the exporter cannot be initialised; the error goes
/// to stderr and the caller keeps plain console output.
fn build_provider(service_name: &str, endpoint: &str) -> Option<SdkTracerProvider> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| eprintln!("[spatial] OTLP exporter init failed: {e}"))
        .ok()?;

    let resource = Resource::builder()
        .with_service_name(service_name.to_string())
        .with_attributes(engine_attributes())
        .build();

    Some(
        SdkTracerProvider::builder()
            .with_resource(resource)
            // Simple exporter: hosts may call this before any Tokio runtime
            // exists, and the batch exporter spawns tasks.
            .with_simple_exporter(exporter)
            .build(),
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
