//! Tracing subscriber initialization with structured logging and optional
//! OpenTelemetry span export.
//!
//! ```no_run
//! // Structured logging only
//! apiflow_observe::tracing_setup::init_tracing(false).unwrap();
//!
//! // Also export spans to stdout through OpenTelemetry
//! apiflow_observe::tracing_setup::init_tracing(true).unwrap();
//! ```

use std::sync::OnceLock;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

/// Used when `RUST_LOG` is unset.
pub const DEFAULT_DIRECTIVES: &str = "apiflow=info,apiflow_api=info,apiflow_core=info,apiflow_infra=info,tower_http=info";

/// Environment switch for the OpenTelemetry stdout exporter.
pub const OTEL_STDOUT_VAR: &str = "OTEL_STDOUT";

static TRACER_PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

#[derive(Debug, Clone, Default)]
pub struct TracingOptions {
    pub enable_otel: bool,
    pub format: LogFormat,
    /// Filter directives used when `RUST_LOG` is unset.
    pub default_directives: Option<String>,
}

impl TracingOptions {
    /// Options derived from the environment: `OTEL_STDOUT=1` enables span
    /// export and `LOG_FORMAT=json` switches to JSON lines.
    pub fn from_env() -> Self {
        let flag = |name: &str| {
            std::env::var(name)
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false)
        };
        let format = match std::env::var("LOG_FORMAT") {
            Ok(v) if v.trim().eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };
        Self {
            enable_otel: flag(OTEL_STDOUT_VAR),
            format,
            default_directives: None,
        }
    }
}

fn env_filter(defaults: Option<&str>) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(defaults.unwrap_or(DEFAULT_DIRECTIVES)))
}

/// Install the global subscriber with text output.
///
/// Fails if a global subscriber is already set.
pub fn init_tracing(enable_otel: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing_with(TracingOptions {
        enable_otel,
        ..TracingOptions::default()
    })
}

pub fn init_tracing_with(options: TracingOptions) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let fmt_layer = match options.format {
        LogFormat::Text => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_events(FmtSpan::CLOSE)
            .boxed(),
    };
    let filter = env_filter(options.default_directives.as_deref());

    if options.enable_otel {
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
            .build();
        let tracer = provider.tracer("apiflow");
        let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);

        let _ = TRACER_PROVIDER.set(provider.clone());
        opentelemetry::global::set_tracer_provider(provider);

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .with(otel_layer)
            .try_init()?;
        tracing::debug!(exporter = "stdout", "OpenTelemetry span export enabled");
    } else {
        tracing_subscriber::registry().with(filter).with(fmt_layer).try_init()?;
    }
    Ok(())
}

/// Flush buffered spans. A no-op when OpenTelemetry was never enabled.
pub fn shutdown_tracing() {
    if let Some(provider) = TRACER_PROVIDER.get() {
        if let Err(e) = provider.shutdown() {
            eprintln!("warning: tracer provider shutdown failed: {e}");
        }
    }
}
