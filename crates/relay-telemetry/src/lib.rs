mod metrics;

pub use metrics::{HistogramSummary, MetricsRecorder, MetricsSnapshot};

use std::sync::Arc;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default filter directive (e.g. `info`, `relay_server=debug`).
    /// Overridden by `RUST_LOG`.
    pub log_level: String,
    /// JSON lines instead of human-readable output.
    pub json: bool,
    /// Write to stderr instead of stdout.
    pub stderr: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
            stderr: false,
        }
    }
}

/// Holds process-wide telemetry state.
pub struct TelemetryGuard {
    metrics: Arc<MetricsRecorder>,
}

impl TelemetryGuard {
    pub fn metrics(&self) -> Arc<MetricsRecorder> {
        Arc::clone(&self.metrics)
    }
}

fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize tracing and the metrics recorder. Call once at startup; later
/// calls leave the first subscriber in place.
pub fn init_telemetry(config: TelemetryConfig) -> TelemetryGuard {
    let filter = env_filter(&config.log_level);

    let fmt_layer = match (config.json, config.stderr) {
        (true, true) => tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
        (true, false) => tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .boxed(),
        (false, true) => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
        (false, false) => tracing_subscriber::fmt::layer().with_target(true).boxed(),
    };

    if let Err(e) = tracing_subscriber::registry()
        .with(fmt_layer.with_filter(filter))
        .try_init()
    {
        tracing::debug!(error = %e, "tracing subscriber already set, keeping it");
    }

    TelemetryGuard {
        metrics: Arc::new(MetricsRecorder::new()),
    }
}
