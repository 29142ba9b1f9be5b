//! Logging and in-process metrics for the advisor.
//!
//! Logs go to stderr, as JSON lines or plain text, so stdout stays free for
//! cycle reports. `RUST_LOG`, when set, replaces the configured filter.

mod metrics;

pub use metrics::{HistogramSummary, MetricType, MetricsRecorder, MetricsSnapshot};

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    pub log_level: Level,
    /// Per-target overrides, e.g. `vanet_engine` at DEBUG.
    pub module_levels: Vec<(String, Level)>,
    pub json: bool,
    pub metrics_enabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            json: true,
            metrics_enabled: true,
        }
    }
}

impl TelemetryConfig {
    /// Set the default level by name. Unknown names leave it unchanged.
    pub fn with_level_name(mut self, name: &str) -> Self {
        if let Ok(level) = Level::from_str(name.trim()) {
            self.log_level = level;
        }
        self
    }

    /// Add per-target levels by name. Entries with unknown names are skipped.
    pub fn with_module_level_names<'a>(
        mut self,
        modules: impl IntoIterator<Item = (&'a String, &'a String)>,
    ) -> Self {
        for (target, name) in modules {
            if let Ok(level) = Level::from_str(name.trim()) {
                self.module_levels.push((target.clone(), level));
            }
        }
        self
    }
}

/// Holds the shared metrics recorder, when enabled.
pub struct TelemetryGuard {
    metrics: Option<Arc<MetricsRecorder>>,
}

impl TelemetryGuard {
    pub fn metrics(&self) -> Option<Arc<MetricsRecorder>> {
        self.metrics.clone()
    }
}

/// Install the global subscriber. A second call leaves the first
/// subscriber in place.
pub fn init_telemetry(config: TelemetryConfig) -> TelemetryGuard {
    let overrides: BTreeMap<String, Level> = config.module_levels.iter().cloned().collect();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directives(config.log_level, &overrides)));

    let (json, text) = if config.json {
        (
            Some(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_writer(std::io::stderr),
            ),
            None,
        )
    } else {
        (None, Some(fmt::layer().with_target(true).with_writer(std::io::stderr)))
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(text)
        .try_init();

    TelemetryGuard {
        metrics: config.metrics_enabled.then(|| Arc::new(MetricsRecorder::new())),
    }
}

/// Run `f` with a warn-level stderr subscriber on this thread, for work
/// that happens before [`init_telemetry`] can be configured.
pub fn with_bootstrap_logging<T>(f: impl FnOnce() -> T) -> T {
    scoped_warnings(std::io::stderr, f)
}

fn scoped_warnings<W, T>(writer: W, f: impl FnOnce() -> T) -> T
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let subscriber = fmt()
        .with_max_level(Level::WARN)
        .with_target(true)
        .with_ansi(false)
        .with_writer(writer)
        .finish();
    tracing::subscriber::with_default(subscriber, f)
}

fn directives(base: Level, overrides: &BTreeMap<String, Level>) -> String {
    std::iter::once(base.as_str().to_ascii_lowercase())
        .chain(
            overrides
                .iter()
                .map(|(target, level)| format!("{target}={}", level.as_str().to_ascii_lowercase())),
        )
        .collect::<Vec<_>>()
        .join(",")
}
