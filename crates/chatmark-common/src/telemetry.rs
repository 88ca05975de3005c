//! Telemetry infrastructure for hosts embedding the renderer.
//!
//! Provides:
//! - Prometheus recorder for the cache counters
//! - Tracing with compact console output
//!
//! # Usage
//!
//! ```ignore
//! use chatmark_common::telemetry::{self, TelemetryConfig};
//!
//! telemetry::init(TelemetryConfig::from_env("chat-ui"));
//! tracing::info!("renderer ready");
//! let scrape = telemetry::render();
//! ```

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

static PROMETHEUS_HANDLE: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

/// Telemetry configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name for labeling log lines
    pub service_name: String,
    /// Console log level (default: INFO, DEBUG in debug builds)
    pub console_level: Level,
    /// Whether to install the prometheus recorder
    pub metrics: bool,
}

impl TelemetryConfig {
    /// Build a config from the environment.
    ///
    /// - `RUST_LOG`: Standard env filter (optional, overrides console_level)
    /// - `CHATMARK_METRICS`: set to `0` to skip the prometheus recorder
    pub fn from_env(service_name: impl Into<String>) -> Self {
        let console_level = if cfg!(debug_assertions) {
            Level::DEBUG
        } else {
            Level::INFO
        };

        Self {
            service_name: service_name.into(),
            console_level,
            metrics: std::env::var("CHATMARK_METRICS").map_or(true, |v| v != "0"),
        }
    }
}

/// Initialize telemetry (metrics + tracing).
///
/// Call once at application startup.
pub fn init(config: TelemetryConfig) {
    if config.metrics {
        init_metrics();
    }
    init_tracing(&config);
}

/// Initialize just the prometheus metrics recorder.
///
/// Returns `None` if another recorder was installed first.
pub fn init_metrics() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!(error = %e, "failed to install prometheus recorder");
                None
            }
        })
        .as_ref()
}

fn init_tracing(config: &TelemetryConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.console_level.as_str().to_lowercase()));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .with_filter(env_filter);

    if tracing_subscriber::registry()
        .with(console_layer)
        .try_init()
        .is_ok()
    {
        tracing::debug!(service = %config.service_name, "telemetry initialized");
    }
}

/// Render metrics in prometheus text format.
///
/// Empty when no recorder is installed.
pub fn render() -> String {
    PROMETHEUS_HANDLE
        .get()
        .and_then(|handle| handle.as_ref())
        .map(|handle| handle.render())
        .unwrap_or_default()
}

// Re-export the metrics crate for convenience
pub use metrics::{counter, gauge, histogram};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_reach_the_recorder() {
        init(TelemetryConfig {
            service_name: "chatmark-test".into(),
            console_level: Level::DEBUG,
            metrics: true,
        });
        assert!(init_metrics().is_some());
        counter!("chatmark_telemetry_test_total").increment(2);
        let scrape = render();
        assert!(scrape.contains("chatmark_telemetry_test_total"), "{scrape}");
    }
}
