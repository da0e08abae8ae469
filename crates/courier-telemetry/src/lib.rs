//! # Courier Telemetry
//!
//! Logging and metrics for the Courier crates.
//!
//! ## Components
//!
//! - **Logs**: `tracing` records rendered by `tracing-subscriber`, JSON in
//!   containers and human-readable in development
//! - **Metrics**: Prometheus counters and gauges on a crate-local registry
//!
//! ## Usage
//!
//! ```rust,ignore
//! use courier_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() {
//!     let _guard = init_telemetry(TelemetryConfig::from_env()).expect("telemetry");
//!     // Log records and metrics are now being collected
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `COURIER_SERVICE_NAME` | `courier` | Service name in log records |
//! | `COURIER_LOG_LEVEL` | `info` | Log level filter |
//! | `COURIER_JSON_LOGS` | `false` | JSON formatted output |
//! | `COURIER_CONSOLE_OUTPUT` | `true` | Write records to stdout |

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::{env_filter, init_logging, LoggingGuard};
pub use metrics::{
    encode_metrics, register_metrics, MetricsHandle, CONNECTIONS_CREATED, CONNECTIONS_OPEN,
    CONNECTION_CLOSE_FAILURES, DECODE_FAILURES, MESSAGES_PUBLISHED, MESSAGES_RECEIVED,
    RESOLUTION_FAILURES,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Initialize logging and metrics.
///
/// Returns a guard that must be held for the lifetime of the application.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    // Metrics first so that early log records can already count failures
    let metrics_handle = register_metrics()?;
    let logging_guard = init_logging(&config)?;

    Ok(TelemetryGuard {
        _logging: logging_guard,
        _metrics: metrics_handle,
    })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    _logging: LoggingGuard,
    _metrics: MetricsHandle,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!("Shutting down telemetry...");
    }
}

/// Convenience macro for recording a metric increment.
#[macro_export]
macro_rules! metric_inc {
    ($metric:expr) => {
        $metric.inc()
    };
    ($metric:expr, $labels:expr) => {
        $metric.with_label_values($labels).inc()
    };
}

/// Convenience macro for recording a gauge decrement.
#[macro_export]
macro_rules! metric_dec {
    ($metric:expr) => {
        $metric.dec()
    };
}
