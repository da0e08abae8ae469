//! Prometheus metrics for Courier.
//!
//! All metrics follow the naming convention: `courier_<area>_<metric>_<unit>`
//!
//! ## Metric Types
//!
//! - **Counter**: Monotonically increasing value (e.g., messages_published_total)
//! - **Gauge**: Value that can go up or down (e.g., connections_open)

use lazy_static::lazy_static;
use prometheus::{Counter, CounterVec, Encoder, Gauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // CONNECTION METRICS
    // =========================================================================

    /// Physical connections created through the tracking factory
    pub static ref CONNECTIONS_CREATED: Counter = Counter::new(
        "courier_connections_created_total",
        "Total number of broker connections created"
    ).expect("metric creation failed");

    /// Connections currently tracked by the registry
    pub static ref CONNECTIONS_OPEN: Gauge = Gauge::new(
        "courier_connections_open",
        "Number of broker connections tracked and not yet closed"
    ).expect("metric creation failed");

    /// Connection close failures during teardown
    pub static ref CONNECTION_CLOSE_FAILURES: Counter = Counter::new(
        "courier_connection_close_failures_total",
        "Total number of connections that failed to close"
    ).expect("metric creation failed");

    // =========================================================================
    // MESSAGE METRICS
    // =========================================================================

    /// Messages sent through typed publishers
    pub static ref MESSAGES_PUBLISHED: CounterVec = CounterVec::new(
        Opts::new("courier_messages_published_total", "Messages sent by typed publishers"),
        &["destination"]
    ).expect("metric creation failed");

    /// Messages delivered to typed subscribers
    pub static ref MESSAGES_RECEIVED: CounterVec = CounterVec::new(
        Opts::new("courier_messages_received_total", "Messages received by typed subscribers"),
        &["destination"]
    ).expect("metric creation failed");

    /// Envelopes the codec could not decode
    pub static ref DECODE_FAILURES: CounterVec = CounterVec::new(
        Opts::new("courier_decode_failures_total", "Envelopes that failed to decode"),
        &["encoding"]
    ).expect("metric creation failed");

    // =========================================================================
    // RESOLUTION METRICS
    // =========================================================================

    /// Request descriptors that failed to resolve
    pub static ref RESOLUTION_FAILURES: CounterVec = CounterVec::new(
        Opts::new("courier_resolution_failures_total", "Request descriptors that failed to resolve"),
        &["resource"]
    ).expect("metric creation failed");
}

/// Handle to the registered metrics
pub struct MetricsHandle {
    _registry: Arc<Registry>,
}

/// Register all metrics with the global registry.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Connections
        Box::new(CONNECTIONS_CREATED.clone()),
        Box::new(CONNECTIONS_OPEN.clone()),
        Box::new(CONNECTION_CLOSE_FAILURES.clone()),
        // Messages
        Box::new(MESSAGES_PUBLISHED.clone()),
        Box::new(MESSAGES_RECEIVED.clone()),
        Box::new(DECODE_FAILURES.clone()),
        // Resolution
        Box::new(RESOLUTION_FAILURES.clone()),
    ];

    for metric in metrics {
        REGISTRY
            .register(metric)
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    }

    Ok(MetricsHandle {
        _registry: Arc::new(REGISTRY.clone()),
    })
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_metrics() {
        // May fail if already registered, which is fine
        let _ = register_metrics();
    }

    #[test]
    fn test_counter_increment() {
        CONNECTIONS_CREATED.inc();
        assert!(CONNECTIONS_CREATED.get() >= 1.0);
    }

    #[test]
    fn test_labelled_counter() {
        MESSAGES_PUBLISHED.with_label_values(&["metrics-test"]).inc();
        assert!(MESSAGES_PUBLISHED.with_label_values(&["metrics-test"]).get() >= 1.0);
    }

    #[test]
    fn test_encode_after_register() {
        let _ = register_metrics();
        RESOLUTION_FAILURES.with_label_values(&["topic"]).inc();
        let text = encode_metrics().unwrap();
        assert!(text.contains("courier_resolution_failures_total"));
    }
}
