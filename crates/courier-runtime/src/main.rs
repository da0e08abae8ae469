//! # Courier Runtime
//!
//! Demo entry point: boots a messaging container on the in-memory broker,
//! publishes a few events to a typed subscriber, then shuts down.
//!
//! ## Startup Sequence
//!
//! 1. Initialize logging and metrics
//! 2. Load broker settings and credentials from the environment
//! 3. Request a subscriber and a publisher for the `orders` topic
//! 4. Publish, receive, and shut down

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use courier_bus::InMemoryBroker;
use courier_runtime::MessagingContainer;
use courier_telemetry::{encode_metrics, init_telemetry, TelemetryConfig};
use courier_types::RequestDescriptor;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OrderPlaced {
    order_id: u64,
    customer: String,
    total_cents: i64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _telemetry = init_telemetry(TelemetryConfig::for_service("courier-runtime"))
        .context("Failed to initialize telemetry")?;

    let container = MessagingContainer::from_env(|settings| {
        Arc::new(InMemoryBroker::new(settings.url.clone()))
    })
    .context("Failed to load broker configuration")?;

    let orders = |base: &str| {
        RequestDescriptor::builder("orders-feed")
            .event::<OrderPlaced>(base)
            .topic("orders")
            .build()
    };

    let resources = container.resources();
    let subscriber = resources
        .subscriber::<OrderPlaced>(&orders("EventSubscriber")?)
        .await
        .context("Failed to create subscriber")?;
    let publisher = resources
        .publisher::<OrderPlaced>(&orders("EventPublisher")?)
        .await
        .context("Failed to create publisher")?;

    for order_id in 1..=3 {
        let event = OrderPlaced {
            order_id,
            customer: format!("customer-{}", order_id),
            total_cents: 1_250 * order_id as i64,
        };
        publisher.send(&event).await?;
    }

    for _ in 0..3 {
        match tokio::time::timeout(Duration::from_secs(1), subscriber.receive()).await {
            Ok(Ok(Some(event))) => info!(
                order_id = event.order_id,
                customer = %event.customer,
                total_cents = event.total_cents,
                "Order received"
            ),
            Ok(Ok(None)) => break,
            Ok(Err(e)) => warn!(error = %e, "Receive failed"),
            Err(_) => {
                warn!("No order arrived within a second");
                break;
            }
        }
    }

    let report = container.shutdown().await;
    info!(clean = report.is_clean(), "Shutdown complete");

    if let Ok(metrics) = encode_metrics() {
        info!(bytes = metrics.len(), "Metrics snapshot encoded");
    }

    Ok(())
}
