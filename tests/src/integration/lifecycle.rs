//! # Container Lifecycle Flows
//!
//! Boot, lazy resource creation, and teardown with aggregated failures.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use courier_bus::InMemoryBroker;
use courier_runtime::ResourceKind;
use courier_types::{
    BrokerConnection, ConnectivityError, CourierError, Credentials, ResolutionError,
};

use super::fixtures::{boot, orders_descriptor, FlakyBroker, GatedBroker, OrderPlaced};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_share_one_connection() {
    let broker = InMemoryBroker::new("memory://lifecycle");
    let container = Arc::new(boot(Arc::new(broker.clone())));

    let tasks: Vec<_> = (0..24)
        .map(|i| {
            let container = Arc::clone(&container);
            tokio::spawn(async move {
                let descriptor = orders_descriptor("EventSubscriber");
                if i % 2 == 0 {
                    container
                        .resources()
                        .subscriber::<OrderPlaced>(&descriptor)
                        .await
                        .map(|_| ())
                } else {
                    container.resources().session().await.map(|_| ())
                }
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(broker.connections_created(), 1);
    assert_eq!(broker.starts(), 1);
    assert_eq!(container.registry().len(), 1);

    assert!(container.shutdown().await.is_clean());
}

#[tokio::test]
async fn test_shutdown_unblocks_receive_and_unbinds() {
    let container = boot(Arc::new(InMemoryBroker::new("memory://lifecycle")));
    let subscriber = Arc::new(
        container
            .resources()
            .subscriber::<OrderPlaced>(&orders_descriptor("EventSubscriber"))
            .await
            .unwrap(),
    );

    let waiting = Arc::clone(&subscriber);
    let pending = tokio::spawn(async move { waiting.receive().await });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let report = container.shutdown().await;
    assert!(report.is_clean());
    assert_eq!(report.unbound, ResourceKind::ALL.to_vec());

    let result = timeout(Duration::from_millis(500), pending)
        .await
        .expect("receive should end on shutdown")
        .unwrap();
    assert_eq!(result, Ok(None));
    assert!(subscriber.is_closed());

    let late = container
        .resources()
        .publisher::<OrderPlaced>(&orders_descriptor("EventPublisher"))
        .await;
    assert_eq!(
        late.map(|_| ()),
        Err(CourierError::Resolution(ResolutionError::Unbound {
            resource: "EventPublisher".to_string()
        }))
    );
}

#[tokio::test]
async fn test_close_failures_are_aggregated_in_order() {
    let broker = FlakyBroker::new(InMemoryBroker::new("memory://lifecycle"));
    // Ids 2 and 4 refuse to close
    broker.fail_close(2);
    broker.fail_close(4);
    let container = boot(broker.clone());

    let credentials = Credentials::new("admin", "admin");
    let shared = container.resources().connection().await.unwrap();
    let tracking = container.resources().connection_factory().unwrap().clone();
    let mut extra = Vec::new();
    for _ in 0..4 {
        extra.push(tracking.open(&credentials).await.unwrap());
    }
    assert_eq!(container.registry().len(), 5);

    let report = container.shutdown().await;
    assert_eq!(report.close_failures(), 2);

    let aggregate = report.close_error.expect("aggregate error");
    let failed: Vec<u64> = aggregate
        .causes()
        .iter()
        .map(|cause| match cause {
            ConnectivityError::Close { connection, .. } => *connection,
            other => panic!("unexpected cause {:?}", other),
        })
        .collect();
    assert_eq!(failed, vec![2, 4]);

    // The shared connection is id 1, the extras are ids 2 through 5
    assert!(shared.is_closed());
    assert_eq!(extra[0].id(), 2);
    assert!(!extra[0].is_closed());
    assert!(extra[1].is_closed());
    assert!(!extra[2].is_closed());
    assert!(extra[3].is_closed());
    assert!(container.registry().is_empty());
}

#[tokio::test]
async fn test_closed_by_owner_is_not_closed_again() {
    let broker = FlakyBroker::new(InMemoryBroker::new("memory://lifecycle"));
    broker.fail_close(2);
    let container = boot(broker.clone());

    let tracking = container.resources().connection_factory().unwrap().clone();
    let first = tracking
        .open(&Credentials::new("admin", "admin"))
        .await
        .unwrap();
    let second = tracking
        .open(&Credentials::new("admin", "admin"))
        .await
        .unwrap();

    first.close().await.unwrap();
    assert_eq!(container.registry().handles(), vec![second.handle()]);

    let report = container.shutdown().await;
    assert_eq!(report.close_failures(), 1);
    assert!(container.registry().is_empty());
}

#[tokio::test]
async fn test_connection_opened_after_drain_is_kept() {
    let container = boot(Arc::new(InMemoryBroker::new("memory://lifecycle")));
    let tracking = container.resources().connection_factory().unwrap().clone();

    assert!(container.registry().close_all().await.is_ok());
    let late = tracking
        .open(&Credentials::new("admin", "admin"))
        .await
        .unwrap();

    assert_eq!(container.registry().handles(), vec![late.handle()]);
    assert!(container.registry().close_all().await.is_ok());
    assert!(late.is_closed());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_connection_tracked_during_drain_survives_it() {
    let broker = GatedBroker::new(InMemoryBroker::new("memory://lifecycle"));
    let container = boot(broker.clone());
    let tracking = container.resources().connection_factory().unwrap().clone();
    let credentials = Credentials::new("admin", "admin");

    let early = tracking.open(&credentials).await.unwrap();
    broker.gate().arm();

    let registry = Arc::clone(container.registry());
    let drain = tokio::spawn(async move { registry.close_all().await });

    // The drain is parked inside the first close; track another connection now
    timeout(Duration::from_millis(500), broker.gate().entered())
        .await
        .expect("close should start");
    let late = tracking.open(&credentials).await.unwrap();
    broker.gate().release();

    let drained = timeout(Duration::from_millis(500), drain)
        .await
        .expect("drain should finish")
        .unwrap();
    assert!(drained.is_ok());
    assert!(early.is_closed());

    assert!(!late.is_closed());
    assert_eq!(container.registry().handles(), vec![late.handle()]);

    assert!(container.shutdown().await.is_clean());
    assert!(late.is_closed());
}
