//! # Typed Publish/Subscribe Flows
//!
//! Publisher and subscriber obtained from one container, talking through
//! the in-memory broker.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use courier_bus::{codec, InMemoryBroker};
use courier_types::{
    Annotation, Body, DeliveryOptions, Envelope, FieldValue, Persistence, RequestDescriptor,
    Stereotype,
};

use super::fixtures::{boot, orders_descriptor, OrderPlaced};

const WAIT: Duration = Duration::from_millis(500);

#[tokio::test]
async fn test_publish_then_receive() {
    let container = boot(Arc::new(InMemoryBroker::new("memory://flows")));
    let resources = container.resources();

    let subscriber = resources
        .subscriber::<OrderPlaced>(&orders_descriptor("EventSubscriber"))
        .await
        .unwrap();
    let publisher = resources
        .publisher::<OrderPlaced>(&orders_descriptor("EventPublisher"))
        .await
        .unwrap();

    publisher.send(&OrderPlaced::sample(1)).await.unwrap();

    let received = timeout(WAIT, subscriber.receive()).await.expect("timeout").unwrap();
    assert_eq!(received, Some(OrderPlaced::sample(1)));
    assert_eq!(subscriber.destination().name, "orders");

    container.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_listener_sees_every_event_in_order() {
    let container = boot(Arc::new(InMemoryBroker::new("memory://flows")));
    let resources = container.resources();

    let subscriber = resources
        .subscriber::<OrderPlaced>(&orders_descriptor("EventSubscriber"))
        .await
        .unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    subscriber
        .set_listener(move |event: OrderPlaced| {
            let _ = tx.send(event.order_id);
        })
        .unwrap();

    let publisher = resources
        .publisher::<OrderPlaced>(&orders_descriptor("EventPublisher"))
        .await
        .unwrap();
    for order_id in 0..200 {
        publisher.send(&OrderPlaced::sample(order_id)).await.unwrap();
    }

    for expected in 0..200 {
        let order_id = timeout(WAIT, rx.recv()).await.expect("timeout").expect("event");
        assert_eq!(order_id, expected);
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(rx.try_recv().is_err(), "exactly one callback per message");

    container.shutdown().await;
}

#[tokio::test]
async fn test_every_encoding_reaches_typed_subscriber() {
    let container = boot(Arc::new(InMemoryBroker::new("memory://flows")));
    let resources = container.resources();

    let subscriber = resources
        .subscriber::<OrderPlaced>(&orders_descriptor("EventSubscriber"))
        .await
        .unwrap();
    let raw = resources.producer(&RequestDescriptor::named("orders")).await.unwrap();

    let expected = OrderPlaced::sample(5);
    let document = serde_json::to_string(&expected).unwrap();

    let mut fields = BTreeMap::new();
    fields.insert("order_id".to_string(), FieldValue::Int(5));
    fields.insert("customer".to_string(), FieldValue::from("customer-5"));
    fields.insert(
        "lines".to_string(),
        FieldValue::List(vec![FieldValue::from("widget")]),
    );

    let envelopes = vec![
        codec::encode(&expected).unwrap(),
        Envelope::binary(codec::write_utf(&document).unwrap()),
        Envelope::map(fields),
        Envelope::object(expected.clone()),
    ];
    for envelope in envelopes {
        raw.send(envelope).await.unwrap();
    }

    for _ in 0..4 {
        let received = timeout(WAIT, subscriber.receive()).await.expect("timeout").unwrap();
        assert_eq!(received.as_ref(), Some(&expected));
    }

    container.shutdown().await;
}

#[tokio::test]
async fn test_selector_and_no_local_from_stereotype() {
    let container = boot(Arc::new(InMemoryBroker::new("memory://flows")));
    let resources = container.resources();

    let priority_orders = Stereotype::new(
        "priority-orders",
        vec![
            Annotation::Topic("orders".to_string()),
            Annotation::Selector("priority = TRUE".to_string()),
        ],
    );
    let descriptor = RequestDescriptor::builder("priority-feed")
        .event::<OrderPlaced>("EventSubscriber")
        .stereotype(priority_orders)
        .build()
        .unwrap();
    let subscriber = resources.subscriber::<OrderPlaced>(&descriptor).await.unwrap();
    let publisher = resources
        .publisher::<OrderPlaced>(&orders_descriptor("EventPublisher"))
        .await
        .unwrap();

    let mut routine = BTreeMap::new();
    routine.insert("priority".to_string(), FieldValue::Bool(false));
    let mut urgent = BTreeMap::new();
    urgent.insert("priority".to_string(), FieldValue::Bool(true));

    publisher.send(&OrderPlaced::sample(1)).await.unwrap();
    publisher
        .send_with_properties(&OrderPlaced::sample(2), routine)
        .await
        .unwrap();
    publisher
        .send_with_properties(&OrderPlaced::sample(3), urgent)
        .await
        .unwrap();

    let received = timeout(WAIT, subscriber.receive()).await.expect("timeout").unwrap();
    assert_eq!(received, Some(OrderPlaced::sample(3)));

    // Publisher and subscriber share the container's single connection
    let local_only = RequestDescriptor::builder("mirror-feed")
        .event::<OrderPlaced>("EventSubscriber")
        .topic("orders")
        .annotate(Annotation::NoLocal)
        .build()
        .unwrap();
    let mirror = resources.subscriber::<OrderPlaced>(&local_only).await.unwrap();
    publisher.send(&OrderPlaced::sample(4)).await.unwrap();
    assert!(
        timeout(Duration::from_millis(50), mirror.receive()).await.is_err(),
        "no-local subscriber must not see its own connection's messages"
    );

    container.shutdown().await;
}

#[tokio::test]
async fn test_declared_delivery_reaches_headers() {
    let container = boot(Arc::new(InMemoryBroker::new("memory://flows")));
    let resources = container.resources();

    let consumer = resources.consumer(&RequestDescriptor::named("audit")).await.unwrap();
    let durable = RequestDescriptor::builder("audit-feed")
        .event::<OrderPlaced>("EventPublisher")
        .topic("audit")
        .annotate(Annotation::Delivery(
            DeliveryOptions::default()
                .with_persistence(Persistence::Persistent)
                .with_priority(9),
        ))
        .build()
        .unwrap();
    let publisher = resources.publisher::<OrderPlaced>(&durable).await.unwrap();

    publisher.send(&OrderPlaced::sample(8)).await.unwrap();

    let envelope = timeout(WAIT, consumer.receive())
        .await
        .expect("timeout")
        .unwrap()
        .expect("message");
    assert_eq!(envelope.headers.persistence, Persistence::Persistent);
    assert_eq!(envelope.headers.priority, 9);
    assert!(envelope.headers.timestamp_ms.is_some());
    assert!(envelope.message_id.is_some());
    assert!(matches!(envelope.body, Body::Text(_)));

    container.shutdown().await;
}
