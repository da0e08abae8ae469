//! # Event Publisher
//!
//! Typed sending side: encodes `T` through the codec and dispatches it on a
//! raw producer.

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

use serde::Serialize;
use tracing::debug;

use courier_telemetry::{metric_inc, MESSAGES_PUBLISHED};
use courier_types::{CourierError, DeliveryOptions, DestinationSpec, FieldValue, MessageProducer};

use crate::codec;

/// Publishes `T` values to one destination.
pub struct EventPublisher<T> {
    producer: Box<dyn MessageProducer>,
    _payload: PhantomData<fn(&T)>,
}

impl<T: Serialize> EventPublisher<T> {
    /// Wrap a producer.
    #[must_use]
    pub fn new(producer: Box<dyn MessageProducer>) -> Self {
        Self {
            producer,
            _payload: PhantomData,
        }
    }

    /// Destination this publisher sends to.
    #[must_use]
    pub fn destination(&self) -> &DestinationSpec {
        self.producer.destination()
    }

    /// Delivery settings of the underlying producer.
    #[must_use]
    pub fn delivery(&self) -> DeliveryOptions {
        self.producer.delivery()
    }

    /// Encode and send one event.
    pub async fn send(&self, event: &T) -> Result<(), CourierError> {
        self.send_with_properties(event, BTreeMap::new()).await
    }

    /// Encode and send one event carrying named message properties.
    ///
    /// Properties are what consumer selectors are evaluated against.
    pub async fn send_with_properties(
        &self,
        event: &T,
        properties: BTreeMap<String, FieldValue>,
    ) -> Result<(), CourierError> {
        let mut envelope = codec::encode(event)?;
        envelope.properties = properties;

        self.producer.send(envelope).await?;

        let destination = &self.producer.destination().name;
        metric_inc!(MESSAGES_PUBLISHED, &[destination.as_str()]);
        debug!(destination = %destination, "Event published");
        Ok(())
    }
}

impl<T> fmt::Debug for EventPublisher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventPublisher")
            .field("destination", &self.producer.destination().name)
            .field("delivery", &self.producer.delivery())
            .finish()
    }
}
