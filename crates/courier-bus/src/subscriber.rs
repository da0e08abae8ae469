//! # Event Subscriber
//!
//! Typed receiving side: decodes every inbound envelope into `T`, either on
//! demand (`receive`) or pushed to a callback (`set_listener`). The two modes
//! are mutually exclusive per subscriber; once a listener is installed,
//! `receive` fails.
//!
//! An envelope whose document is `null` carries no event and is skipped.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use courier_telemetry::{metric_inc, DECODE_FAILURES, MESSAGES_RECEIVED};
use courier_types::{
    ConnectivityError, CourierError, DestinationSpec, Envelope, MessageConsumer, MessageListener,
    TypeTag,
};

use crate::codec;

/// Receives `T` values from one destination.
pub struct EventSubscriber<T> {
    consumer: Box<dyn MessageConsumer>,
    payload: TypeTag,
    _payload: PhantomData<fn() -> T>,
}

impl<T> EventSubscriber<T>
where
    T: DeserializeOwned + Send + 'static,
{
    /// Wrap a consumer.
    #[must_use]
    pub fn new(consumer: Box<dyn MessageConsumer>) -> Self {
        Self {
            consumer,
            payload: TypeTag::of::<T>(),
            _payload: PhantomData,
        }
    }

    /// Destination this subscriber reads from.
    #[must_use]
    pub fn destination(&self) -> &DestinationSpec {
        self.consumer.destination()
    }

    /// Type every inbound message is decoded into.
    #[must_use]
    pub fn payload_type(&self) -> TypeTag {
        self.payload
    }

    /// Wait for the next event.
    ///
    /// Blocks until a message arrives. Returns `Ok(None)` once the consumer
    /// or its connection is closed.
    pub async fn receive(&self) -> Result<Option<T>, CourierError> {
        loop {
            let Some(envelope) = self.consumer.receive().await? else {
                return Ok(None);
            };

            match decode::<T>(&envelope, self.destination())? {
                Some(event) => return Ok(Some(event)),
                None => continue,
            }
        }
    }

    /// Push every decoded event to `on_event`, replacing any previous
    /// listener. Decode and transport failures are logged.
    pub fn set_listener<F>(&self, on_event: F) -> Result<(), CourierError>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let destination = self.destination().name.clone();
        self.set_listener_with_errors(on_event, move |error| {
            warn!(destination = %destination, error = %error, "Listener delivery failed");
        })
    }

    /// Like [`set_listener`](Self::set_listener), with failures routed to
    /// `on_error`.
    pub fn set_listener_with_errors<F, E>(&self, on_event: F, on_error: E) -> Result<(), CourierError>
    where
        F: Fn(T) + Send + Sync + 'static,
        E: Fn(CourierError) + Send + Sync + 'static,
    {
        let listener = DecodingListener {
            destination: self.destination().clone(),
            on_event,
            on_error,
            _payload: PhantomData,
        };
        self.consumer.set_listener(Arc::new(listener))?;
        Ok(())
    }

    /// Close the underlying consumer, unblocking any pending `receive`.
    pub async fn close(&self) -> Result<(), CourierError> {
        self.consumer.close().await?;
        Ok(())
    }

    /// True once the underlying consumer is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.consumer.is_closed()
    }
}

impl<T> fmt::Debug for EventSubscriber<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSubscriber")
            .field("destination", &self.consumer.destination().name)
            .field("payload", &self.payload)
            .finish()
    }
}

/// Decode one envelope, counting the outcome.
fn decode<T: DeserializeOwned>(
    envelope: &Envelope,
    destination: &DestinationSpec,
) -> Result<Option<T>, CourierError> {
    match codec::read::<T>(envelope) {
        Ok(Some(event)) => {
            metric_inc!(MESSAGES_RECEIVED, &[destination.name.as_str()]);
            Ok(Some(event))
        }
        Ok(None) => {
            debug!(destination = %destination.name, "Skipping message without payload");
            Ok(None)
        }
        Err(e) => {
            metric_inc!(DECODE_FAILURES, &[envelope.body.encoding()]);
            Err(e.into())
        }
    }
}

/// Adapts typed callbacks to the raw listener port.
struct DecodingListener<T, F, E> {
    destination: DestinationSpec,
    on_event: F,
    on_error: E,
    _payload: PhantomData<fn() -> T>,
}

impl<T, F, E> MessageListener for DecodingListener<T, F, E>
where
    T: DeserializeOwned + Send + 'static,
    F: Fn(T) + Send + Sync + 'static,
    E: Fn(CourierError) + Send + Sync + 'static,
{
    fn on_message(&self, envelope: Envelope) {
        match decode::<T>(&envelope, &self.destination) {
            Ok(Some(event)) => (self.on_event)(event),
            Ok(None) => {}
            Err(e) => (self.on_error)(e),
        }
    }

    fn on_error(&self, error: ConnectivityError) {
        (self.on_error)(error.into());
    }
}
