//! In-memory producers and consumers.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

use courier_types::{
    ConnectionId, ConnectivityError, DeliveryHeaders, DeliveryOptions, DestinationSpec, Envelope,
    MessageConsumer, MessageListener, MessageProducer,
};

use super::connection::ConnectionShared;
use super::selector::Selector;
use super::Delivery;

/// Sends to one topic of the in-memory broker.
pub struct MemoryProducer {
    destination: DestinationSpec,
    connection: Arc<ConnectionShared>,
    sender: broadcast::Sender<Arc<Delivery>>,
    delivery: DeliveryOptions,
}

impl MemoryProducer {
    pub(crate) fn new(
        destination: DestinationSpec,
        connection: Arc<ConnectionShared>,
        sender: broadcast::Sender<Arc<Delivery>>,
    ) -> Self {
        Self {
            destination,
            connection,
            sender,
            delivery: DeliveryOptions::default(),
        }
    }
}

#[async_trait]
impl MessageProducer for MemoryProducer {
    fn destination(&self) -> &DestinationSpec {
        &self.destination
    }

    fn set_delivery(&mut self, options: DeliveryOptions) -> Result<(), ConnectivityError> {
        options
            .validate()
            .map_err(|e| ConnectivityError::Producer {
                destination: self.destination.name.clone(),
                reason: e.to_string(),
            })?;
        self.delivery = options;
        Ok(())
    }

    fn delivery(&self) -> DeliveryOptions {
        self.delivery
    }

    async fn send(&self, mut envelope: Envelope) -> Result<(), ConnectivityError> {
        self.connection.ensure_open()?;

        envelope.message_id = Some(Uuid::new_v4());
        envelope.headers = DeliveryHeaders {
            persistence: self.delivery.persistence,
            priority: self.delivery.priority,
            timestamp_ms: self
                .delivery
                .timestamps
                .then(|| chrono::Utc::now().timestamp_millis()),
        };

        let delivery = Arc::new(Delivery {
            envelope,
            origin: self.connection.id,
        });

        match self.sender.send(delivery) {
            Ok(receivers) => {
                debug!(
                    topic = %self.destination.name,
                    receivers,
                    "Message sent"
                );
            }
            Err(_) => {
                // Topic semantics: nobody listening, nothing retained
                debug!(topic = %self.destination.name, "Message dropped (no consumers)");
            }
        }
        Ok(())
    }
}

/// Consumer-side delivery rules.
#[derive(Debug, Clone)]
pub(crate) struct MessageFilter {
    pub(crate) connection: ConnectionId,
    pub(crate) no_local: bool,
    pub(crate) selector: Option<Selector>,
}

impl MessageFilter {
    fn accepts(&self, delivery: &Delivery) -> bool {
        if self.no_local && delivery.origin == self.connection {
            return false;
        }
        self.selector
            .as_ref()
            .map_or(true, |selector| selector.matches(&delivery.envelope.properties))
    }
}

type ListenerSlot = Arc<RwLock<Option<Arc<dyn MessageListener>>>>;

/// Receives from one topic of the in-memory broker.
///
/// Starts in pull mode (`receive`). Installing a listener moves the topic
/// receiver onto a dispatch task; from then on `receive` is rejected.
pub struct MemoryConsumer {
    destination: DestinationSpec,
    filter: MessageFilter,
    /// `None` once a dispatch task owns the receiver.
    receiver: Mutex<Option<broadcast::Receiver<Arc<Delivery>>>>,
    listener: ListenerSlot,
    connection_shutdown: watch::Receiver<bool>,
    closed: watch::Sender<bool>,
}

impl MemoryConsumer {
    pub(crate) fn new(
        destination: DestinationSpec,
        filter: MessageFilter,
        receiver: broadcast::Receiver<Arc<Delivery>>,
        connection_shutdown: watch::Receiver<bool>,
    ) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            destination,
            filter,
            receiver: Mutex::new(Some(receiver)),
            listener: Arc::new(RwLock::new(None)),
            connection_shutdown,
            closed,
        }
    }
}

/// Resolves once the watched flag turns `true` or its sender goes away.
async fn signalled(mut flag: watch::Receiver<bool>) {
    let _ = flag.wait_for(|closed| *closed).await;
}

#[async_trait]
impl MessageConsumer for MemoryConsumer {
    fn destination(&self) -> &DestinationSpec {
        &self.destination
    }

    async fn receive(&self) -> Result<Option<Envelope>, ConnectivityError> {
        if self.is_closed() {
            return Ok(None);
        }

        let mut guard = self.receiver.lock().await;
        let Some(receiver) = guard.as_mut() else {
            return Err(ConnectivityError::Receive {
                destination: self.destination.name.clone(),
                reason: "consumer is in push mode".to_string(),
            });
        };

        let consumer_closed = signalled(self.closed.subscribe());
        let connection_closed = signalled(self.connection_shutdown.clone());
        tokio::pin!(consumer_closed, connection_closed);

        loop {
            tokio::select! {
                _ = &mut consumer_closed => return Ok(None),
                _ = &mut connection_closed => return Ok(None),
                result = receiver.recv() => match result {
                    Ok(delivery) => {
                        if self.filter.accepts(&delivery) {
                            return Ok(Some(delivery.envelope.clone()));
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => return Ok(None),
                    Err(broadcast::error::RecvError::Lagged(count)) => {
                        warn!(lagged = count, topic = %self.destination.name, "Consumer lagged, some messages dropped");
                        return Err(ConnectivityError::Receive {
                            destination: self.destination.name.clone(),
                            reason: format!("{} messages dropped", count),
                        });
                    }
                },
            }
        }
    }

    fn set_listener(&self, listener: Arc<dyn MessageListener>) -> Result<(), ConnectivityError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            ConnectivityError::Consumer {
                destination: self.destination.name.clone(),
                reason: "no async runtime to dispatch on".to_string(),
            }
        })?;

        let mut guard = self
            .receiver
            .try_lock()
            .map_err(|_| ConnectivityError::Consumer {
                destination: self.destination.name.clone(),
                reason: "consumer is blocked in receive".to_string(),
            })?;

        *self.listener.write() = Some(listener);

        // A dispatch task is already running; it picks up the new listener
        let Some(receiver) = guard.take() else {
            return Ok(());
        };

        let dispatch = Dispatch {
            topic: self.destination.name.clone(),
            filter: self.filter.clone(),
            listener: Arc::clone(&self.listener),
        };
        runtime.spawn(dispatch.run(
            receiver,
            self.closed.subscribe(),
            self.connection_shutdown.clone(),
        ));
        debug!(topic = %self.destination.name, "Listener installed");
        Ok(())
    }

    async fn close(&self) -> Result<(), ConnectivityError> {
        self.closed.send_replace(true);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow() || *self.connection_shutdown.borrow()
    }
}

/// Push-mode delivery loop for one consumer.
struct Dispatch {
    topic: String,
    filter: MessageFilter,
    listener: ListenerSlot,
}

impl Dispatch {
    async fn run(
        self,
        mut receiver: broadcast::Receiver<Arc<Delivery>>,
        consumer_closed: watch::Receiver<bool>,
        connection_closed: watch::Receiver<bool>,
    ) {
        let consumer_closed = signalled(consumer_closed);
        let connection_closed = signalled(connection_closed);
        tokio::pin!(consumer_closed, connection_closed);

        loop {
            tokio::select! {
                _ = &mut consumer_closed => break,
                _ = &mut connection_closed => break,
                result = receiver.recv() => match result {
                    Ok(delivery) => {
                        if !self.filter.accepts(&delivery) {
                            continue;
                        }
                        let current = self.listener.read().clone();
                        if let Some(listener) = current {
                            listener.on_message(delivery.envelope.clone());
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(count)) => {
                        warn!(lagged = count, topic = %self.topic, "Listener lagged, some messages dropped");
                        let current = self.listener.read().clone();
                        if let Some(listener) = current {
                            listener.on_error(ConnectivityError::Receive {
                                destination: self.topic.clone(),
                                reason: format!("{} messages dropped", count),
                            });
                        }
                    }
                },
            }
        }

        debug!(topic = %self.topic, "Listener dispatch stopped");
    }
}
