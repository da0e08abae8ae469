//! In-memory connections and sessions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::debug;

use courier_types::{
    BrokerConnection, BrokerSession, ConnectionId, ConnectivityError, ConsumerOptions,
    DestinationSpec, MessageConsumer, MessageProducer, SessionMode,
};

use super::endpoints::{MemoryConsumer, MemoryProducer, MessageFilter};
use super::selector::Selector;
use super::BrokerState;

/// State shared between a connection and everything created on it.
pub(crate) struct ConnectionShared {
    pub(crate) id: ConnectionId,
    pub(crate) broker: Arc<BrokerState>,
    started: AtomicBool,
    closing: AtomicBool,
    closed: AtomicBool,
    /// Flipped to `true` on close; every consumer watches it.
    shutdown: watch::Sender<bool>,
}

impl ConnectionShared {
    pub(crate) fn ensure_open(&self) -> Result<(), ConnectivityError> {
        if self.closed.load(Ordering::Acquire) || self.closing.load(Ordering::Acquire) {
            return Err(ConnectivityError::Closed { connection: self.id });
        }
        Ok(())
    }

    pub(crate) fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }
}

/// A connection to an [`InMemoryBroker`](super::InMemoryBroker).
pub struct MemoryConnection {
    shared: Arc<ConnectionShared>,
}

impl MemoryConnection {
    pub(crate) fn new(id: ConnectionId, broker: Arc<BrokerState>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            shared: Arc::new(ConnectionShared {
                id,
                broker,
                started: AtomicBool::new(false),
                closing: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                shutdown,
            }),
        }
    }

    /// Whether `start` has been called.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.shared.started.load(Ordering::Acquire)
    }
}

#[async_trait]
impl BrokerConnection for MemoryConnection {
    fn id(&self) -> ConnectionId {
        self.shared.id
    }

    async fn start(&self) -> Result<(), ConnectivityError> {
        self.shared.ensure_open()?;
        if !self.shared.started.swap(true, Ordering::AcqRel) {
            self.shared.broker.record_start();
        }
        Ok(())
    }

    async fn create_session(
        &self,
        mode: SessionMode,
    ) -> Result<Arc<dyn BrokerSession>, ConnectivityError> {
        self.shared.ensure_open()?;
        if mode.transacted {
            return Err(ConnectivityError::Session {
                reason: "transacted sessions are not supported".to_string(),
            });
        }

        Ok(Arc::new(MemorySession {
            connection: Arc::clone(&self.shared),
        }))
    }

    async fn close(&self) -> Result<(), ConnectivityError> {
        if self.shared.closed.load(Ordering::Acquire)
            || self.shared.closing.swap(true, Ordering::AcqRel)
        {
            return Ok(());
        }

        self.shared.shutdown.send_replace(true);
        self.shared.closed.store(true, Ordering::Release);
        self.shared.closing.store(false, Ordering::Release);
        debug!(connection = self.shared.id, "Connection closed");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    fn is_closing(&self) -> bool {
        self.shared.closing.load(Ordering::Acquire)
    }
}

/// A session on a [`MemoryConnection`].
pub struct MemorySession {
    connection: Arc<ConnectionShared>,
}

#[async_trait]
impl BrokerSession for MemorySession {
    async fn create_topic(&self, name: &str) -> Result<DestinationSpec, ConnectivityError> {
        self.connection.ensure_open()?;
        if name.trim().is_empty() {
            return Err(ConnectivityError::Destination {
                name: name.to_string(),
                reason: "topic name is empty".to_string(),
            });
        }

        self.connection.broker.topic(name);
        Ok(DestinationSpec::topic(name))
    }

    async fn create_producer(
        &self,
        destination: &DestinationSpec,
    ) -> Result<Box<dyn MessageProducer>, ConnectivityError> {
        self.connection.ensure_open()?;
        let sender = self.connection.broker.topic(&destination.name);

        Ok(Box::new(MemoryProducer::new(
            destination.clone(),
            Arc::clone(&self.connection),
            sender,
        )))
    }

    async fn create_consumer(
        &self,
        destination: &DestinationSpec,
        options: &ConsumerOptions,
    ) -> Result<Box<dyn MessageConsumer>, ConnectivityError> {
        self.connection.ensure_open()?;

        let selector = options
            .selector
            .as_deref()
            .map(Selector::parse)
            .transpose()
            .map_err(|e| ConnectivityError::Consumer {
                destination: destination.name.clone(),
                reason: format!("invalid selector: {}", e),
            })?;

        let filter = MessageFilter {
            connection: self.connection.id,
            no_local: options.no_local,
            selector,
        };
        let receiver = self.connection.broker.topic(&destination.name).subscribe();

        Ok(Box::new(MemoryConsumer::new(
            destination.clone(),
            filter,
            receiver,
            self.connection.shutdown_signal(),
        )))
    }
}
