//! # Resource Factory Chain
//!
//! Provides every broker resource the container hands out.
//!
//! ```text
//! ConnectionFactory (value)
//!   └── Connection (lazy singleton, started on creation)
//!         └── Session (lazy singleton, non-transacted, auto-ack)
//!               ├── Topic (per request, named by the resolver)
//!               ├── MessageProducer (per request, delivery options applied)
//!               │     └── EventPublisher<T>
//!               └── MessageConsumer (per request, selector + no-local)
//!                     └── EventSubscriber<T>
//! ```
//!
//! Each request first checks the binding table; after `unbind_all` every
//! request fails with `ResolutionError::Unbound`. Nothing here retries.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use courier_bus::{EventPublisher, EventSubscriber};
use courier_telemetry::{metric_inc, RESOLUTION_FAILURES};
use courier_types::{
    BrokerConnection, BrokerSession, ConnectionFactory, CourierError, Credentials,
    DestinationSpec, MessageConsumer, MessageProducer, RequestDescriptor, ResolutionError,
    SessionMode, TypeTag,
};

use crate::bindings::{BindingMode, BindingTable, LazySingleton, ResourceKind};
use crate::registry::{ManagedConnection, TrackingConnectionFactory};
use crate::resolver;

/// Creates and caches broker resources on demand.
pub struct ResourceFactory {
    bindings: BindingTable,
    connections: TrackingConnectionFactory,
    credentials: Credentials,
    connection: LazySingleton<Arc<ManagedConnection>>,
    session: LazySingleton<Arc<dyn BrokerSession>>,
}

impl ResourceFactory {
    /// A factory with every resource kind bound in its default mode.
    #[must_use]
    pub fn new(connections: TrackingConnectionFactory, credentials: Credentials) -> Self {
        let bindings = BindingTable::new();
        for kind in ResourceKind::ALL {
            bindings.bind(kind, kind.default_mode());
        }

        Self {
            bindings,
            connections,
            credentials,
            connection: LazySingleton::new("connection"),
            session: LazySingleton::new("session"),
        }
    }

    /// The binding table.
    #[must_use]
    pub fn bindings(&self) -> &BindingTable {
        &self.bindings
    }

    /// The tracking connection factory (value binding).
    pub fn connection_factory(&self) -> Result<&TrackingConnectionFactory, CourierError> {
        self.require(ResourceKind::ConnectionFactory)?;
        Ok(&self.connections)
    }

    /// The shared connection, created and started on first use.
    pub async fn connection(&self) -> Result<Arc<ManagedConnection>, CourierError> {
        self.require(ResourceKind::Connection)?;
        self.connection
            .get_or_try_init(|| self.open_connection())
            .await
    }

    /// The shared session, created on first use.
    pub async fn session(&self) -> Result<Arc<dyn BrokerSession>, CourierError> {
        self.require(ResourceKind::Session)?;
        self.session.get_or_try_init(|| self.open_session()).await
    }

    /// Materialize the topic a descriptor names.
    pub async fn topic(&self, descriptor: &RequestDescriptor) -> Result<DestinationSpec, CourierError> {
        self.require(ResourceKind::Topic)?;
        let destination = self.resolved(ResourceKind::Topic, resolver::resolve_destination(descriptor))?;
        let session = self.session().await?;
        Ok(session.create_topic(&destination.name).await?)
    }

    /// Materialize a topic by name.
    pub async fn topic_named(&self, name: &str) -> Result<DestinationSpec, CourierError> {
        self.topic(&RequestDescriptor::named(name)).await
    }

    /// A producer for the descriptor's topic, with any declared delivery
    /// options applied.
    pub async fn producer(
        &self,
        descriptor: &RequestDescriptor,
    ) -> Result<Box<dyn MessageProducer>, CourierError> {
        self.require(ResourceKind::MessageProducer)?;
        let destination = self.topic(descriptor).await?;
        let session = self.session().await?;

        let mut producer = session.create_producer(&destination).await?;
        if let Some(delivery) = resolver::resolve_delivery_options(descriptor) {
            producer.set_delivery(delivery)?;
        }
        debug!(destination = %destination.name, delivery = ?producer.delivery(), "Producer created");
        Ok(producer)
    }

    /// A consumer for the descriptor's topic with its selector and no-local
    /// flag.
    pub async fn consumer(
        &self,
        descriptor: &RequestDescriptor,
    ) -> Result<Box<dyn MessageConsumer>, CourierError> {
        self.require(ResourceKind::MessageConsumer)?;
        let destination = self.topic(descriptor).await?;
        let options = resolver::resolve_consumer_options(descriptor);
        let session = self.session().await?;

        let consumer = session.create_consumer(&destination, &options).await?;
        debug!(destination = %destination.name, ?options, "Consumer created");
        Ok(consumer)
    }

    /// A typed publisher. The descriptor's payload must be parameterized
    /// with `T`.
    pub async fn publisher<T>(
        &self,
        descriptor: &RequestDescriptor,
    ) -> Result<EventPublisher<T>, CourierError>
    where
        T: Serialize + 'static,
    {
        self.require(ResourceKind::EventPublisher)?;
        self.check_payload::<T>(ResourceKind::EventPublisher, descriptor)?;
        Ok(EventPublisher::new(self.producer(descriptor).await?))
    }

    /// A typed subscriber. The descriptor's payload must be parameterized
    /// with `T`.
    pub async fn subscriber<T>(
        &self,
        descriptor: &RequestDescriptor,
    ) -> Result<EventSubscriber<T>, CourierError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.require(ResourceKind::EventSubscriber)?;
        self.check_payload::<T>(ResourceKind::EventSubscriber, descriptor)?;
        Ok(EventSubscriber::new(self.consumer(descriptor).await?))
    }

    /// Remove every binding. Cached singletons stay alive until
    /// [`release`](Self::release).
    pub fn unbind_all(&self) -> Vec<ResourceKind> {
        let removed = self.bindings.unbind_all();
        debug!(count = removed.len(), "Resource bindings removed");
        removed
    }

    /// Drop the cached session and connection. Returns whether a connection
    /// had been created.
    pub async fn release(&self) -> bool {
        drop(self.session.take().await);
        self.connection.take().await.is_some()
    }

    async fn open_connection(&self) -> Result<Arc<ManagedConnection>, CourierError> {
        let factory = self.connection_factory()?;
        info!(url = %factory.broker_url(), "Creating broker connection");

        let connection = factory.open(&self.credentials).await?;
        if let Err(e) = connection.start().await {
            // A connection that never started is not handed out; close it now
            if let Err(close_error) = connection.close().await {
                warn!(
                    handle = connection.handle(),
                    error = %close_error,
                    "Failed to close connection after start failure"
                );
            }
            return Err(e.into());
        }
        debug!(handle = connection.handle(), "Broker connection started");
        Ok(Arc::new(connection))
    }

    async fn open_session(&self) -> Result<Arc<dyn BrokerSession>, CourierError> {
        let connection = self.connection().await?;
        Ok(connection
            .create_session(SessionMode::AUTO_ACKNOWLEDGE)
            .await?)
    }

    fn require(&self, kind: ResourceKind) -> Result<BindingMode, ResolutionError> {
        self.resolved(kind, self.bindings.require(kind))
    }

    /// Count and log a resolution failure for `kind`.
    fn resolved<T>(
        &self,
        kind: ResourceKind,
        result: Result<T, ResolutionError>,
    ) -> Result<T, ResolutionError> {
        if let Err(e) = &result {
            metric_inc!(RESOLUTION_FAILURES, &[kind.name()]);
            warn!(resource = %kind, error = %e, "Resource resolution failed");
        }
        result
    }

    fn check_payload<T: 'static>(
        &self,
        kind: ResourceKind,
        descriptor: &RequestDescriptor,
    ) -> Result<(), ResolutionError> {
        let declared = self.resolved(kind, resolver::extract_payload_type(descriptor))?;
        let requested = TypeTag::of::<T>();
        if declared != requested {
            return self.resolved(
                kind,
                Err(ResolutionError::PayloadTypeMismatch {
                    declared: declared.name().to_string(),
                    requested: requested.name().to_string(),
                }),
            );
        }
        Ok(())
    }
}

impl std::fmt::Debug for ResourceFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceFactory")
            .field("bindings", &self.bindings)
            .field("connections", &self.connections)
            .finish_non_exhaustive()
    }
}
