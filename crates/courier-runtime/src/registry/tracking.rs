//! Connection factory wrapper that registers everything it creates.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use courier_telemetry::{metric_inc, CONNECTIONS_CREATED};
use courier_types::{
    BrokerConnection, BrokerSession, ConnectionFactory, ConnectionId, ConnectivityError,
    Credentials, SessionMode,
};

use super::{ConnectionHandle, ConnectionRegistry};

/// Wraps a broker's connection factory and tracks every connection it opens.
#[derive(Clone)]
pub struct TrackingConnectionFactory {
    inner: Arc<dyn ConnectionFactory>,
    registry: Arc<ConnectionRegistry>,
}

impl TrackingConnectionFactory {
    /// Track connections from `inner` in `registry`.
    #[must_use]
    pub fn new(inner: Arc<dyn ConnectionFactory>, registry: Arc<ConnectionRegistry>) -> Self {
        Self { inner, registry }
    }

    /// Registry connections are tracked in.
    #[must_use]
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Open and register a connection.
    pub async fn open(&self, credentials: &Credentials) -> Result<ManagedConnection, ConnectivityError> {
        let connection = self.inner.create_connection(credentials).await?;
        let handle = self.registry.track(Arc::clone(&connection));
        metric_inc!(CONNECTIONS_CREATED);

        Ok(ManagedConnection {
            handle,
            inner: connection,
            registry: Arc::clone(&self.registry),
        })
    }
}

#[async_trait]
impl ConnectionFactory for TrackingConnectionFactory {
    fn broker_url(&self) -> &str {
        self.inner.broker_url()
    }

    async fn create_connection(
        &self,
        credentials: &Credentials,
    ) -> Result<Arc<dyn BrokerConnection>, ConnectivityError> {
        Ok(Arc::new(self.open(credentials).await?))
    }
}

impl std::fmt::Debug for TrackingConnectionFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackingConnectionFactory")
            .field("broker_url", &self.inner.broker_url())
            .field("registry", &self.registry)
            .finish()
    }
}

/// A tracked connection. Closing it also deregisters it.
pub struct ManagedConnection {
    handle: ConnectionHandle,
    inner: Arc<dyn BrokerConnection>,
    registry: Arc<ConnectionRegistry>,
}

impl ManagedConnection {
    /// Registry handle of this connection.
    #[must_use]
    pub fn handle(&self) -> ConnectionHandle {
        self.handle
    }
}

#[async_trait]
impl BrokerConnection for ManagedConnection {
    fn id(&self) -> ConnectionId {
        self.inner.id()
    }

    async fn start(&self) -> Result<(), ConnectivityError> {
        self.inner.start().await
    }

    async fn create_session(
        &self,
        mode: SessionMode,
    ) -> Result<Arc<dyn BrokerSession>, ConnectivityError> {
        self.inner.create_session(mode).await
    }

    /// Close the connection, then stop tracking it. A failed close leaves
    /// it registered so shutdown tries again.
    async fn close(&self) -> Result<(), ConnectivityError> {
        self.inner.close().await?;
        if self.registry.deregister(self.handle) {
            debug!(handle = self.handle, "Connection closed by owner");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    fn is_closing(&self) -> bool {
        self.inner.is_closing()
    }
}

impl std::fmt::Debug for ManagedConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedConnection")
            .field("handle", &self.handle)
            .field("connection", &self.inner.id())
            .finish()
    }
}
