//! Shared fixtures for the integration flows.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use serde::{Deserialize, Serialize};

use courier_bus::InMemoryBroker;
use courier_runtime::{BrokerSettings, MessagingContainer, StaticSecretStore};
use courier_types::{
    BrokerConnection, BrokerSession, ConnectionFactory, ConnectionId, ConnectivityError,
    Credentials, RequestDescriptor, SessionMode,
};

/// Event published by the order service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub order_id: u64,
    pub customer: String,
    pub lines: Vec<String>,
}

impl OrderPlaced {
    pub fn sample(order_id: u64) -> Self {
        Self {
            order_id,
            customer: format!("customer-{}", order_id),
            lines: vec!["widget".to_string()],
        }
    }
}

/// Descriptor for a typed endpoint on the `orders` topic.
pub fn orders_descriptor(base: &str) -> RequestDescriptor {
    RequestDescriptor::builder("orders-feed")
        .event::<OrderPlaced>(base)
        .topic("orders")
        .build()
        .expect("valid descriptor")
}

/// Boot a container on `factory` with default settings and credentials.
pub fn boot(factory: Arc<dyn ConnectionFactory>) -> MessagingContainer {
    MessagingContainer::boot(BrokerSettings::default(), &StaticSecretStore::new(), move |_| {
        factory
    })
    .expect("container boots")
}

/// In-memory broker whose chosen connections refuse to close.
pub struct FlakyBroker {
    inner: InMemoryBroker,
    failing: Mutex<BTreeSet<ConnectionId>>,
}

impl FlakyBroker {
    pub fn new(inner: InMemoryBroker) -> Arc<Self> {
        Arc::new(Self {
            inner,
            failing: Mutex::new(BTreeSet::new()),
        })
    }

    /// Make the connection with this id fail on close.
    pub fn fail_close(&self, connection: ConnectionId) {
        self.failing.lock().insert(connection);
    }
}

#[async_trait]
impl ConnectionFactory for FlakyBroker {
    fn broker_url(&self) -> &str {
        self.inner.broker_url()
    }

    async fn create_connection(
        &self,
        credentials: &Credentials,
    ) -> Result<Arc<dyn BrokerConnection>, ConnectivityError> {
        let inner = self.inner.create_connection(credentials).await?;
        let fail = self.failing.lock().contains(&inner.id());
        Ok(Arc::new(FlakyConnection { inner, fail }))
    }
}

struct FlakyConnection {
    inner: Arc<dyn BrokerConnection>,
    fail: bool,
}

#[async_trait]
impl BrokerConnection for FlakyConnection {
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

    async fn close(&self) -> Result<(), ConnectivityError> {
        if self.fail {
            return Err(ConnectivityError::Close {
                connection: self.inner.id(),
                reason: "broker unreachable".to_string(),
            });
        }
        self.inner.close().await
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    fn is_closing(&self) -> bool {
        self.inner.is_closing()
    }
}

/// Holds the next connection close until [`CloseGate::release`] is called.
#[derive(Default)]
pub struct CloseGate {
    armed: AtomicBool,
    entered: Notify,
    release: Notify,
}

impl CloseGate {
    /// Hold the next close that arrives.
    pub fn arm(&self) {
        self.armed.store(true, Ordering::Release);
    }

    /// Wait until a held close has started.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Let the held close finish.
    pub fn release(&self) {
        self.release.notify_one();
    }
}

/// In-memory broker whose connections close through a shared [`CloseGate`].
pub struct GatedBroker {
    inner: InMemoryBroker,
    gate: Arc<CloseGate>,
}

impl GatedBroker {
    pub fn new(inner: InMemoryBroker) -> Arc<Self> {
        Arc::new(Self {
            inner,
            gate: Arc::new(CloseGate::default()),
        })
    }

    pub fn gate(&self) -> &Arc<CloseGate> {
        &self.gate
    }
}

#[async_trait]
impl ConnectionFactory for GatedBroker {
    fn broker_url(&self) -> &str {
        self.inner.broker_url()
    }

    async fn create_connection(
        &self,
        credentials: &Credentials,
    ) -> Result<Arc<dyn BrokerConnection>, ConnectivityError> {
        let inner = self.inner.create_connection(credentials).await?;
        Ok(Arc::new(GatedConnection {
            inner,
            gate: Arc::clone(&self.gate),
        }))
    }
}

struct GatedConnection {
    inner: Arc<dyn BrokerConnection>,
    gate: Arc<CloseGate>,
}

#[async_trait]
impl BrokerConnection for GatedConnection {
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

    async fn close(&self) -> Result<(), ConnectivityError> {
        if self.gate.armed.swap(false, Ordering::AcqRel) {
            self.gate.entered.notify_one();
            self.gate.release.notified().await;
        }
        self.inner.close().await
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    fn is_closing(&self) -> bool {
        self.inner.is_closing()
    }
}
