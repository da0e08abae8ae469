//! # In-Memory Broker
//!
//! A process-local implementation of the broker-client ports.
//!
//! Uses `tokio::sync::broadcast` per topic for multi-producer,
//! multi-consumer fan-out. Suitable for tests, demos, and single-process
//! deployments; networked deployments plug a real broker client into the
//! same traits.
//!
//! ```text
//! InMemoryBroker (ConnectionFactory)
//!   └── MemoryConnection ── shutdown signal ──┐
//!         └── MemorySession                   │
//!               ├── MemoryProducer ──┐        │
//!               └── MemoryConsumer ◄─┴─ topic broadcast channel
//! ```

mod connection;
mod endpoints;
pub mod selector;

pub use connection::{MemoryConnection, MemorySession};
pub use endpoints::{MemoryConsumer, MemoryProducer};
pub use selector::{Selector, SelectorError};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::debug;

use courier_types::{
    BrokerConnection, ConnectionFactory, ConnectionId, ConnectivityError, Credentials, Envelope,
};

use crate::DEFAULT_CHANNEL_CAPACITY;

/// A message in flight, tagged with the connection that sent it.
#[derive(Debug)]
pub(crate) struct Delivery {
    pub(crate) envelope: Envelope,
    pub(crate) origin: ConnectionId,
}

/// State shared by every connection of one broker.
pub(crate) struct BrokerState {
    /// Broadcast sender per topic name.
    topics: RwLock<HashMap<String, broadcast::Sender<Arc<Delivery>>>>,

    /// Channel capacity for new topics.
    capacity: usize,

    /// Last assigned connection id.
    next_connection: AtomicU64,

    /// Total connections created.
    connections_created: AtomicU64,

    /// Total `start` calls across connections.
    starts: AtomicU64,
}

impl BrokerState {
    /// Sender for `name`, creating the topic on first use.
    pub(crate) fn topic(&self, name: &str) -> broadcast::Sender<Arc<Delivery>> {
        if let Some(sender) = self.topics.read().get(name) {
            return sender.clone();
        }

        let mut topics = self.topics.write();
        topics
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(topic = name, "Topic created");
                broadcast::channel(self.capacity).0
            })
            .clone()
    }

    pub(crate) fn record_start(&self) {
        self.starts.fetch_add(1, Ordering::Relaxed);
    }
}

/// Process-local broker and connection factory.
#[derive(Clone)]
pub struct InMemoryBroker {
    url: String,
    accepted: Option<Credentials>,
    state: Arc<BrokerState>,
}

impl InMemoryBroker {
    /// Create a broker with default channel capacity that accepts any login.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_capacity(url, DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a broker with the given per-topic channel capacity.
    #[must_use]
    pub fn with_capacity(url: impl Into<String>, capacity: usize) -> Self {
        Self {
            url: url.into(),
            accepted: None,
            state: Arc::new(BrokerState {
                topics: RwLock::new(HashMap::new()),
                capacity: capacity.max(1),
                next_connection: AtomicU64::new(0),
                connections_created: AtomicU64::new(0),
                starts: AtomicU64::new(0),
            }),
        }
    }

    /// Only accept connections presenting these credentials.
    #[must_use]
    pub fn require_credentials(mut self, credentials: Credentials) -> Self {
        self.accepted = Some(credentials);
        self
    }

    /// Total connections created by this broker.
    #[must_use]
    pub fn connections_created(&self) -> u64 {
        self.state.connections_created.load(Ordering::Relaxed)
    }

    /// Total `start` calls across all connections.
    #[must_use]
    pub fn starts(&self) -> u64 {
        self.state.starts.load(Ordering::Relaxed)
    }

    /// Names of every topic created so far.
    #[must_use]
    pub fn topics(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.topics.read().keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl ConnectionFactory for InMemoryBroker {
    fn broker_url(&self) -> &str {
        &self.url
    }

    async fn create_connection(
        &self,
        credentials: &Credentials,
    ) -> Result<Arc<dyn BrokerConnection>, ConnectivityError> {
        if let Some(accepted) = &self.accepted {
            if accepted != credentials {
                return Err(ConnectivityError::Connect {
                    url: self.url.clone(),
                    reason: format!("authentication failed for user {}", credentials.username),
                });
            }
        }

        let id = self.state.next_connection.fetch_add(1, Ordering::Relaxed) + 1;
        self.state.connections_created.fetch_add(1, Ordering::Relaxed);
        debug!(connection = id, url = %self.url, "Connection opened");

        Ok(Arc::new(MemoryConnection::new(id, Arc::clone(&self.state))))
    }
}
