//! # Broker Client Ports
//!
//! The traits the runtime provisions resources through. A broker client
//! library (or the in-memory broker in `courier-bus`) implements them; the
//! runtime never talks to a wire protocol directly.
//!
//! ```text
//! ConnectionFactory ──create_connection──→ BrokerConnection
//!                                              │ create_session
//!                                              ▼
//!                                        BrokerSession
//!                           create_topic / create_producer / create_consumer
//!                                 │                 │
//!                                 ▼                 ▼
//!                          MessageProducer    MessageConsumer ──→ MessageListener
//! ```
//!
//! All creation calls may block on broker I/O and carry no timeout.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::destination::{ConsumerOptions, DeliveryOptions, DestinationSpec};
use crate::envelope::Envelope;
use crate::errors::ConnectivityError;

/// Identifier a broker client assigns to a physical connection.
pub type ConnectionId = u64;

/// Broker login.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Creates credentials.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// How received messages are acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcknowledgeMode {
    /// The session acknowledges each message as it is delivered.
    Auto,
    /// The application acknowledges explicitly.
    Client,
    /// Lazy acknowledgement; duplicates are tolerated.
    DupsOk,
}

/// Session creation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionMode {
    pub transacted: bool,
    pub acknowledge: AcknowledgeMode,
}

impl SessionMode {
    /// Non-transactional, auto-acknowledging.
    pub const AUTO_ACKNOWLEDGE: Self = Self {
        transacted: false,
        acknowledge: AcknowledgeMode::Auto,
    };
}

/// Creates physical broker connections.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// Address of the broker this factory connects to.
    fn broker_url(&self) -> &str;

    /// Opens a new, not yet started, connection.
    async fn create_connection(
        &self,
        credentials: &Credentials,
    ) -> Result<Arc<dyn BrokerConnection>, ConnectivityError>;
}

/// A physical connection to the broker.
#[async_trait]
pub trait BrokerConnection: Send + Sync {
    /// Client-assigned id.
    fn id(&self) -> ConnectionId;

    /// Starts delivery of inbound messages.
    async fn start(&self) -> Result<(), ConnectivityError>;

    /// Opens a session on this connection.
    async fn create_session(
        &self,
        mode: SessionMode,
    ) -> Result<Arc<dyn BrokerSession>, ConnectivityError>;

    /// Closes the connection and every session, producer, and consumer on it.
    async fn close(&self) -> Result<(), ConnectivityError>;

    /// True once `close` has completed.
    fn is_closed(&self) -> bool;

    /// True while a `close` is in progress.
    fn is_closing(&self) -> bool;
}

/// A single-threaded context for producing and consuming messages.
#[async_trait]
pub trait BrokerSession: Send + Sync {
    /// Materializes (or looks up) a topic.
    async fn create_topic(&self, name: &str) -> Result<DestinationSpec, ConnectivityError>;

    /// Creates a producer bound to `destination`.
    async fn create_producer(
        &self,
        destination: &DestinationSpec,
    ) -> Result<Box<dyn MessageProducer>, ConnectivityError>;

    /// Creates a consumer bound to `destination`.
    async fn create_consumer(
        &self,
        destination: &DestinationSpec,
        options: &ConsumerOptions,
    ) -> Result<Box<dyn MessageConsumer>, ConnectivityError>;
}

/// Sends messages to one destination.
#[async_trait]
pub trait MessageProducer: Send + Sync {
    /// Destination this producer sends to.
    fn destination(&self) -> &DestinationSpec;

    /// Applies persistence, priority, and timestamp settings.
    fn set_delivery(&mut self, options: DeliveryOptions) -> Result<(), ConnectivityError>;

    /// Current delivery settings.
    fn delivery(&self) -> DeliveryOptions;

    /// Dispatches one message.
    async fn send(&self, envelope: Envelope) -> Result<(), ConnectivityError>;
}

/// Push-mode callback installed on a consumer.
///
/// Invoked on the broker client's dispatch task, once per inbound message,
/// in arrival order.
pub trait MessageListener: Send + Sync {
    /// Called with each inbound message.
    fn on_message(&self, envelope: Envelope);

    /// Called when delivery fails at the transport layer.
    fn on_error(&self, error: ConnectivityError);
}

/// Receives messages from one destination.
#[async_trait]
pub trait MessageConsumer: Send + Sync {
    /// Destination this consumer reads from.
    fn destination(&self) -> &DestinationSpec;

    /// Waits for the next message. Returns `Ok(None)` once the consumer or
    /// its connection is closed. Messages lost in transport are reported as
    /// an error; the following call resumes with the next retained message.
    async fn receive(&self) -> Result<Option<Envelope>, ConnectivityError>;

    /// Switches to push mode, replacing any previously installed listener.
    fn set_listener(&self, listener: Arc<dyn MessageListener>) -> Result<(), ConnectivityError>;

    /// Stops delivery and unblocks any pending `receive`.
    async fn close(&self) -> Result<(), ConnectivityError>;

    /// True once the consumer is closed.
    fn is_closed(&self) -> bool;
}
