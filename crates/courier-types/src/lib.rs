//! # Courier Types Crate
//!
//! Types shared by every Courier crate.
//!
//! ## Design Principles
//!
//! - **Resolved once**: a `RequestDescriptor` flattens its annotations when it
//!   is built; nothing walks annotation metadata at request time.
//! - **Explicit errors**: every broker call returns a `Result` carrying one of
//!   the taxonomy errors in [`errors`].
//! - **Ports, not protocols**: the broker client is reached only through the
//!   traits in [`broker`].

pub mod broker;
pub mod descriptor;
pub mod destination;
pub mod envelope;
pub mod errors;

pub use broker::{
    AcknowledgeMode, BrokerConnection, BrokerSession, ConnectionFactory, ConnectionId,
    Credentials, MessageConsumer, MessageListener, MessageProducer, SessionMode,
};
pub use descriptor::{
    Annotation, PayloadType, RequestDescriptor, RequestDescriptorBuilder, ResolvedAnnotations,
    Stereotype, TypeTag,
};
pub use destination::{ConsumerOptions, DeliveryOptions, DestinationKind, DestinationSpec, Persistence};
pub use envelope::{Body, DeliveryHeaders, Envelope, FieldValue, ObjectBody};
pub use errors::{AggregateError, CodecError, ConnectivityError, CourierError, ResolutionError};
