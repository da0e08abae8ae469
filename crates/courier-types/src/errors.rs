//! # Error Types
//!
//! The error taxonomy shared by every Courier crate.
//!
//! | Error | Raised by | Retried |
//! |-------|-----------|---------|
//! | `ConnectivityError` | broker calls (connect, session, send, receive, close) | never |
//! | `ResolutionError` | malformed request descriptors, unbound resources | never |
//! | `CodecError` | unrecognised or malformed envelopes | never |
//! | `AggregateError` | connection teardown | logged, not propagated |

use std::fmt;

use thiserror::Error;

/// Transport-level failures reported by the broker client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectivityError {
    /// The physical connection could not be established.
    #[error("Failed to connect to broker at {url}: {reason}")]
    Connect { url: String, reason: String },

    /// The connection was created but could not be started.
    #[error("Failed to start connection {connection}: {reason}")]
    Start { connection: u64, reason: String },

    /// A session could not be created on the connection.
    #[error("Failed to create session: {reason}")]
    Session { reason: String },

    /// A destination could not be materialized.
    #[error("Failed to create destination {name}: {reason}")]
    Destination { name: String, reason: String },

    /// A producer could not be created or configured.
    #[error("Failed to create producer for {destination}: {reason}")]
    Producer { destination: String, reason: String },

    /// A consumer could not be created or configured.
    #[error("Failed to create consumer for {destination}: {reason}")]
    Consumer { destination: String, reason: String },

    /// An outbound message could not be dispatched.
    #[error("Failed to send to {destination}: {reason}")]
    Send { destination: String, reason: String },

    /// An inbound message could not be received.
    #[error("Failed to receive from {destination}: {reason}")]
    Receive { destination: String, reason: String },

    /// A connection failed to close.
    #[error("Failed to close connection {connection}: {reason}")]
    Close { connection: u64, reason: String },

    /// The operation was attempted on a closed connection or session.
    #[error("Connection {connection} is closed")]
    Closed { connection: u64 },
}

/// A request descriptor could not be turned into a concrete resource.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    /// Neither a positional name nor a topic annotation was supplied.
    #[error("Topic request for {qualifier} requires a topic annotation on the qualifier")]
    MissingDestination { qualifier: String },

    /// A single positional argument was supplied but it is not a string.
    #[error("Expected a string destination name for {qualifier}, was {found}")]
    NonStringArgument { qualifier: String, found: String },

    /// The payload type carries no type parameters at all.
    #[error("{type_name} is not parameterized")]
    NotParameterized { type_name: String },

    /// The payload type is parameterized but with an empty argument list.
    #[error("{type_name} has no type parameters")]
    NoTypeArguments { type_name: String },

    /// The requested event type differs from the descriptor's payload type.
    #[error("Payload type mismatch: descriptor declares {declared}, requested {requested}")]
    PayloadTypeMismatch { declared: String, requested: String },

    /// A delivery priority outside 0..=9 was declared.
    #[error("Delivery priority {priority} is outside 0..=9")]
    InvalidPriority { priority: u8 },

    /// The resource binding was removed (container shut down) or never made.
    #[error("No binding for {resource}")]
    Unbound { resource: String },
}

/// An envelope could not be decoded or encoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The envelope uses an encoding the codec does not understand.
    #[error("Unsupported message type: {type_tag}")]
    UnsupportedEncoding { type_tag: String },

    /// A binary payload ended before its declared length.
    #[error("Binary payload truncated: expected {expected} bytes, found {available}")]
    Truncated { expected: usize, available: usize },

    /// A binary payload did not carry valid UTF-8 text.
    #[error("Binary payload is not valid UTF-8")]
    InvalidUtf8,

    /// A text payload exceeds the two-byte length prefix.
    #[error("Text of {length} bytes does not fit a length-prefixed payload")]
    Oversized { length: usize },

    /// The structured document could not be parsed, built, or mapped to the
    /// target type.
    #[error("Document error: {0}")]
    Document(String),
}

impl From<serde_json::Error> for CodecError {
    fn from(error: serde_json::Error) -> Self {
        Self::Document(error.to_string())
    }
}

/// One or more tracked connections failed to close.
///
/// Carries every underlying failure, in the order the closes were attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateError {
    reason: String,
    causes: Vec<ConnectivityError>,
}

impl AggregateError {
    /// Builds an aggregate from the collected causes.
    ///
    /// Returns `None` when `causes` is empty: an aggregate with nothing in it
    /// is not an error.
    #[must_use]
    pub fn new(reason: impl Into<String>, causes: Vec<ConnectivityError>) -> Option<Self> {
        if causes.is_empty() {
            return None;
        }
        Some(Self {
            reason: reason.into(),
            causes,
        })
    }

    /// Summary of what failed.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Every underlying failure, in attempt order.
    #[must_use]
    pub fn causes(&self) -> &[ConnectivityError] {
        &self.causes
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} causes)", self.reason, self.causes.len())
    }
}

impl std::error::Error for AggregateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.causes
            .first()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

/// Umbrella error returned by the typed publish/subscribe API and the
/// resource factory.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CourierError {
    #[error(transparent)]
    Connectivity(#[from] ConnectivityError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    fn close_failure(connection: u64) -> ConnectivityError {
        ConnectivityError::Close {
            connection,
            reason: "socket reset".to_string(),
        }
    }

    #[test]
    fn test_aggregate_requires_causes() {
        assert!(AggregateError::new("nothing failed", Vec::new()).is_none());
    }

    #[test]
    fn test_aggregate_keeps_cause_order() {
        let error = AggregateError::new(
            "Failed to close all connections",
            vec![close_failure(3), close_failure(1)],
        )
        .unwrap();

        assert_eq!(error.reason(), "Failed to close all connections");
        assert_eq!(error.causes(), &[close_failure(3), close_failure(1)]);
        assert_eq!(error.to_string(), "Failed to close all connections (2 causes)");
    }

    #[test]
    fn test_aggregate_source_is_first_cause() {
        let error = AggregateError::new("teardown", vec![close_failure(7)]).unwrap();
        let source = error.source().unwrap();
        assert_eq!(source.to_string(), "Failed to close connection 7: socket reset");
    }

    #[test]
    fn test_courier_error_conversions() {
        let error: CourierError = ResolutionError::MissingDestination {
            qualifier: "orders".to_string(),
        }
        .into();
        assert!(matches!(error, CourierError::Resolution(_)));

        let error: CourierError = CodecError::UnsupportedEncoding {
            type_tag: "stream".to_string(),
        }
        .into();
        assert_eq!(error.to_string(), "Unsupported message type: stream");
    }
}
