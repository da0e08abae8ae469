//! # Destinations and Endpoint Options
//!
//! Resolved, broker-independent descriptions of where messages go and how
//! producers and consumers treat them.

use serde::{Deserialize, Serialize};

use crate::errors::ResolutionError;

/// Kind of routing target on the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum DestinationKind {
    /// Publish/subscribe fan-out to every active consumer.
    Topic,
}

/// A named destination resolved from a request descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DestinationSpec {
    /// Routing kind.
    pub kind: DestinationKind,
    /// Destination name as known to the broker.
    pub name: String,
}

impl DestinationSpec {
    /// A topic destination.
    #[must_use]
    pub fn topic(name: impl Into<String>) -> Self {
        Self {
            kind: DestinationKind::Topic,
            name: name.into(),
        }
    }
}

/// Consumer-side filtering options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumerOptions {
    /// Filter expression evaluated against message properties.
    /// `None` delivers everything.
    pub selector: Option<String>,
    /// When set, messages published over the consumer's own connection are
    /// not delivered to it.
    pub no_local: bool,
}

/// Message persistence mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Persistence {
    /// Messages may be lost if the broker fails.
    #[default]
    NotPersistent,
    /// Messages are written to stable storage before being acknowledged.
    Persistent,
}

impl Persistence {
    /// Numeric delivery mode as used on the wire.
    #[must_use]
    pub fn delivery_mode(self) -> u8 {
        match self {
            Self::NotPersistent => 1,
            Self::Persistent => 2,
        }
    }
}

/// Producer delivery settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryOptions {
    /// Persistence mode for every message sent.
    pub persistence: Persistence,
    /// Priority, 0 (lowest) to 9 (highest).
    pub priority: u8,
    /// Whether outbound messages carry a send timestamp.
    pub timestamps: bool,
}

impl DeliveryOptions {
    /// Highest priority the broker accepts.
    pub const MAX_PRIORITY: u8 = 9;

    /// Priority applied when none is declared.
    pub const DEFAULT_PRIORITY: u8 = 4;

    /// Checks the priority range.
    pub fn validate(&self) -> Result<(), ResolutionError> {
        if self.priority > Self::MAX_PRIORITY {
            return Err(ResolutionError::InvalidPriority {
                priority: self.priority,
            });
        }
        Ok(())
    }

    /// Sets the persistence mode.
    #[must_use]
    pub fn with_persistence(mut self, persistence: Persistence) -> Self {
        self.persistence = persistence;
        self
    }

    /// Sets the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Enables or disables send timestamps.
    #[must_use]
    pub fn with_timestamps(mut self, timestamps: bool) -> Self {
        self.timestamps = timestamps;
        self
    }
}

impl Default for DeliveryOptions {
    fn default() -> Self {
        Self {
            persistence: Persistence::NotPersistent,
            priority: Self::DEFAULT_PRIORITY,
            timestamps: true,
        }
    }
}
