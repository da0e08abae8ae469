//! # Courier Bus - Codec and Typed Endpoints
//!
//! Everything that touches message bodies and moves messages:
//!
//! - [`codec`]: decodes Text, Binary, Map, and Object envelopes into one
//!   structured document and maps it onto typed values
//! - [`memory`]: a process-local broker implementing the broker-client ports
//! - [`EventPublisher`] / [`EventSubscriber`]: typed wrappers over a raw
//!   producer or consumer
//!
//! ```text
//! ┌──────────────────┐   encode    ┌─────────────────┐
//! │ EventPublisher<T>│ ──────────→ │ MessageProducer │ ──┐
//! └──────────────────┘             └─────────────────┘   │ topic
//! ┌──────────────────┐   decode    ┌─────────────────┐   │
//! │EventSubscriber<T>│ ←────────── │ MessageConsumer │ ◄─┘
//! └──────────────────┘             └─────────────────┘
//! ```

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod codec;
pub mod memory;
pub mod publisher;
pub mod subscriber;

pub use memory::{InMemoryBroker, Selector, SelectorError};
pub use publisher::EventPublisher;
pub use subscriber::EventSubscriber;

/// Messages buffered per topic before slow consumers start lagging.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
