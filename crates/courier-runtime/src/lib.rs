//! # Courier Runtime Library
//!
//! Resolves resource requests into broker resources and manages their
//! lifecycle. The demo entry point is the `main.rs` binary.
//!
//! ## Modules
//!
//! - `resolver/` - descriptor to destination, consumer, and delivery options
//! - `registry/` - connection tracking and aggregated teardown
//! - `bindings` - binding table and lazy singletons
//! - `factory/` - the resource factory chain
//! - `container/` - boot, configuration, and shutdown
//!
//! ## Request Flow
//!
//! ```text
//! RequestDescriptor ──→ resolver ──→ DestinationSpec / options
//!                                         │
//!                                         ▼
//!                 ResourceFactory ──→ Connection ──→ Session ──→ Producer / Consumer
//!                        │                │                          │
//!                  BindingTable    ConnectionRegistry      EventPublisher / EventSubscriber
//! ```

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod bindings;
pub mod container;
pub mod factory;
pub mod registry;
pub mod resolver;

pub use bindings::{BindingMode, BindingTable, LazySingleton, ResourceKind};
pub use container::{
    BrokerSettings, ConfigError, EnvSecretStore, MessagingContainer, SecretStore,
    ShutdownReport, StaticSecretStore,
};
pub use factory::ResourceFactory;
pub use registry::{
    ConnectionHandle, ConnectionRegistry, ManagedConnection, TrackingConnectionFactory,
};
pub use resolver::{resolve, ResolutionTarget, ResolvedResource};
