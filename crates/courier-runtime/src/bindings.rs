//! # Bindings
//!
//! The binding table records how each resource kind is provided:
//!
//! | Mode | Meaning |
//! |------|---------|
//! | `Value` | a fixed instance supplied at boot |
//! | `Lazy` | created on first request, then cached |
//! | `Function` | created fresh for every request |
//!
//! Every request checks the table first; an unbound kind fails with
//! `ResolutionError::Unbound`. Shutdown unbinds everything before any
//! connection is closed, so no request can start a new resource mid-teardown.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::debug;

use courier_types::ResolutionError;

/// Resource kinds the factory provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
    ConnectionFactory,
    Connection,
    Session,
    Topic,
    MessageProducer,
    MessageConsumer,
    EventPublisher,
    EventSubscriber,
}

impl ResourceKind {
    /// Every kind, in binding order.
    pub const ALL: [ResourceKind; 8] = [
        Self::ConnectionFactory,
        Self::Connection,
        Self::Session,
        Self::Topic,
        Self::MessageProducer,
        Self::MessageConsumer,
        Self::EventPublisher,
        Self::EventSubscriber,
    ];

    /// Name used in logs and errors.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::ConnectionFactory => "ConnectionFactory",
            Self::Connection => "Connection",
            Self::Session => "Session",
            Self::Topic => "Topic",
            Self::MessageProducer => "MessageProducer",
            Self::MessageConsumer => "MessageConsumer",
            Self::EventPublisher => "EventPublisher",
            Self::EventSubscriber => "EventSubscriber",
        }
    }

    /// How the factory provides this kind.
    #[must_use]
    pub fn default_mode(&self) -> BindingMode {
        match self {
            Self::ConnectionFactory => BindingMode::Value,
            Self::Connection | Self::Session => BindingMode::Lazy,
            Self::Topic
            | Self::MessageProducer
            | Self::MessageConsumer
            | Self::EventPublisher
            | Self::EventSubscriber => BindingMode::Function,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a bound resource is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingMode {
    Value,
    Lazy,
    Function,
}

/// Which resource kinds are currently bound, and how.
#[derive(Debug, Default)]
pub struct BindingTable {
    entries: RwLock<BTreeMap<ResourceKind, BindingMode>>,
}

impl BindingTable {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `kind`, returning the previous mode.
    pub fn bind(&self, kind: ResourceKind, mode: BindingMode) -> Option<BindingMode> {
        debug!(resource = %kind, ?mode, "Binding resource");
        self.entries.write().insert(kind, mode)
    }

    /// Remove the binding for `kind`. Unbinding an absent kind is a no-op.
    pub fn unbind(&self, kind: ResourceKind) -> Option<BindingMode> {
        self.entries.write().remove(&kind)
    }

    /// Remove every binding, returning the kinds that were bound.
    pub fn unbind_all(&self) -> Vec<ResourceKind> {
        let removed = std::mem::take(&mut *self.entries.write());
        removed.into_keys().collect()
    }

    /// Current mode of `kind`.
    #[must_use]
    pub fn mode(&self, kind: ResourceKind) -> Option<BindingMode> {
        self.entries.read().get(&kind).copied()
    }

    /// Mode of `kind`, or `ResolutionError::Unbound`.
    pub fn require(&self, kind: ResourceKind) -> Result<BindingMode, ResolutionError> {
        self.mode(kind).ok_or_else(|| ResolutionError::Unbound {
            resource: kind.name().to_string(),
        })
    }

    /// Number of bound kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True when nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// A value created at most once, on first demand.
///
/// Concurrent first callers serialize on an async mutex around the
/// check-then-create sequence; all of them observe the single instance.
/// A failed initialization caches nothing, so the next caller tries again.
pub struct LazySingleton<T> {
    name: &'static str,
    slot: Mutex<Option<T>>,
}

impl<T: Clone> LazySingleton<T> {
    /// An empty singleton named for logging.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            slot: Mutex::new(None),
        }
    }

    /// The cached value, creating it with `init` if absent.
    pub async fn get_or_try_init<F, Fut, E>(&self, init: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut slot = self.slot.lock().await;
        if let Some(value) = slot.as_ref() {
            return Ok(value.clone());
        }

        let value = init().await?;
        debug!(singleton = self.name, "Singleton materialized");
        *slot = Some(value.clone());
        Ok(value)
    }

    /// The cached value, if created.
    pub async fn get(&self) -> Option<T> {
        self.slot.lock().await.clone()
    }

    /// Remove and return the cached value.
    pub async fn take(&self) -> Option<T> {
        self.slot.lock().await.take()
    }
}

impl<T> fmt::Debug for LazySingleton<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazySingleton")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
