//! # Connection Registry
//!
//! Tracks every physical connection the tracking factory creates so that
//! shutdown can attempt to close all of them and report every failure.
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │               ConnectionRegistry              │
//! │                                               │
//! │   handle 1 ──→ Arc<dyn BrokerConnection>      │
//! │   handle 2 ──→ Arc<dyn BrokerConnection>      │
//! │      ...                                      │
//! └───────────────┬───────────────────────────────┘
//!                 │ close_all: snapshot, then close each
//!                 ▼
//!         Result<(), AggregateError>
//! ```
//!
//! Entries are added only by [`TrackingConnectionFactory`]. A connection
//! closed through its [`ManagedConnection`] deregisters itself. An entry the
//! registry alone still references at shutdown was never closed by its
//! owner: it is logged as a leak and then closed like any other.

mod tracking;

pub use tracking::{ManagedConnection, TrackingConnectionFactory};

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use courier_telemetry::{metric_dec, metric_inc, CONNECTIONS_OPEN, CONNECTION_CLOSE_FAILURES};
use courier_types::{AggregateError, BrokerConnection};

/// Opaque registry key, assigned in creation order.
pub type ConnectionHandle = u64;

/// Reason carried by the aggregate returned from [`ConnectionRegistry::close_all`].
pub const CLOSE_FAILURE_REASON: &str = "Failed to close connections";

/// Registry of tracked broker connections.
#[derive(Default)]
pub struct ConnectionRegistry {
    /// Ordered by handle, so causes come out in attempt order.
    entries: Mutex<BTreeMap<ConnectionHandle, Arc<dyn BrokerConnection>>>,
    next_handle: AtomicU64,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a connection.
    pub(crate) fn track(&self, connection: Arc<dyn BrokerConnection>) -> ConnectionHandle {
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed) + 1;
        let connection_id = connection.id();
        self.entries.lock().insert(handle, connection);
        metric_inc!(CONNECTIONS_OPEN);
        debug!(handle, connection = connection_id, "Connection tracked");
        handle
    }

    /// Stop tracking a connection. Returns `false` if it was not tracked.
    pub fn deregister(&self, handle: ConnectionHandle) -> bool {
        let removed = self.entries.lock().remove(&handle).is_some();
        if removed {
            metric_dec!(CONNECTIONS_OPEN);
            debug!(handle, "Connection deregistered");
        }
        removed
    }

    /// Number of tracked connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True when nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Handles of every tracked connection, ascending.
    #[must_use]
    pub fn handles(&self) -> Vec<ConnectionHandle> {
        self.entries.lock().keys().copied().collect()
    }

    /// Close every tracked connection that is neither closed nor closing.
    ///
    /// Every close is attempted even when earlier ones fail. The tracked set
    /// is drained before the first close, so a connection tracked while this
    /// runs stays registered for a later call.
    ///
    /// # Errors
    ///
    /// An [`AggregateError`] holding every close failure, in attempt order.
    pub async fn close_all(&self) -> Result<(), AggregateError> {
        let snapshot = std::mem::take(&mut *self.entries.lock());
        if snapshot.is_empty() {
            return Ok(());
        }

        info!(connections = snapshot.len(), "Closing tracked connections");
        let mut causes = Vec::new();

        for (handle, connection) in snapshot {
            metric_dec!(CONNECTIONS_OPEN);

            if connection.is_closed() || connection.is_closing() {
                debug!(handle, connection = connection.id(), "Skipping closed connection");
                continue;
            }

            if Arc::strong_count(&connection) == 1 {
                warn!(
                    handle,
                    connection = connection.id(),
                    "Connection leaked: no owner closed it before shutdown"
                );
            }

            if let Err(e) = connection.close().await {
                metric_inc!(CONNECTION_CLOSE_FAILURES);
                debug!(handle, connection = connection.id(), error = %e, "Close attempt failed");
                causes.push(e);
            }
        }

        match AggregateError::new(CLOSE_FAILURE_REASON, causes) {
            Some(aggregate) => Err(aggregate),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("handles", &self.handles())
            .finish()
    }
}
