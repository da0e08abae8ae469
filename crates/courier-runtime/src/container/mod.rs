//! # Messaging Container
//!
//! Owns the connection registry and the resource factory for one
//! activation, from boot to shutdown.
//!
//! ## Shutdown Sequence
//!
//! 1. Unbind every resource kind, so no new request can create resources
//! 2. Close every tracked connection, collecting failures
//! 3. Release the cached connection and session
//!
//! Both of the first two steps always run. Close failures are logged one by
//! one and returned in the [`ShutdownReport`]; they never abort shutdown.

pub mod config;

pub use config::{
    load_credentials, BrokerSettings, ConfigError, EnvSecretStore, SecretStore,
    StaticSecretStore,
};

use std::sync::Arc;

use tracing::{error, info};

use courier_types::{AggregateError, ConnectionFactory};

use crate::bindings::ResourceKind;
use crate::factory::ResourceFactory;
use crate::registry::{ConnectionRegistry, TrackingConnectionFactory};

/// One activation of the messaging layer.
pub struct MessagingContainer {
    settings: BrokerSettings,
    registry: Arc<ConnectionRegistry>,
    resources: ResourceFactory,
}

impl MessagingContainer {
    /// Boot a container.
    ///
    /// `connect` builds the broker's connection factory from the validated
    /// settings; credentials come from `secrets`.
    pub fn boot<F>(
        settings: BrokerSettings,
        secrets: &dyn SecretStore,
        connect: F,
    ) -> Result<Self, ConfigError>
    where
        F: FnOnce(&BrokerSettings) -> Arc<dyn ConnectionFactory>,
    {
        settings.validate()?;

        let registry = Arc::new(ConnectionRegistry::new());
        let tracking = TrackingConnectionFactory::new(connect(&settings), Arc::clone(&registry));
        let resources = ResourceFactory::new(tracking, load_credentials(secrets));

        info!(url = %settings.url, "Messaging container booted");
        Ok(Self {
            settings,
            registry,
            resources,
        })
    }

    /// Boot from `COURIER_BROKER_URL` and `COURIER_SECRET_*` variables.
    pub fn from_env<F>(connect: F) -> Result<Self, ConfigError>
    where
        F: FnOnce(&BrokerSettings) -> Arc<dyn ConnectionFactory>,
    {
        Self::boot(BrokerSettings::from_env()?, &EnvSecretStore, connect)
    }

    /// Broker settings this container was booted with.
    #[must_use]
    pub fn settings(&self) -> &BrokerSettings {
        &self.settings
    }

    /// Resource factory for requesting connections, topics, and endpoints.
    #[must_use]
    pub fn resources(&self) -> &ResourceFactory {
        &self.resources
    }

    /// Registry of connections created by this container.
    #[must_use]
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Tear everything down. Safe to call more than once.
    pub async fn shutdown(&self) -> ShutdownReport {
        info!("Shutting down messaging container...");

        let unbound = self.resources.unbind_all();
        let close_error = self.registry.close_all().await.err();
        if let Some(aggregate) = &close_error {
            for cause in aggregate.causes() {
                error!(error = %cause, "Failed to close connection");
            }
        }
        let released_connection = self.resources.release().await;

        let report = ShutdownReport {
            unbound,
            released_connection,
            close_error,
        };
        info!(
            unbound = report.unbound.len(),
            close_failures = report.close_failures(),
            "Messaging container shut down"
        );
        report
    }
}

impl std::fmt::Debug for MessagingContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessagingContainer")
            .field("settings", &self.settings)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

/// What a shutdown did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Resource kinds that were still bound.
    pub unbound: Vec<ResourceKind>,
    /// Whether a shared connection had been created.
    pub released_connection: bool,
    /// Every connection that failed to close.
    pub close_error: Option<AggregateError>,
}

impl ShutdownReport {
    /// Number of connections that failed to close.
    #[must_use]
    pub fn close_failures(&self) -> usize {
        self.close_error
            .as_ref()
            .map_or(0, |aggregate| aggregate.causes().len())
    }

    /// True when every close succeeded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.close_error.is_none()
    }
}
