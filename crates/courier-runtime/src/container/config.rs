//! # Broker Configuration
//!
//! Broker address and login for the messaging container.
//!
//! ## Sources
//!
//! - Broker URL: `COURIER_BROKER_URL` (default `memory://local`)
//! - Credentials: a [`SecretStore`] under `broker/username` and
//!   `broker/password`; a missing secret falls back to `admin`

use std::collections::HashMap;

use courier_types::Credentials;

/// Environment variable holding the broker URL.
pub const BROKER_URL_VAR: &str = "COURIER_BROKER_URL";

/// Broker URL used when none is configured.
pub const DEFAULT_BROKER_URL: &str = "memory://local";

/// Secret key of the broker username.
pub const USERNAME_SECRET: &str = "broker/username";

/// Secret key of the broker password.
pub const PASSWORD_SECRET: &str = "broker/password";

/// Username and password used when the secret store has no entry.
pub const DEFAULT_LOGIN: &str = "admin";

/// Broker connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerSettings {
    /// Broker address, passed through to the connection factory.
    pub url: String,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_BROKER_URL.to_string(),
        }
    }
}

impl BrokerSettings {
    /// Load settings from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let settings = match std::env::var(BROKER_URL_VAR) {
            Ok(url) => Self { url },
            Err(_) => Self::default(),
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings no connection could be made with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::EmptyBrokerUrl);
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The broker URL is empty.
    EmptyBrokerUrl,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::EmptyBrokerUrl => {
                write!(
                    f,
                    "Broker URL is empty. Set {} or leave it unset for {}.",
                    BROKER_URL_VAR, DEFAULT_BROKER_URL
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Source of named secrets.
pub trait SecretStore: Send + Sync {
    /// Secret stored under `key`, if any.
    fn secret(&self, key: &str) -> Option<String>;
}

/// Reads secrets from `COURIER_SECRET_<KEY>` environment variables, with
/// the key upper-cased and `/` mapped to `_`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSecretStore;

impl EnvSecretStore {
    /// Environment variable consulted for `key`.
    #[must_use]
    pub fn variable(key: &str) -> String {
        let suffix: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect();
        format!("COURIER_SECRET_{}", suffix)
    }
}

impl SecretStore for EnvSecretStore {
    fn secret(&self, key: &str) -> Option<String> {
        std::env::var(Self::variable(key)).ok()
    }
}

/// Fixed in-process secrets.
#[derive(Debug, Clone, Default)]
pub struct StaticSecretStore {
    secrets: HashMap<String, String>,
}

impl StaticSecretStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a secret.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.secrets.insert(key.into(), value.into());
        self
    }
}

impl SecretStore for StaticSecretStore {
    fn secret(&self, key: &str) -> Option<String> {
        self.secrets.get(key).cloned()
    }
}

/// Broker login from `store`, falling back to `admin`/`admin`.
pub fn load_credentials(store: &dyn SecretStore) -> Credentials {
    let username = store
        .secret(USERNAME_SECRET)
        .unwrap_or_else(|| DEFAULT_LOGIN.to_string());
    let password = store
        .secret(PASSWORD_SECRET)
        .unwrap_or_else(|| DEFAULT_LOGIN.to_string());
    Credentials::new(username, password)
}
