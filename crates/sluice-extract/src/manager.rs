//! Connection management
//!
//! [`ConnectionManager`] resolves named connection settings into
//! [`ConnectionHandle`]s and caches one handle per name for its own lifetime.
//! Handles are lazy: no network call happens until a component asks the handle
//! for a connection, so a bad host surfaces when the data is first read.
//!
//! Resolution order for an uncached name:
//! 1. the name must be configured (`ConfigError`)
//! 2. the credential variable must be set and non-empty (`SecurityError`)
//! 3. the driver must have a backend (`ConfigError`)

use secrecy::SecretString;
use sluice_rdbc::connection::{Connection, ConnectionConfig, ConnectionFactory, DatabaseType};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::ConnectionSettings;
use crate::error::{ExtractError, Result};

/// Environment lookup used to resolve credential references
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// A resolved, not yet connected, connection target.
///
/// Cloning is cheap; clones share the same configuration.
#[derive(Clone)]
pub struct ConnectionHandle {
    name: Arc<str>,
    config: Arc<ConnectionConfig>,
    factory: Arc<dyn ConnectionFactory>,
}

impl ConnectionHandle {
    /// Connection name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Connection configuration (password redacted in `Debug`)
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Open a new connection scoped to the caller
    pub async fn connect(&self) -> sluice_rdbc::Result<Box<dyn Connection>> {
        debug!(connection = %self.name, "connecting to {}", self.config.describe());
        self.factory.connect(&self.config).await
    }

    /// Whether two handles are the same cached handle
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.config, &other.config)
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish()
    }
}

/// Backend factory for a database type
fn factory_for(database_type: DatabaseType) -> Result<Arc<dyn ConnectionFactory>> {
    match database_type {
        DatabaseType::PostgreSQL => Ok(Arc::new(sluice_rdbc::postgres::PgConnectionFactory)),
        other => Err(ExtractError::config(format!(
            "no backend available for {} connections",
            other
        ))),
    }
}

/// Resolves and caches connection handles by name
pub struct ConnectionManager {
    settings: HashMap<String, ConnectionSettings>,
    cache: HashMap<String, ConnectionHandle>,
    env: EnvLookup,
    factory: Option<Arc<dyn ConnectionFactory>>,
}

impl ConnectionManager {
    /// Create a manager over the configured connections, reading credentials
    /// from the process environment
    pub fn new(settings: HashMap<String, ConnectionSettings>) -> Self {
        Self {
            settings,
            cache: HashMap::new(),
            env: Arc::new(|key| std::env::var(key).ok()),
            factory: None,
        }
    }

    /// Resolve credentials through a custom lookup
    pub fn with_env(mut self, env: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        self.env = Arc::new(env);
        self
    }

    /// Use one factory for every connection instead of the driver's backend
    pub fn with_factory(mut self, factory: Arc<dyn ConnectionFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Number of cached handles
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    /// Get the handle for `name`, resolving and caching it on first use
    pub fn get_connection(&mut self, name: &str) -> Result<ConnectionHandle> {
        if let Some(handle) = self.cache.get(name) {
            return Ok(handle.clone());
        }

        let settings = self
            .settings
            .get(name)
            .ok_or_else(|| ExtractError::config(format!("connection '{}' is not defined", name)))?;

        let env_var = settings.password_env.trim();
        let password = (self.env)(env_var)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                ExtractError::security(format!(
                    "environment variable '{}' for connection '{}' is not set or empty",
                    env_var, name
                ))
            })?;

        let database_type = DatabaseType::from_driver(&settings.driver)
            .map_err(|e| ExtractError::config(format!("connection '{}': {}", name, e)))?;
        let factory = match &self.factory {
            Some(factory) => Arc::clone(factory),
            None => factory_for(database_type)?,
        };

        let config = ConnectionConfig::new(
            database_type,
            settings.host.clone(),
            settings.port,
            settings.database.clone(),
            settings.username.clone(),
            SecretString::from(password),
        )
        .with_connect_timeout(settings.connect_timeout_ms);

        info!(connection = name, "resolved {}", config.describe());

        let handle = ConnectionHandle {
            name: Arc::from(name),
            config: Arc::new(config),
            factory,
        };
        self.cache.insert(name.to_string(), handle.clone());
        Ok(handle)
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("connections", &self.settings.keys().collect::<Vec<_>>())
            .field("cached", &self.cache.keys().collect::<Vec<_>>())
            .finish()
    }
}
