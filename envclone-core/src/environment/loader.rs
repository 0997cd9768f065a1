//! Environment loading: configuration file to connected handle.

use crate::config::EnvironmentConfig;
use crate::error::{StoreError, mask_url};
use crate::models::EnvironmentClass;
use crate::security::ServiceCredentials;
use crate::store::{Connector, DataStore, DefaultConnector};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Table probed by connectivity checks unless configured otherwise.
pub const DEFAULT_PROBE_TABLE: &str = "profiles";

/// A named, connected environment. Immutable after creation.
#[derive(Clone)]
pub struct Environment {
    pub name: String,
    pub class: EnvironmentClass,
    pub url: String,
    /// True iff the class is production
    pub is_protected: bool,
    pub config_file: PathBuf,
    pub credentials: ServiceCredentials,
    pub client: Arc<dyn DataStore>,
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("name", &self.name)
            .field("class", &self.class)
            .field("url", &mask_url(&self.url))
            .field("is_protected", &self.is_protected)
            .field("config_file", &self.config_file)
            .field("store", &self.client.kind())
            .finish_non_exhaustive()
    }
}

impl Environment {
    /// Builds an environment around an existing client.
    pub fn new(config: EnvironmentConfig, client: Arc<dyn DataStore>) -> Self {
        let class = EnvironmentClass::from_name(&config.name);
        Self {
            name: config.name,
            class,
            url: config.url,
            is_protected: class.is_protected(),
            config_file: config.config_file,
            credentials: config.credentials,
            client,
        }
    }
}

/// Loads environments from a configuration directory.
///
/// # Example
/// ```rust,no_run
/// use envclone_core::environment::EnvironmentLoader;
///
/// # async fn example() -> envclone_core::Result<()> {
/// let loader = EnvironmentLoader::new(".");
/// let test = loader.load_environment("test").await?;
/// assert!(!test.is_protected);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct EnvironmentLoader {
    config_dir: PathBuf,
    connector: Arc<dyn Connector>,
    probe_table: String,
}

impl std::fmt::Debug for EnvironmentLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvironmentLoader")
            .field("config_dir", &self.config_dir)
            .field("probe_table", &self.probe_table)
            .finish_non_exhaustive()
    }
}

impl EnvironmentLoader {
    /// Creates a loader reading files from `config_dir` with the default connector.
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            connector: Arc::new(DefaultConnector::default()),
            probe_table: DEFAULT_PROBE_TABLE.to_string(),
        }
    }

    /// Builder method replacing the connector.
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    /// Builder method setting the table used by connectivity probes.
    pub fn with_probe_table(mut self, table: impl Into<String>) -> Self {
        self.probe_table = table.into();
        self
    }

    /// Directory configuration files are read from.
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Table used by connectivity probes.
    pub fn probe_table(&self) -> &str {
        &self.probe_table
    }

    /// Reads the named environment's configuration without connecting.
    ///
    /// # Errors
    /// See [`EnvironmentConfig::load`].
    pub fn load_config(&self, name: &str) -> crate::Result<EnvironmentConfig> {
        EnvironmentConfig::load(&self.config_dir, name)
    }

    /// Loads and connects the named environment.
    ///
    /// # Errors
    /// Returns `EnvironmentNotFound` or `ConfigMissing` for configuration
    /// problems and a configuration error if no client can be created.
    pub async fn load_environment(&self, name: &str) -> crate::Result<Environment> {
        let config = self.load_config(name)?;
        debug!(
            "Loaded {} from {}",
            name,
            config.config_file.display()
        );
        let client = self.connector.connect(&config).await?;
        let environment = Environment::new(config, client);
        info!(
            "✓ Environment {} ({}) at {}",
            environment.name,
            environment.class,
            mask_url(&environment.url)
        );
        Ok(environment)
    }

    /// Issues a bounded read against the probe table.
    ///
    /// # Errors
    /// Returns the store error of the failed probe.
    pub async fn probe(&self, environment: &Environment) -> std::result::Result<(), StoreError> {
        environment
            .client
            .select_sample(&self.probe_table, 1)
            .await
            .map(|_| ())
    }

    /// True when the probe succeeds.
    pub async fn test_connectivity(&self, environment: &Environment) -> bool {
        self.probe(environment).await.is_ok()
    }
}
