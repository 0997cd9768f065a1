//! Datastore clients.
//!
//! Every component talks to an environment's datastore through the
//! [`DataStore`] trait: read a whole table, read a bounded sample, count,
//! insert rows, and the delete-everything idiom. There are no transactions
//! and no multi-table calls.
//!
//! # Backends
//! - `rest`: PostgREST-style HTTP API (`http://`, `https://`)
//! - `postgres`: direct SQL over a sqlx pool (`postgres://`, `postgresql://`)
//! - `memory`: in-process tables with configurable constraints, used by tests

use crate::config::{ConnectionSettings, EnvironmentConfig};
use crate::error::{EnvCloneError, StoreError};
use crate::models::Record;
use async_trait::async_trait;
use std::sync::Arc;

mod memory;
#[cfg(feature = "postgresql")]
mod postgres;
#[cfg(feature = "rest")]
mod rest;

pub use memory::{MemoryStore, StoreCall, TableRules};
#[cfg(feature = "postgresql")]
pub use postgres::PostgresStore;
#[cfg(feature = "rest")]
pub use rest::RestStore;

/// Result of a single datastore call.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Backend family behind a [`DataStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Rest,
    Postgres,
    Memory,
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rest => write!(f, "rest"),
            Self::Postgres => write!(f, "postgres"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

/// Row-oriented client for one environment's datastore.
///
/// # Object Safety
/// This trait is object-safe; environments hold it as `Arc<dyn DataStore>`.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Reads every row of a table, ascending by `order_by` so paged reads
    /// see a stable row order.
    async fn select_all(&self, table: &str, order_by: &str) -> StoreResult<Vec<Record>>;

    /// Reads at most `limit` rows of a table.
    async fn select_sample(&self, table: &str, limit: usize) -> StoreResult<Vec<Record>>;

    /// Counts the rows of a table exactly.
    async fn count(&self, table: &str) -> StoreResult<u64>;

    /// Inserts rows in a single call. Either every row is stored or none is.
    async fn insert(&self, table: &str, rows: &[Record]) -> StoreResult<()>;

    /// Deletes every row whose `column` differs from `sentinel`.
    async fn delete_all(&self, table: &str, column: &str, sentinel: &str) -> StoreResult<()>;

    /// Backend family.
    fn kind(&self) -> StoreKind;
}

/// Turns an environment configuration into a connected store.
///
/// The loader goes through this seam so alternate backends can be
/// supplied without touching configuration files.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Creates a store for `config`.
    async fn connect(&self, config: &EnvironmentConfig) -> crate::Result<Arc<dyn DataStore>>;
}

/// Connector selecting the backend from the URL scheme.
#[derive(Debug, Clone, Default)]
pub struct DefaultConnector {
    settings: ConnectionSettings,
}

impl DefaultConnector {
    /// Creates a connector applying `settings` to every store.
    pub fn new(settings: ConnectionSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Connector for DefaultConnector {
    async fn connect(&self, config: &EnvironmentConfig) -> crate::Result<Arc<dyn DataStore>> {
        create_store(config, &self.settings).await
    }
}

/// Creates a datastore client for an environment.
///
/// # Errors
/// Returns a configuration error if the URL scheme is not supported or the
/// backend for it was not compiled in.
///
/// # Example
/// ```rust,no_run
/// use envclone_core::config::{ConnectionSettings, EnvironmentConfig};
/// use envclone_core::store::create_store;
/// use std::path::Path;
///
/// # async fn example() -> envclone_core::Result<()> {
/// let config = EnvironmentConfig::load(Path::new("."), "test")?;
/// let store = create_store(&config, &ConnectionSettings::default()).await?;
/// println!("{} rows", store.count("lofts").await?);
/// # Ok(())
/// # }
/// ```
pub async fn create_store(
    config: &EnvironmentConfig,
    settings: &ConnectionSettings,
) -> crate::Result<Arc<dyn DataStore>> {
    settings.validate()?;

    match detect_store_kind(&config.url)? {
        #[cfg(feature = "rest")]
        StoreKind::Rest => Ok(Arc::new(RestStore::new(config, settings)?)),
        #[cfg(not(feature = "rest"))]
        StoreKind::Rest => Err(EnvCloneError::configuration(
            "REST backend not compiled in. Use --features rest",
        )),
        #[cfg(feature = "postgresql")]
        StoreKind::Postgres => Ok(Arc::new(PostgresStore::new(config, settings)?)),
        #[cfg(not(feature = "postgresql"))]
        StoreKind::Postgres => Err(EnvCloneError::configuration(
            "PostgreSQL backend not compiled in. Use --features postgresql",
        )),
        StoreKind::Memory => Err(EnvCloneError::configuration(
            "Memory stores cannot be created from a URL",
        )),
    }
}

/// Detects the backend from the URL scheme.
///
/// # Errors
/// Returns a configuration error for unparseable URLs or unknown schemes.
pub fn detect_store_kind(url: &str) -> crate::Result<StoreKind> {
    let parsed = url::Url::parse(url).map_err(|e| {
        EnvCloneError::configuration(format!(
            "Invalid datastore URL {}: {}",
            crate::error::mask_url(url),
            e
        ))
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(StoreKind::Rest),
        "postgres" | "postgresql" => Ok(StoreKind::Postgres),
        other => Err(EnvCloneError::configuration(format!(
            "Unsupported datastore URL scheme '{}'",
            other
        ))),
    }
}

/// Union of the column names of `rows`, in first-seen order.
pub(crate) fn union_columns(rows: &[Record]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !columns.iter().any(|c| c == key) {
                columns.push(key.clone());
            }
        }
    }
    columns
}
