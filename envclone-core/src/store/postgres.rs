//! Direct PostgreSQL backend over a sqlx pool.
//!
//! Rows travel as JSON in both directions so the dynamic column set never
//! has to be mapped to Rust types: reads use `row_to_json`, inserts use
//! `jsonb_populate_recordset` over the union of the supplied columns.
//!
//! # Security Features
//! - Table and column names are validated before being quoted into SQL
//! - All values are bound as parameters
//! - The privileged key is used as the password when the URL has none
//! - Connection strings are redacted in every error message

use super::{DataStore, StoreKind, StoreResult, union_columns};
use crate::config::{ConnectionSettings, EnvironmentConfig};
use crate::error::{EnvCloneError, StoreError, StoreOperation, redact_database_url};
use crate::models::Record;
use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use std::sync::OnceLock;
use tracing::debug;

const IDENTIFIER_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*$";

/// SQL datastore client.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

fn identifier_regex() -> Option<&'static regex::Regex> {
    static IDENTIFIER: OnceLock<Option<regex::Regex>> = OnceLock::new();
    IDENTIFIER
        .get_or_init(|| regex::Regex::new(IDENTIFIER_PATTERN).ok())
        .as_ref()
}

/// Quotes a table or column name after checking it is a plain identifier.
fn quote_ident(name: &str, table: &str, operation: StoreOperation) -> StoreResult<String> {
    if identifier_regex().is_some_and(|re| re.is_match(name)) {
        Ok(format!("\"{}\"", name))
    } else {
        Err(StoreError::new(
            table,
            operation,
            format!("Invalid identifier '{}'", name),
        ))
    }
}

fn sql_error(table: &str, operation: StoreOperation, error: &sqlx::Error) -> StoreError {
    match error {
        sqlx::Error::Database(db) => {
            let store_error = StoreError::new(table, operation, db.message());
            match db.code() {
                Some(code) => store_error.with_code(code.into_owned()),
                None => store_error,
            }
        }
        other => StoreError::new(table, operation, other.to_string()),
    }
}

impl PostgresStore {
    /// Creates a lazily connecting pool for the environment.
    ///
    /// # Errors
    /// Returns a configuration error if the connection URL cannot be parsed.
    pub fn new(config: &EnvironmentConfig, settings: &ConnectionSettings) -> crate::Result<Self> {
        let has_password = url::Url::parse(&config.url)
            .map(|url| url.password().is_some())
            .unwrap_or(false);

        let mut options: PgConnectOptions = config.url.parse().map_err(|e| {
            EnvCloneError::configuration(format!(
                "Invalid PostgreSQL connection string {}: {}",
                redact_database_url(&config.url),
                e
            ))
        })?;
        if !has_password {
            options = options.password(config.credentials.service_key());
        }
        options = options.application_name(&format!("envclone-{}", env!("CARGO_PKG_VERSION")));

        let statement_timeout_secs = settings.request_timeout.as_secs().max(1);
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.connect_timeout)
            .test_before_acquire(true)
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    use sqlx::Executor;
                    conn.execute(
                        format!("SET statement_timeout = '{}s'", statement_timeout_secs).as_str(),
                    )
                    .await?;
                    conn.execute("SET timezone = 'UTC'").await?;
                    Ok(())
                })
            })
            .connect_lazy_with(options);

        debug!(
            "Created PostgreSQL pool for {}",
            redact_database_url(&config.url)
        );
        Ok(Self { pool })
    }

    /// Wraps an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn query_rows(&self, table: &str, sql: &str, limit: Option<i64>) -> StoreResult<Vec<Record>> {
        let mut query = sqlx::query_scalar::<sqlx::Postgres, serde_json::Value>(sql);
        if let Some(limit) = limit {
            query = query.bind(limit);
        }
        let values = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| sql_error(table, StoreOperation::Select, &e))?;

        Ok(values
            .into_iter()
            .filter_map(|value| match value {
                serde_json::Value::Object(row) => Some(row),
                _ => None,
            })
            .collect())
    }
}

#[async_trait]
impl DataStore for PostgresStore {
    async fn select_all(&self, table: &str, order_by: &str) -> StoreResult<Vec<Record>> {
        let name = quote_ident(table, table, StoreOperation::Select)?;
        let column = quote_ident(order_by, table, StoreOperation::Select)?;
        let sql = format!("SELECT row_to_json(t.*) FROM {} t ORDER BY t.{} ASC", name, column);
        self.query_rows(table, &sql, None).await
    }

    async fn select_sample(&self, table: &str, limit: usize) -> StoreResult<Vec<Record>> {
        let name = quote_ident(table, table, StoreOperation::Select)?;
        let sql = format!("SELECT row_to_json(t.*) FROM {} t LIMIT $1", name);
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.query_rows(table, &sql, Some(limit)).await
    }

    async fn count(&self, table: &str) -> StoreResult<u64> {
        let name = quote_ident(table, table, StoreOperation::Count)?;
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", name))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| sql_error(table, StoreOperation::Count, &e))?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn insert(&self, table: &str, rows: &[Record]) -> StoreResult<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let name = quote_ident(table, table, StoreOperation::Insert)?;
        let columns = union_columns(rows)
            .iter()
            .map(|column| quote_ident(column, table, StoreOperation::Insert))
            .collect::<StoreResult<Vec<_>>>()?
            .join(", ");
        let sql = format!(
            "INSERT INTO {name} ({columns}) SELECT {columns} FROM jsonb_populate_recordset(NULL::{name}, $1)"
        );

        let payload = serde_json::Value::Array(
            rows.iter().cloned().map(serde_json::Value::Object).collect(),
        );
        sqlx::query(&sql)
            .bind(payload)
            .execute(&self.pool)
            .await
            .map_err(|e| sql_error(table, StoreOperation::Insert, &e))?;
        Ok(())
    }

    async fn delete_all(&self, table: &str, column: &str, sentinel: &str) -> StoreResult<()> {
        let name = quote_ident(table, table, StoreOperation::Delete)?;
        let column = quote_ident(column, table, StoreOperation::Delete)?;
        let sql = format!("DELETE FROM {} WHERE {}::text <> $1", name, column);
        let result = sqlx::query(&sql)
            .bind(sentinel)
            .execute(&self.pool)
            .await
            .map_err(|e| sql_error(table, StoreOperation::Delete, &e))?;
        debug!("Deleted {} rows from {}", result.rows_affected(), table);
        Ok(())
    }

    fn kind(&self) -> StoreKind {
        StoreKind::Postgres
    }
}
