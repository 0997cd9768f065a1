//! PostgREST-style HTTP backend.
//!
//! Tables are served under `<base>/rest/v1/<table>`. Every request carries
//! the privileged key both as `apikey` and as a bearer token.

use super::{DataStore, StoreKind, StoreResult, union_columns};
use crate::config::{ConnectionSettings, EnvironmentConfig};
use crate::error::{EnvCloneError, StoreError, StoreOperation};
use crate::models::Record;
use crate::security::ServiceCredentials;
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, header};
use serde::Deserialize;
use tracing::{debug, trace};

/// Error body returned by PostgREST.
#[derive(Debug, Default, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

/// HTTP datastore client.
pub struct RestStore {
    client: reqwest::Client,
    endpoint: String,
    credentials: ServiceCredentials,
    page_size: usize,
}

impl std::fmt::Debug for RestStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestStore")
            .field("endpoint", &crate::error::mask_url(&self.endpoint))
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

impl RestStore {
    /// Creates a client for the environment's base URL.
    ///
    /// # Errors
    /// Returns a configuration error if the HTTP client cannot be built.
    pub fn new(config: &EnvironmentConfig, settings: &ConnectionSettings) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| {
                EnvCloneError::configuration(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            endpoint: format!("{}/rest/v1", config.url.trim_end_matches('/')),
            credentials: config.credentials.clone(),
            page_size: settings.page_size,
        })
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        let key = self.credentials.service_key();
        self.client
            .request(method, format!("{}/{}", self.endpoint, table))
            .header("apikey", key)
            .bearer_auth(key)
    }

    async fn send(
        &self,
        table: &str,
        operation: StoreOperation,
        request: RequestBuilder,
    ) -> StoreResult<Response> {
        let response = request.send().await.map_err(|e| {
            StoreError::new(table, operation, e.without_url().to_string())
        })?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let api_error: ApiError = serde_json::from_str(&body).unwrap_or_default();
        let message = api_error
            .message
            .or(api_error.details)
            .unwrap_or_else(|| format!("HTTP {}", status));

        let error = StoreError::new(table, operation, message);
        Err(match api_error.code {
            Some(code) => error.with_code(code),
            None => error.with_code(status.as_str()),
        })
    }

    async fn read_rows(&self, table: &str, response: Response) -> StoreResult<Vec<Record>> {
        response.json::<Vec<Record>>().await.map_err(|e| {
            StoreError::new(
                table,
                StoreOperation::Select,
                format!("Invalid row payload: {}", e.without_url()),
            )
        })
    }
}

/// Extracts the total from a `Content-Range` header (`0-9/42`, `*/0`).
fn parse_content_range(value: &str) -> Option<u64> {
    value.rsplit('/').next()?.trim().parse().ok()
}

#[async_trait]
impl DataStore for RestStore {
    async fn select_all(&self, table: &str, order_by: &str) -> StoreResult<Vec<Record>> {
        let mut rows = Vec::new();
        let mut offset = 0usize;
        let order = format!("{}.asc", order_by);

        loop {
            let request = self.request(Method::GET, table).query(&[
                ("select", "*".to_string()),
                ("order", order.clone()),
                ("offset", offset.to_string()),
                ("limit", self.page_size.to_string()),
            ]);
            let response = self.send(table, StoreOperation::Select, request).await?;
            let page = self.read_rows(table, response).await?;
            let fetched = page.len();
            trace!("Fetched {} rows from {} at offset {}", fetched, table, offset);
            rows.extend(page);

            if fetched < self.page_size {
                break;
            }
            offset = offset.saturating_add(fetched);
        }

        debug!("Read {} rows from {}", rows.len(), table);
        Ok(rows)
    }

    async fn select_sample(&self, table: &str, limit: usize) -> StoreResult<Vec<Record>> {
        let request = self
            .request(Method::GET, table)
            .query(&[("select", "*".to_string()), ("limit", limit.to_string())]);
        let response = self.send(table, StoreOperation::Select, request).await?;
        self.read_rows(table, response).await
    }

    async fn count(&self, table: &str) -> StoreResult<u64> {
        let request = self
            .request(Method::HEAD, table)
            .query(&[("select", "*")])
            .header("Prefer", "count=exact");
        let response = self.send(table, StoreOperation::Count, request).await?;

        response
            .headers()
            .get(header::CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_content_range)
            .ok_or_else(|| {
                StoreError::new(table, StoreOperation::Count, "Missing exact count in response")
            })
    }

    async fn insert(&self, table: &str, rows: &[Record]) -> StoreResult<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let columns = union_columns(rows).join(",");
        let request = self
            .request(Method::POST, table)
            .query(&[("columns", columns)])
            .header("Prefer", "return=minimal")
            .json(rows);
        self.send(table, StoreOperation::Insert, request).await?;
        Ok(())
    }

    async fn delete_all(&self, table: &str, column: &str, sentinel: &str) -> StoreResult<()> {
        let request = self
            .request(Method::DELETE, table)
            .query(&[(column, format!("neq.{}", sentinel))]);
        self.send(table, StoreOperation::Delete, request).await?;
        Ok(())
    }

    fn kind(&self) -> StoreKind {
        StoreKind::Rest
    }
}
