//! REST client for a PostgREST-compatible table API
//!
//! Issues `GET {base}/rest/v1/{table}?select=a,b&order=a.asc` with the
//! `apikey` and bearer headers a hosted PostgREST deployment expects.

use super::{async_trait, StorageClient};
use crate::error::{ForecastError, Result};
use crate::models::Row;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Undefined column
const PG_UNDEFINED_COLUMN: &str = "42703";
/// Undefined table
const PG_UNDEFINED_TABLE: &str = "42P01";
/// PostgREST schema cache miss for a table
const PGRST_TABLE_NOT_FOUND: &str = "PGRST205";

/// Connection settings for the REST storage endpoint
#[derive(Debug, Clone)]
pub struct RestStorageConfig {
    /// Project base URL, e.g. `https://project.example.co`
    pub base_url: String,
    /// API key sent as `apikey` and as bearer token
    pub api_key: String,
    /// Per-request timeout enforced by the HTTP client
    pub request_timeout: Duration,
}

impl RestStorageConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Error body returned by PostgREST
#[derive(Debug, Deserialize)]
struct PostgrestError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

pub struct RestStorageClient {
    client: Client,
    base_url: Url,
    api_key: String,
}

impl RestStorageClient {
    pub fn new(config: RestStorageConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ForecastError::storage("<client>", format!("failed to create HTTP client: {}", e)))?;

        let mut base_url = Url::parse(&config.base_url).map_err(|e| {
            ForecastError::storage("<client>", format!("invalid base URL '{}': {}", config.base_url, e))
        })?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key,
        })
    }

    fn table_url(&self, table: &str, columns: &[String], order_by: Option<&str>) -> Result<Url> {
        let mut url = self
            .base_url
            .join(&format!("rest/v1/{}", table))
            .map_err(|e| ForecastError::storage(table, format!("invalid table path: {}", e)))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("select", &columns.join(","));
            if let Some(key) = order_by {
                query.append_pair("order", &format!("{}.asc", key));
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl StorageClient for RestStorageClient {
    async fn select(
        &self,
        table: &str,
        columns: &[String],
        order_by: Option<&str>,
    ) -> Result<Vec<Row>> {
        let url = self.table_url(table, columns, order_by)?;
        debug!(table = %table, url = %url, "Selecting rows");

        let response = self
            .client
            .get(url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| ForecastError::storage(table, format!("failed to send request: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(table, status, &body));
        }

        response
            .json::<Vec<Row>>()
            .await
            .map_err(|e| ForecastError::storage(table, format!("failed to parse response: {}", e)))
    }
}

/// Map an error response onto the engine's taxonomy
fn classify_failure(table: &str, status: StatusCode, body: &str) -> ForecastError {
    let parsed: Option<PostgrestError> = serde_json::from_str(body).ok();
    let code = parsed.as_ref().and_then(|e| e.code.as_deref());
    let message = parsed
        .as_ref()
        .and_then(|e| e.message.clone())
        .unwrap_or_else(|| body.to_string());

    match code {
        Some(PG_UNDEFINED_COLUMN) => ForecastError::schema_mismatch(table, message),
        Some(PG_UNDEFINED_TABLE) | Some(PGRST_TABLE_NOT_FOUND) => {
            ForecastError::data_unavailable(table, message)
        }
        _ if status == StatusCode::NOT_FOUND => ForecastError::data_unavailable(table, message),
        _ => ForecastError::storage(table, format!("API error ({}): {}", status, message)),
    }
}
