//! Catalog and audit store over a PostgREST-style HTTP interface.
//!
//! Strategies are read with
//! `GET {base}/rest/v1/{strategies_table}?service_name=eq.{svc}&is_enabled=eq.true&order=rank.asc`
//! and selection records are written with `POST {base}/rest/v1/{audit_table}`.
//! Both requests carry the API key in the `apikey` header and as a bearer
//! token.

use crate::audit::{AuditError, AuditStore, SelectionRecord};
use crate::catalog::{CatalogError, StrategyCatalog};
use crate::strategy::{Strategy, StrategyRow};
use futures::future::BoxFuture;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use std::time::Duration;

#[cfg(feature = "tracing")]
use tracing::debug;

/// Default table holding strategies.
pub const DEFAULT_STRATEGIES_TABLE: &str = "connection_strategies";
/// Default table receiving selection records.
pub const DEFAULT_AUDIT_TABLE: &str = "connection_selection_log";
/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection settings for [`RestCatalog`] and [`RestAuditStore`].
#[derive(Clone)]
pub struct RestConfig {
    pub base_url: String,
    pub api_key: String,
    pub strategies_table: String,
    pub audit_table: String,
    pub timeout: Duration,
}

impl RestConfig {
    /// Creates settings with the default tables and timeout.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            strategies_table: DEFAULT_STRATEGIES_TABLE.to_string(),
            audit_table: DEFAULT_AUDIT_TABLE.to_string(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Sets the strategies table.
    pub fn strategies_table(mut self, table: impl Into<String>) -> Self {
        self.strategies_table = table.into();
        self
    }

    /// Sets the audit table.
    pub fn audit_table(mut self, table: impl Into<String>) -> Self {
        self.audit_table = table.into();
        self
    }

    /// Sets the per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl std::fmt::Debug for RestConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"****")
            .field("strategies_table", &self.strategies_table)
            .field("audit_table", &self.audit_table)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Clone)]
struct RestClient {
    client: reqwest::Client,
    base_url: String,
    headers: HeaderMap,
}

impl RestClient {
    fn new(config: &RestConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;

        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&config.api_key) {
            headers.insert("apikey", value);
        }
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", config.api_key)) {
            headers.insert(AUTHORIZATION, value);
        }

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            headers,
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }
}

/// Strategy catalog backed by a REST table.
#[derive(Clone)]
pub struct RestCatalog {
    rest: RestClient,
    table: String,
}

impl RestCatalog {
    /// Creates a catalog client. Fails only if the HTTP client cannot be built.
    pub fn new(config: &RestConfig) -> Result<Self, CatalogError> {
        Ok(Self {
            rest: RestClient::new(config).map_err(CatalogError::unavailable)?,
            table: config.strategies_table.clone(),
        })
    }

    async fn fetch_rows(&self, service_name: &str) -> Result<Vec<Strategy>, CatalogError> {
        let response = self
            .rest
            .client
            .get(self.rest.table_url(&self.table))
            .headers(self.rest.headers.clone())
            .query(&[
                ("select", "*".to_string()),
                ("service_name", format!("eq.{}", service_name)),
                ("is_enabled", "eq.true".to_string()),
                ("order", "rank.asc".to_string()),
            ])
            .send()
            .await
            .map_err(CatalogError::unavailable)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::unavailable(format!("HTTP {}: {}", status, body)));
        }

        let rows: Vec<StrategyRow> = response
            .json()
            .await
            .map_err(|e| CatalogError::Decode(e.to_string()))?;

        #[cfg(feature = "tracing")]
        debug!(service = service_name, rows = rows.len(), "fetched strategies from catalog");

        Ok(rows.into_iter().map(Strategy::from).collect())
    }
}

impl StrategyCatalog for RestCatalog {
    fn fetch<'a>(
        &'a self,
        service_name: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Strategy>, CatalogError>> {
        Box::pin(self.fetch_rows(service_name))
    }
}

impl std::fmt::Debug for RestCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestCatalog")
            .field("base_url", &self.rest.base_url)
            .field("table", &self.table)
            .finish()
    }
}

/// Audit store that inserts records into a REST table.
#[derive(Clone)]
pub struct RestAuditStore {
    rest: RestClient,
    table: String,
}

impl RestAuditStore {
    /// Creates an audit store client. Fails only if the HTTP client cannot be
    /// built.
    pub fn new(config: &RestConfig) -> Result<Self, AuditError> {
        Ok(Self {
            rest: RestClient::new(config).map_err(|e| AuditError::Unavailable(Box::new(e)))?,
            table: config.audit_table.clone(),
        })
    }

    async fn insert(&self, record: &SelectionRecord) -> Result<(), AuditError> {
        let response = self
            .rest
            .client
            .post(self.rest.table_url(&self.table))
            .headers(self.rest.headers.clone())
            .header("Prefer", "return=minimal")
            .json(record)
            .send()
            .await
            .map_err(|e| AuditError::Unavailable(Box::new(e)))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(AuditError::Rejected(format!("HTTP {}: {}", status, body)))
        }
    }
}

impl AuditStore for RestAuditStore {
    fn write<'a>(&'a self, record: &'a SelectionRecord) -> BoxFuture<'a, Result<(), AuditError>> {
        Box::pin(self.insert(record))
    }
}

impl std::fmt::Debug for RestAuditStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestAuditStore")
            .field("base_url", &self.rest.base_url)
            .field("table", &self.table)
            .finish()
    }
}
