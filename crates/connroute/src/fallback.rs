//! Embedded fallback strategy lists.
//!
//! The fallback table substitutes for a service's catalog list when the cache
//! comes back empty. It is never merged with catalog results: for a given call
//! the candidates are either the catalog's or the table's.

use crate::{ConnectionType, Strategy};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

/// Static, ranked strategy lists keyed by service name.
#[derive(Debug, Clone, Default)]
pub struct FallbackTable {
    services: HashMap<String, Arc<[Strategy]>>,
}

impl FallbackTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the table shipped with the crate.
    ///
    /// - `database`: `pooled-url` (`DATABASE_POOLER_URL`), then
    ///   `direct-password` (`DATABASE_PASSWORD` with host parts), then
    ///   `service-credential` (`SERVICE_ROLE_KEY`, managed client).
    /// - `llm-provider`: `api-key` (`LLM_API_KEY`, managed client).
    pub fn builtin() -> Self {
        Self::new()
            .with_service(
                "database",
                vec![
                    Strategy::new("database", "pooled-url", 1, ConnectionType::RawProtocolClient)
                        .with_env_var("DATABASE_POOLER_URL")
                        .with_config(json!({ "timeout_ms": 10_000, "ssl": true }))
                        .with_description("Transaction pooler URL read from the environment"),
                    Strategy::new(
                        "database",
                        "direct-password",
                        2,
                        ConnectionType::RawProtocolClient,
                    )
                    .with_env_var("DATABASE_PASSWORD")
                    .with_config(json!({
                        "host_env": "DATABASE_HOST",
                        "port": 5432,
                        "user": "postgres",
                        "database": "postgres",
                        "password_env": "DATABASE_PASSWORD",
                        "timeout_ms": 10_000,
                        "ssl": true,
                    }))
                    .with_description("Direct connection assembled from host parts and password"),
                    Strategy::new(
                        "database",
                        "service-credential",
                        3,
                        ConnectionType::ManagedServiceClient,
                    )
                    .with_env_var("SERVICE_ROLE_KEY")
                    .with_description("Managed client authenticated with the service credential"),
                ],
            )
            .with_service(
                "llm-provider",
                vec![
                    Strategy::new("llm-provider", "api-key", 1, ConnectionType::ManagedServiceClient)
                        .with_env_var("LLM_API_KEY")
                        .with_description("Managed provider client using an API key"),
                ],
            )
    }

    /// Adds or replaces a service's list.
    ///
    /// The list is ordered by ascending rank; equal ranks keep the order given.
    pub fn with_service(mut self, service: impl Into<String>, mut strategies: Vec<Strategy>) -> Self {
        strategies.sort_by_key(|s| s.rank);
        self.services.insert(service.into(), strategies.into());
        self
    }

    /// Returns the list for a service, if the table knows it.
    pub fn get(&self, service: &str) -> Option<Arc<[Strategy]>> {
        self.services.get(service).cloned()
    }

    /// Returns true if the table has a list for the service.
    pub fn contains(&self, service: &str) -> bool {
        self.services.contains_key(service)
    }

    /// Names of services the table covers.
    pub fn services(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }
}
