//! Strategy catalog client interface.

use crate::Strategy;
use connroute_core::BoxError;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Errors returned by a strategy catalog.
///
/// The cache recovers from every variant locally; none of them reach callers
/// of the resolver.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// The catalog could not be reached or refused the query.
    #[error("strategy catalog unavailable: {0}")]
    Unavailable(#[source] BoxError),
    /// The catalog answered with something that is not a strategy list.
    #[error("malformed catalog response: {0}")]
    Decode(String),
}

impl CatalogError {
    /// Wraps a transport-level failure.
    pub fn unavailable(error: impl Into<BoxError>) -> Self {
        Self::Unavailable(error.into())
    }
}

/// Read-only access to the authoritative, ranked strategy list.
///
/// Implementations return only enabled strategies, ordered by ascending rank.
/// An empty list is a valid answer ("nothing configured") and must be
/// reported as `Ok`, not as an error.
pub trait StrategyCatalog: Send + Sync {
    /// Fetches the strategies configured for a service.
    fn fetch<'a>(
        &'a self,
        service_name: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Strategy>, CatalogError>>;
}

impl<C: StrategyCatalog + ?Sized> StrategyCatalog for Arc<C> {
    fn fetch<'a>(
        &'a self,
        service_name: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Strategy>, CatalogError>> {
        (**self).fetch(service_name)
    }
}

/// A catalog held in memory.
///
/// Useful for embedding a fixed configuration and for tests. Lists are kept
/// sorted by ascending rank, equal ranks in insertion order.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    services: RwLock<HashMap<String, Vec<Strategy>>>,
}

impl InMemoryCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a service's list, builder style.
    pub fn with_service(self, service: impl Into<String>, strategies: Vec<Strategy>) -> Self {
        self.set_service(service, strategies);
        self
    }

    /// Replaces a service's list.
    pub fn set_service(&self, service: impl Into<String>, mut strategies: Vec<Strategy>) {
        strategies.sort_by_key(|s| s.rank);
        self.services
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(service.into(), strategies);
    }

    /// Removes a service's list.
    pub fn remove_service(&self, service: &str) {
        self.services
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(service);
    }
}

impl StrategyCatalog for InMemoryCatalog {
    fn fetch<'a>(
        &'a self,
        service_name: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Strategy>, CatalogError>> {
        let strategies = self
            .services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(service_name)
            .cloned()
            .unwrap_or_default();
        Box::pin(async move { Ok(strategies) })
    }
}
