//! The resolver facade.

use crate::audit::{AuditLogger, SelectionRecord};
use crate::availability::{self, Environment};
use crate::cache::{CacheSource, CacheStatus, StrategyCache};
use crate::catalog::StrategyCatalog;
use crate::config::{CandidateInfo, ResolveOptions, ResolverConfig};
use crate::error::ConnectError;
use crate::events::ResolverEvent;
use crate::fallback::FallbackTable;
use crate::materialize::{ConnectionHandle, Materializer};
use crate::selector::{self, Selection};
use crate::Strategy;
use connroute_core::EventListeners;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

#[cfg(feature = "metrics")]
use metrics::{counter, describe_counter};
#[cfg(feature = "metrics")]
use std::sync::Once;

#[cfg(feature = "tracing")]
use tracing::{debug, info, warn};

#[cfg(feature = "metrics")]
static METRICS_INIT: Once = Once::new();

/// Resolves service names to ranked connection strategies and connected
/// clients.
///
/// A resolver owns its cache; two resolvers never share cached lists.
/// Cloning is cheap and clones share everything.
#[derive(Clone)]
pub struct Resolver {
    inner: Arc<Inner>,
}

struct Inner {
    name: String,
    cache: StrategyCache,
    fallback: FallbackTable,
    env: Arc<dyn Environment>,
    audit: AuditLogger,
    materializer: Materializer,
    listeners: EventListeners<ResolverEvent>,
}

impl Resolver {
    /// Creates a resolver over the given catalog.
    pub fn new<C>(catalog: C, config: ResolverConfig) -> Self
    where
        C: StrategyCatalog + 'static,
    {
        #[cfg(feature = "metrics")]
        {
            METRICS_INIT.call_once(|| {
                describe_counter!(
                    "connroute_cache_requests_total",
                    "Strategy cache reads by outcome (hit, refresh, stale, empty)"
                );
                describe_counter!(
                    "connroute_selections_total",
                    "Selections by outcome (selected, none)"
                );
                describe_counter!(
                    "connroute_audit_writes_total",
                    "Selection record writes by outcome (ok, dropped)"
                );
            });
        }

        let ResolverConfig {
            name,
            cache_ttl,
            fallback,
            audit_store,
            environment,
            raw_connector,
            managed_factory,
            event_listeners,
        } = config;

        let audit = match audit_store {
            Some(store) => AuditLogger::new(store),
            None => AuditLogger::disabled(),
        }
        .with_events(&name, event_listeners.clone());

        let mut materializer = Materializer::new(Arc::clone(&environment));
        if let Some(connector) = raw_connector {
            materializer = materializer.with_raw_connector(connector);
        }
        if let Some(factory) = managed_factory {
            materializer = materializer.with_managed_factory(factory);
        }

        Self {
            inner: Arc::new(Inner {
                name,
                cache: StrategyCache::new(Arc::new(catalog), cache_ttl),
                fallback,
                env: environment,
                audit,
                materializer,
                listeners: event_listeners,
            }),
        }
    }

    /// Returns the resolver's name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Selects the best available strategy for a service.
    ///
    /// Returns `None` when no candidate is available. Catalog problems never
    /// surface here; they degrade to stale data, the fallback table, or an
    /// empty list.
    pub async fn resolve(&self, service_name: &str, options: ResolveOptions) -> Option<Strategy> {
        self.select(service_name, options).await.selected
    }

    /// Selects a strategy and reports every candidate passed over on the way.
    ///
    /// Unless `options.skip_log` is set, a [`SelectionRecord`] is dispatched
    /// to the audit store before this returns; the write itself is not
    /// awaited.
    pub async fn select(&self, service_name: &str, options: ResolveOptions) -> Selection {
        let started = Instant::now();
        let candidates = self.candidates(service_name).await;
        let selection = selector::select(&candidates, self.inner.env.as_ref());
        let elapsed = started.elapsed();

        match &selection.selected {
            Some(strategy) => {
                #[cfg(feature = "tracing")]
                debug!(
                    resolver = %self.inner.name,
                    service = service_name,
                    method = %strategy.method_name,
                    rank = strategy.rank,
                    skipped = selection.skipped.len(),
                    "connection strategy selected"
                );

                #[cfg(feature = "metrics")]
                counter!(
                    "connroute_selections_total",
                    "resolver" => self.inner.name.clone(),
                    "service" => service_name.to_string(),
                    "result" => "selected"
                )
                .increment(1);

                self.emit(ResolverEvent::Selected {
                    resolver_name: self.inner.name.clone(),
                    timestamp: Instant::now(),
                    service: service_name.to_string(),
                    method: strategy.method_name.clone(),
                    rank: strategy.rank,
                    skipped: selection.skipped.len(),
                });
            }
            None => {
                #[cfg(feature = "tracing")]
                warn!(
                    resolver = %self.inner.name,
                    service = service_name,
                    candidates = candidates.len(),
                    missing = ?selection.missing_env_vars(),
                    "no connection strategy available"
                );

                #[cfg(feature = "metrics")]
                counter!(
                    "connroute_selections_total",
                    "resolver" => self.inner.name.clone(),
                    "service" => service_name.to_string(),
                    "result" => "none"
                )
                .increment(1);

                self.emit(ResolverEvent::NoStrategyAvailable {
                    resolver_name: self.inner.name.clone(),
                    timestamp: Instant::now(),
                    service: service_name.to_string(),
                    candidates: candidates.len(),
                });
            }
        }

        if !options.skip_log {
            self.inner.audit.record(SelectionRecord::from_selection(
                service_name,
                &selection,
                elapsed,
                options.caller,
            ));
        }

        selection
    }

    /// Selects a strategy and opens a connection with it.
    ///
    /// Fails with [`ConnectError::NoStrategyAvailable`] when selection comes
    /// back empty. Errors from the client library are returned as
    /// [`ConnectError::Connection`] without modification. No other strategy
    /// is tried if the selected one fails to connect.
    pub async fn connect(
        &self,
        service_name: &str,
        options: ResolveOptions,
    ) -> Result<ConnectionHandle, ConnectError> {
        let selection = self.select(service_name, options).await;

        let Some(strategy) = selection.selected.as_ref() else {
            return Err(ConnectError::NoStrategyAvailable {
                service: service_name.to_string(),
                missing_env_vars: selection.missing_env_vars(),
            });
        };

        self.inner.materializer.materialize(strategy).await
    }

    /// Lists the candidates for a service with their current availability.
    ///
    /// Goes through the same cache and fallback path as [`resolve`](Self::resolve)
    /// but never writes an audit record.
    pub async fn list_candidates(&self, service_name: &str) -> Vec<CandidateInfo> {
        let env = self.inner.env.as_ref();
        self.candidates(service_name)
            .await
            .iter()
            .map(|strategy| CandidateInfo::new(strategy, availability::is_available(strategy, env)))
            .collect()
    }

    /// Drops every cached strategy list.
    pub fn invalidate_cache(&self) {
        #[cfg(feature = "tracing")]
        debug!(resolver = %self.inner.name, "strategy cache invalidated");

        self.inner.cache.clear();
    }

    /// Returns per-service cache entry age and staleness.
    pub fn cache_status(&self) -> HashMap<String, CacheStatus> {
        self.inner.cache.status()
    }

    /// Returns the candidate list for a service: the cached catalog list, or
    /// the fallback table's list when that is empty.
    async fn candidates(&self, service_name: &str) -> Arc<[Strategy]> {
        let read = self.inner.cache.get(service_name).await;
        let name = self.inner.name.clone();
        let service = service_name.to_string();
        let timestamp = Instant::now();

        #[cfg(feature = "metrics")]
        let result = match &read.source {
            CacheSource::Fresh => "hit",
            CacheSource::Refreshed => "refresh",
            CacheSource::Stale { .. } => "stale",
            CacheSource::Unavailable { .. } => "empty",
        };
        #[cfg(feature = "metrics")]
        counter!("connroute_cache_requests_total", "resolver" => name.clone(), "result" => result)
            .increment(1);

        let event = match read.source {
            CacheSource::Fresh => ResolverEvent::CacheHit {
                resolver_name: name.clone(),
                timestamp,
                service: service.clone(),
            },
            CacheSource::Refreshed => ResolverEvent::CacheRefreshed {
                resolver_name: name.clone(),
                timestamp,
                service: service.clone(),
                count: read.strategies.len(),
            },
            CacheSource::Stale { error } => ResolverEvent::StaleServed {
                resolver_name: name.clone(),
                timestamp,
                service: service.clone(),
                error,
            },
            CacheSource::Unavailable { error } => ResolverEvent::CatalogUnavailable {
                resolver_name: name.clone(),
                timestamp,
                service: service.clone(),
                error,
            },
        };
        self.emit(event);

        if !read.strategies.is_empty() {
            return read.strategies;
        }

        match self.inner.fallback.get(service_name) {
            Some(strategies) => {
                #[cfg(feature = "tracing")]
                info!(
                    resolver = %name,
                    service = service_name,
                    count = strategies.len(),
                    "catalog returned no strategies, using fallback table"
                );

                self.emit(ResolverEvent::FallbackUsed {
                    resolver_name: name,
                    timestamp,
                    service,
                    count: strategies.len(),
                });
                strategies
            }
            None => read.strategies,
        }
    }

    fn emit(&self, event: ResolverEvent) {
        if !self.inner.listeners.is_empty() {
            self.inner.listeners.emit(&event);
        }
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("name", &self.inner.name)
            .field("cache", &self.inner.cache)
            .field("audit", &self.inner.audit)
            .field("materializer", &self.inner.materializer)
            .finish()
    }
}
