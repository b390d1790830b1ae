use crate::audit::AuditStore;
use crate::availability::{Environment, ProcessEnv};
use crate::cache::DEFAULT_TTL;
use crate::events::ResolverEvent;
use crate::fallback::FallbackTable;
use crate::materialize::{ManagedClientFactory, RawConnector};
use crate::Strategy;
use connroute_core::{EventListener, EventListeners, FnListener};
use std::sync::Arc;
use std::time::Duration;

/// Configuration for a [`Resolver`](crate::Resolver).
pub struct ResolverConfig {
    pub(crate) name: String,
    pub(crate) cache_ttl: Duration,
    pub(crate) fallback: FallbackTable,
    pub(crate) audit_store: Option<Arc<dyn AuditStore>>,
    pub(crate) environment: Arc<dyn Environment>,
    pub(crate) raw_connector: Option<Arc<dyn RawConnector>>,
    pub(crate) managed_factory: Option<Arc<dyn ManagedClientFactory>>,
    pub(crate) event_listeners: EventListeners<ResolverEvent>,
}

impl ResolverConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> ResolverConfigBuilder {
        ResolverConfigBuilder::new()
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfigBuilder::new().build()
    }
}

impl std::fmt::Debug for ResolverConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverConfig")
            .field("name", &self.name)
            .field("cache_ttl", &self.cache_ttl)
            .field("fallback_services", &self.fallback.services().count())
            .field("audit", &self.audit_store.is_some())
            .field("raw_connector", &self.raw_connector.is_some())
            .field("managed_factory", &self.managed_factory.is_some())
            .field("event_listeners", &self.event_listeners)
            .finish()
    }
}

/// Builder for [`ResolverConfig`].
pub struct ResolverConfigBuilder {
    name: String,
    cache_ttl: Duration,
    fallback: FallbackTable,
    audit_store: Option<Arc<dyn AuditStore>>,
    environment: Arc<dyn Environment>,
    raw_connector: Option<Arc<dyn RawConnector>>,
    managed_factory: Option<Arc<dyn ManagedClientFactory>>,
    event_listeners: EventListeners<ResolverEvent>,
}

impl ResolverConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            name: String::from("<unnamed>"),
            cache_ttl: DEFAULT_TTL,
            fallback: FallbackTable::builtin(),
            audit_store: None,
            environment: Arc::new(ProcessEnv),
            raw_connector: None,
            managed_factory: None,
            event_listeners: EventListeners::new(),
        }
    }

    /// Give this resolver a human-readable name for observability.
    ///
    /// Default: `<unnamed>`
    pub fn name<N: Into<String>>(mut self, n: N) -> Self {
        self.name = n.into();
        self
    }

    /// Sets how long a fetched strategy list is served without asking the
    /// catalog again.
    ///
    /// Default: 5 minutes
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Replaces the fallback table used when the catalog yields nothing.
    ///
    /// Default: [`FallbackTable::builtin`]
    pub fn fallback(mut self, table: FallbackTable) -> Self {
        self.fallback = table;
        self
    }

    /// Sets where selection records are written.
    ///
    /// Default: none (records are dropped)
    pub fn audit_store<A>(mut self, store: A) -> Self
    where
        A: AuditStore + 'static,
    {
        self.audit_store = Some(Arc::new(store));
        self
    }

    /// Sets the environment availability checks and descriptors read from.
    ///
    /// Default: the process environment
    pub fn environment<E>(mut self, env: E) -> Self
    where
        E: Environment + 'static,
    {
        self.environment = Arc::new(env);
        self
    }

    /// Sets the connector for `raw-protocol-client` strategies.
    pub fn raw_connector<C>(mut self, connector: C) -> Self
    where
        C: RawConnector + 'static,
    {
        self.raw_connector = Some(Arc::new(connector));
        self
    }

    /// Sets the factory for `managed-service-client` strategies.
    pub fn managed_factory<F>(mut self, factory: F) -> Self
    where
        F: ManagedClientFactory + 'static,
    {
        self.managed_factory = Some(Arc::new(factory));
        self
    }

    /// Registers a listener for every resolver event.
    pub fn on_event<L>(mut self, listener: L) -> Self
    where
        L: EventListener<ResolverEvent> + 'static,
    {
        self.event_listeners.add(listener);
        self
    }

    /// Registers a callback when a strategy is selected.
    ///
    /// Called with the service name, the selected method, and its rank.
    pub fn on_selected<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &str, u32) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &ResolverEvent| {
                if let ResolverEvent::Selected {
                    service,
                    method,
                    rank,
                    ..
                } = event
                {
                    f(service, method, *rank);
                }
            }));
        self
    }

    /// Registers a callback when the fallback table stands in for the
    /// catalog.
    pub fn on_fallback<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &ResolverEvent| {
                if let ResolverEvent::FallbackUsed { service, .. } = event {
                    f(service);
                }
            }));
        self
    }

    /// Registers a callback when a stale cache entry is served because the
    /// catalog failed.
    ///
    /// Called with the service name and the catalog error.
    pub fn on_stale<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &ResolverEvent| {
                if let ResolverEvent::StaleServed { service, error, .. } = event {
                    f(service, error);
                }
            }));
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> ResolverConfig {
        ResolverConfig {
            name: self.name,
            cache_ttl: self.cache_ttl,
            fallback: self.fallback,
            audit_store: self.audit_store,
            environment: self.environment,
            raw_connector: self.raw_connector,
            managed_factory: self.managed_factory,
            event_listeners: self.event_listeners,
        }
    }
}

impl Default for ResolverConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-call options for [`Resolver::resolve`](crate::Resolver::resolve) and
/// [`Resolver::connect`](crate::Resolver::connect).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Suppresses the audit record for this call.
    pub skip_log: bool,
    /// Identifies the caller in the audit record.
    pub caller: Option<String>,
}

impl ResolveOptions {
    /// Default options: audited, anonymous.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the caller recorded in the audit trail.
    pub fn with_caller(mut self, caller: impl Into<String>) -> Self {
        self.caller = Some(caller.into());
        self
    }

    /// Suppresses the audit record.
    pub fn skip_log(mut self) -> Self {
        self.skip_log = true;
        self
    }
}

/// A candidate as reported by
/// [`Resolver::list_candidates`](crate::Resolver::list_candidates).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CandidateInfo {
    pub method_name: String,
    pub rank: u32,
    pub connection_type: String,
    /// Whether the strategy could be selected right now.
    pub available: bool,
    pub env_var_required: Option<String>,
    pub description: Option<String>,
}

impl CandidateInfo {
    pub(crate) fn new(strategy: &Strategy, available: bool) -> Self {
        Self {
            method_name: strategy.method_name.clone(),
            rank: strategy.rank,
            connection_type: strategy.connection_type.to_string(),
            available,
            env_var_required: strategy.env_var_required.clone(),
            description: strategy.description.clone(),
        }
    }
}
