//! Events emitted by the resolver.

use connroute_core::RouterEvent;
use std::time::Instant;

/// Events emitted while resolving connections.
#[derive(Debug, Clone)]
pub enum ResolverEvent {
    /// A fresh cache entry was served.
    CacheHit {
        resolver_name: String,
        timestamp: Instant,
        service: String,
    },

    /// The catalog was queried and the cache entry replaced.
    CacheRefreshed {
        resolver_name: String,
        timestamp: Instant,
        service: String,
        /// Number of strategies the catalog returned.
        count: usize,
    },

    /// The catalog failed and a previous entry was served.
    StaleServed {
        resolver_name: String,
        timestamp: Instant,
        service: String,
        /// The catalog failure.
        error: String,
    },

    /// The catalog failed and nothing was cached for the service.
    CatalogUnavailable {
        resolver_name: String,
        timestamp: Instant,
        service: String,
        /// The catalog failure.
        error: String,
    },

    /// The fallback table replaced an empty candidate list.
    FallbackUsed {
        resolver_name: String,
        timestamp: Instant,
        service: String,
        /// Number of fallback strategies.
        count: usize,
    },

    /// A strategy was selected.
    Selected {
        resolver_name: String,
        timestamp: Instant,
        service: String,
        method: String,
        rank: u32,
        /// Number of higher-ranked strategies skipped.
        skipped: usize,
    },

    /// No candidate was available.
    NoStrategyAvailable {
        resolver_name: String,
        timestamp: Instant,
        service: String,
        /// Number of candidates evaluated.
        candidates: usize,
    },

    /// An audit write failed and was dropped.
    AuditDropped {
        resolver_name: String,
        timestamp: Instant,
        service: String,
        error: String,
    },
}

impl ResolverEvent {
    /// Returns the service the event concerns.
    pub fn service(&self) -> &str {
        match self {
            Self::CacheHit { service, .. }
            | Self::CacheRefreshed { service, .. }
            | Self::StaleServed { service, .. }
            | Self::CatalogUnavailable { service, .. }
            | Self::FallbackUsed { service, .. }
            | Self::Selected { service, .. }
            | Self::NoStrategyAvailable { service, .. }
            | Self::AuditDropped { service, .. } => service,
        }
    }
}

impl RouterEvent for ResolverEvent {
    fn event_type(&self) -> &'static str {
        match self {
            Self::CacheHit { .. } => "cache_hit",
            Self::CacheRefreshed { .. } => "cache_refreshed",
            Self::StaleServed { .. } => "stale_served",
            Self::CatalogUnavailable { .. } => "catalog_unavailable",
            Self::FallbackUsed { .. } => "fallback_used",
            Self::Selected { .. } => "selected",
            Self::NoStrategyAvailable { .. } => "no_strategy_available",
            Self::AuditDropped { .. } => "audit_dropped",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            Self::CacheHit { timestamp, .. }
            | Self::CacheRefreshed { timestamp, .. }
            | Self::StaleServed { timestamp, .. }
            | Self::CatalogUnavailable { timestamp, .. }
            | Self::FallbackUsed { timestamp, .. }
            | Self::Selected { timestamp, .. }
            | Self::NoStrategyAvailable { timestamp, .. }
            | Self::AuditDropped { timestamp, .. } => *timestamp,
        }
    }

    fn resolver_name(&self) -> &str {
        match self {
            Self::CacheHit { resolver_name, .. }
            | Self::CacheRefreshed { resolver_name, .. }
            | Self::StaleServed { resolver_name, .. }
            | Self::CatalogUnavailable { resolver_name, .. }
            | Self::FallbackUsed { resolver_name, .. }
            | Self::Selected { resolver_name, .. }
            | Self::NoStrategyAvailable { resolver_name, .. }
            | Self::AuditDropped { resolver_name, .. } => resolver_name,
        }
    }
}
