//! Time-bounded strategy cache with serve-stale-on-error.

use crate::catalog::StrategyCatalog;
use crate::Strategy;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;

#[cfg(feature = "tracing")]
use tracing::{debug, warn};

/// Default time-to-live for cached strategy lists.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Last fetched strategy list for one service.
#[derive(Debug, Clone)]
struct CacheEntry {
    strategies: Arc<[Strategy]>,
    fetched_at: Instant,
}

impl CacheEntry {
    fn new(strategies: Vec<Strategy>) -> Self {
        Self {
            strategies: strategies.into(),
            fetched_at: Instant::now(),
        }
    }

    fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}

/// Where a cache read got its list from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheSource {
    /// A fresh entry was served without calling the catalog.
    Fresh,
    /// The catalog was queried and the entry replaced.
    Refreshed,
    /// The catalog failed and the previous entry was served unchanged.
    Stale {
        /// The catalog failure.
        error: String,
    },
    /// The catalog failed and there was no previous entry.
    Unavailable {
        /// The catalog failure.
        error: String,
    },
}

/// Result of [`StrategyCache::get`].
#[derive(Debug, Clone)]
pub struct CacheRead {
    /// The strategies to use. May be empty.
    pub strategies: Arc<[Strategy]>,
    /// How they were obtained.
    pub source: CacheSource,
}

/// Observability snapshot of one cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStatus {
    /// Number of cached strategies.
    pub count: usize,
    /// Time since the entry was fetched.
    pub age: Duration,
    /// Whether the entry is past its TTL.
    pub stale: bool,
}

/// Per-service cache in front of a [`StrategyCatalog`].
///
/// Entries are only ever replaced, never evicted, so a stale entry remains
/// available as a last resort while the catalog is unreachable. Concurrent
/// refreshes of the same service are not de-duplicated; each one replaces the
/// entry with a single map insert.
pub struct StrategyCache {
    catalog: Arc<dyn StrategyCatalog>,
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl StrategyCache {
    /// Creates a cache over the given catalog.
    pub fn new(catalog: Arc<dyn StrategyCatalog>, ttl: Duration) -> Self {
        Self {
            catalog,
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Returns the configured TTL.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the strategy list for a service.
    ///
    /// Fresh entries are served directly. Otherwise the catalog is queried:
    /// any successful answer (including an empty list) replaces the entry; a
    /// failure serves the previous entry regardless of age, or an empty list
    /// if there is none.
    pub async fn get(&self, service_name: &str) -> CacheRead {
        let previous = self.entry(service_name);

        if let Some(entry) = previous.as_ref().filter(|e| e.is_fresh(self.ttl)) {
            #[cfg(feature = "tracing")]
            debug!(service = service_name, "strategy cache hit");

            return CacheRead {
                strategies: Arc::clone(&entry.strategies),
                source: CacheSource::Fresh,
            };
        }

        match self.catalog.fetch(service_name).await {
            Ok(strategies) => {
                #[cfg(feature = "tracing")]
                debug!(
                    service = service_name,
                    count = strategies.len(),
                    "strategy cache refreshed"
                );

                let entry = CacheEntry::new(strategies);
                let strategies = Arc::clone(&entry.strategies);
                self.entries
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(service_name.to_string(), entry);

                CacheRead {
                    strategies,
                    source: CacheSource::Refreshed,
                }
            }
            Err(error) => {
                let error = error.to_string();
                match previous {
                    Some(entry) => {
                        #[cfg(feature = "tracing")]
                        warn!(service = service_name, %error, "catalog unavailable, serving stale strategies");

                        CacheRead {
                            strategies: entry.strategies,
                            source: CacheSource::Stale { error },
                        }
                    }
                    None => {
                        #[cfg(feature = "tracing")]
                        warn!(service = service_name, %error, "catalog unavailable, no cached strategies");

                        CacheRead {
                            strategies: Arc::from(Vec::new()),
                            source: CacheSource::Unavailable { error },
                        }
                    }
                }
            }
        }
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Returns per-service entry age and staleness.
    pub fn status(&self) -> HashMap<String, CacheStatus> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(service, entry)| {
                let age = entry.fetched_at.elapsed();
                let status = CacheStatus {
                    count: entry.strategies.len(),
                    age,
                    stale: age >= self.ttl,
                };
                (service.clone(), status)
            })
            .collect()
    }

    fn entry(&self, service_name: &str) -> Option<CacheEntry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(service_name)
            .cloned()
    }
}

impl std::fmt::Debug for StrategyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyCache")
            .field("ttl", &self.ttl)
            .field("services", &self.status().len())
            .finish()
    }
}
