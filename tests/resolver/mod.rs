//! Integration tests for the connroute resolver.
//!
//! - **selection**: rank ordering, skipped records, tie handling
//! - **fallback**: fallback table activation and isolation from catalog lists
//! - **stale**: serve-stale-on-error and TTL behaviour
//! - **no_strategy**: the failure raised by `connect` when nothing is usable
//! - **audit**: audit records and their isolation from caller outcomes
//! - **introspection**: `list_candidates`, `cache_status`, `invalidate_cache`
//! - **connect**: materialization through injected factories
//! - **events**: listener callbacks

mod connect;
mod fallback;
mod stale;

use connroute::{
    AuditError, AuditStore, CatalogError, ConnectionType, InMemoryCatalog, MemoryAuditStore,
    SelectionRecord, Strategy, StrategyCatalog,
};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Catalog wrapper that counts fetches and can be switched into failure.
pub struct FlakyCatalog {
    pub inner: InMemoryCatalog,
    failing: AtomicBool,
    fetches: AtomicUsize,
}

impl FlakyCatalog {
    pub fn new(inner: InMemoryCatalog) -> Arc<Self> {
        Arc::new(Self {
            inner,
            failing: AtomicBool::new(false),
            fetches: AtomicUsize::new(0),
        })
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl StrategyCatalog for FlakyCatalog {
    fn fetch<'a>(
        &'a self,
        service_name: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Strategy>, CatalogError>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            Box::pin(async { Err(CatalogError::unavailable("connection refused")) })
        } else {
            self.inner.fetch(service_name)
        }
    }
}

/// Audit store that rejects every insert.
pub struct RejectingAuditStore {
    pub attempts: AtomicUsize,
}

impl RejectingAuditStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            attempts: AtomicUsize::new(0),
        })
    }
}

impl AuditStore for RejectingAuditStore {
    fn write<'a>(&'a self, _record: &'a SelectionRecord) -> BoxFuture<'a, Result<(), AuditError>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Err(AuditError::Rejected("insert violates row-level policy".into())) })
    }
}

/// Audit store that panics on every write.
pub struct PanickingAuditStore;

impl AuditStore for PanickingAuditStore {
    fn write<'a>(&'a self, _record: &'a SelectionRecord) -> BoxFuture<'a, Result<(), AuditError>> {
        Box::pin(async { panic!("audit backend exploded") })
    }
}

/// The two-strategy catalog used throughout: `a` (rank 1, needs `X`) and `b`
/// (rank 2, needs `Y`).
pub fn db_catalog() -> InMemoryCatalog {
    InMemoryCatalog::new().with_service(
        "db",
        vec![
            Strategy::new("db", "a", 1, ConnectionType::RawProtocolClient).with_env_var("X"),
            Strategy::new("db", "b", 2, ConnectionType::RawProtocolClient).with_env_var("Y"),
        ],
    )
}

/// Waits until the store holds `expected` records, yielding to the spawned
/// audit tasks in between.
pub async fn wait_for_records(store: &MemoryAuditStore, expected: usize) -> Vec<SelectionRecord> {
    for _ in 0..200 {
        if store.len() >= expected {
            break;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    store.records()
}
