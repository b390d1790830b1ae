//! Best-effort audit trail of selection decisions.
//!
//! [`AuditLogger::record`] hands each [`SelectionRecord`] to a background task
//! and returns immediately. Whatever happens to the write afterwards (store
//! unreachable, insert rejected, task panics) stays inside that task; the
//! selection that produced the record has already been returned.

use crate::events::ResolverEvent;
use crate::selector::{Selection, SkippedStrategy};
use connroute_core::{BoxError, EventListeners};
use futures::future::BoxFuture;
use serde::{Serialize, Serializer};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

#[cfg(feature = "metrics")]
use metrics::counter;

/// `method_selected` value recorded when nothing was selected.
pub const NO_METHOD: &str = "none";

/// One selection outcome, written exactly once.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionRecord {
    pub service_name: String,
    /// Selected method name, or [`NO_METHOD`].
    pub method_selected: String,
    pub method_rank: Option<u32>,
    pub skipped: Vec<SkippedStrategy>,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
    pub caller: Option<String>,
    pub success: bool,
    pub error_message: Option<String>,
}

impl SelectionRecord {
    /// Builds the record for a finished selection.
    pub fn from_selection(
        service_name: &str,
        selection: &Selection,
        duration: Duration,
        caller: Option<String>,
    ) -> Self {
        match &selection.selected {
            Some(strategy) => Self {
                service_name: service_name.to_string(),
                method_selected: strategy.method_name.clone(),
                method_rank: Some(strategy.rank),
                skipped: selection.skipped.clone(),
                duration,
                caller,
                success: true,
                error_message: None,
            },
            None => Self {
                service_name: service_name.to_string(),
                method_selected: NO_METHOD.to_string(),
                method_rank: None,
                skipped: selection.skipped.clone(),
                duration,
                caller,
                success: false,
                error_message: Some(format!(
                    "no connection strategy available for service '{}'",
                    service_name
                )),
            },
        }
    }
}

fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

/// Errors from an audit store. Never surfaced to resolver callers.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// The store refused the write.
    #[error("audit write rejected: {0}")]
    Rejected(String),
    /// The store could not be reached.
    #[error("audit store unavailable: {0}")]
    Unavailable(#[source] BoxError),
}

/// Durable destination for selection records.
pub trait AuditStore: Send + Sync {
    /// Writes one record.
    fn write<'a>(&'a self, record: &'a SelectionRecord) -> BoxFuture<'a, Result<(), AuditError>>;
}

impl<A: AuditStore + ?Sized> AuditStore for Arc<A> {
    fn write<'a>(&'a self, record: &'a SelectionRecord) -> BoxFuture<'a, Result<(), AuditError>> {
        (**self).write(record)
    }
}

/// Audit store that keeps records in memory, in write order.
#[derive(Debug, Default)]
pub struct MemoryAuditStore {
    records: Mutex<Vec<SelectionRecord>>,
}

impl MemoryAuditStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every record written so far.
    pub fn records(&self) -> Vec<SelectionRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the number of records written so far.
    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns true if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditStore for MemoryAuditStore {
    fn write<'a>(&'a self, record: &'a SelectionRecord) -> BoxFuture<'a, Result<(), AuditError>> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Box::pin(async { Ok(()) })
    }
}

/// Fire-and-forget recorder in front of an [`AuditStore`].
#[derive(Clone)]
pub struct AuditLogger {
    store: Option<Arc<dyn AuditStore>>,
    name: Arc<str>,
    listeners: EventListeners<ResolverEvent>,
}

impl AuditLogger {
    /// Creates a logger writing to `store`.
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self {
            store: Some(store),
            name: Arc::from("<unnamed>"),
            listeners: EventListeners::new(),
        }
    }

    /// Creates a logger that drops every record.
    pub fn disabled() -> Self {
        Self {
            store: None,
            name: Arc::from("<unnamed>"),
            listeners: EventListeners::new(),
        }
    }

    pub(crate) fn with_events(
        mut self,
        name: &str,
        listeners: EventListeners<ResolverEvent>,
    ) -> Self {
        self.name = Arc::from(name);
        self.listeners = listeners;
        self
    }

    /// Returns true if records are written somewhere.
    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    /// Dispatches a record to a background task and returns immediately.
    ///
    /// Outside a Tokio runtime the record is dropped.
    pub fn record(&self, record: SelectionRecord) {
        let Some(store) = self.store.clone() else {
            return;
        };

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                service = %record.service_name,
                "no runtime available, selection record dropped"
            );
            return;
        };

        let name = Arc::clone(&self.name);
        let listeners = self.listeners.clone();

        // Detached; the caller never waits on the write.
        drop(runtime.spawn(async move {
            match store.write(&record).await {
                Ok(()) => {
                    #[cfg(feature = "metrics")]
                    counter!("connroute_audit_writes_total", "resolver" => name.to_string(), "result" => "ok")
                        .increment(1);
                }
                Err(error) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        resolver = %name,
                        service = %record.service_name,
                        %error,
                        "selection record dropped"
                    );

                    #[cfg(feature = "metrics")]
                    counter!("connroute_audit_writes_total", "resolver" => name.to_string(), "result" => "dropped")
                        .increment(1);

                    listeners.emit(&ResolverEvent::AuditDropped {
                        resolver_name: name.to_string(),
                        timestamp: Instant::now(),
                        service: record.service_name.clone(),
                        error: error.to_string(),
                    });
                }
            }
        }));
    }
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger")
            .field("enabled", &self.is_enabled())
            .field("name", &self.name)
            .finish()
    }
}
