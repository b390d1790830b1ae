//! Errors surfaced by [`Resolver::connect`](crate::Resolver::connect).

use connroute_core::BoxError;
use std::time::Duration;

/// Errors returned when obtaining a connected client.
///
/// Catalog and audit failures never appear here; the cache and the audit
/// logger absorb them.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    /// No candidate strategy was usable.
    #[error(
        "no connection strategy available for service '{service}'; set one of: {}",
        missing_list(.missing_env_vars)
    )]
    NoStrategyAvailable {
        /// The service that was resolved.
        service: String,
        /// Environment variables that would have made a candidate usable.
        missing_env_vars: Vec<String>,
    },

    /// The selected strategy names a connection type with no handler.
    #[error("unsupported connection type '{connection_type}' for method '{method}'")]
    UnsupportedConnectionType {
        method: String,
        connection_type: String,
    },

    /// The connection type is supported but no factory was configured for it.
    #[error("no factory configured for connection type '{connection_type}'")]
    FactoryNotConfigured { connection_type: String },

    /// The strategy's configuration cannot produce a connection descriptor.
    #[error("invalid configuration for method '{method}': {reason}")]
    InvalidConfig { method: String, reason: String },

    /// The connection did not open within the strategy's timeout.
    #[error("connecting with method '{method}' timed out after {timeout:?}")]
    Timeout { method: String, timeout: Duration },

    /// The client library failed to connect. The error is passed through
    /// unchanged and can be downcast to the library's own type.
    #[error(transparent)]
    Connection(BoxError),
}

fn missing_list(names: &[String]) -> String {
    if names.is_empty() {
        "(no candidate strategies)".to_string()
    } else {
        names.join(", ")
    }
}

impl ConnectError {
    /// Returns true if no strategy could be selected.
    pub fn is_no_strategy(&self) -> bool {
        matches!(self, Self::NoStrategyAvailable { .. })
    }

    /// Returns the underlying client error, if this is a connection failure.
    pub fn connection_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            Self::Connection(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}
