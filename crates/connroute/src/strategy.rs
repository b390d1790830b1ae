//! Strategy data model.
//!
//! A [`Strategy`] is one ranked, named way of connecting to a service. Catalog
//! rows arrive as [`StrategyRow`]s whose `config` blob may be either a JSON
//! object or a JSON-encoded string; the blob is decoded exactly once, when the
//! row becomes a `Strategy`, so everything downstream sees a
//! [`StrategyConfig`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Connection type tag selecting which materializer handler applies.
///
/// The set of supported handlers is closed; any other tag read from a catalog
/// is preserved in [`ConnectionType::Other`] so the materializer can report it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConnectionType {
    /// A raw database-protocol client opened from a connection descriptor.
    RawProtocolClient,
    /// An already-configured managed-service client handed out by a factory.
    ManagedServiceClient,
    /// A tag with no handler.
    Other(String),
}

impl ConnectionType {
    /// Wire name of [`ConnectionType::RawProtocolClient`].
    pub const RAW_PROTOCOL_CLIENT: &'static str = "raw-protocol-client";
    /// Wire name of [`ConnectionType::ManagedServiceClient`].
    pub const MANAGED_SERVICE_CLIENT: &'static str = "managed-service-client";

    /// Parses a connection type tag. Unknown tags are kept verbatim.
    pub fn parse(tag: &str) -> Self {
        match tag {
            Self::RAW_PROTOCOL_CLIENT => Self::RawProtocolClient,
            Self::MANAGED_SERVICE_CLIENT => Self::ManagedServiceClient,
            other => Self::Other(other.to_string()),
        }
    }

    /// Returns the wire name of this connection type.
    pub fn as_str(&self) -> &str {
        match self {
            Self::RawProtocolClient => Self::RAW_PROTOCOL_CLIENT,
            Self::ManagedServiceClient => Self::MANAGED_SERVICE_CLIENT,
            Self::Other(tag) => tag,
        }
    }
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for ConnectionType {
    fn from(tag: String) -> Self {
        Self::parse(&tag)
    }
}

impl From<&str> for ConnectionType {
    fn from(tag: &str) -> Self {
        Self::parse(tag)
    }
}

impl From<ConnectionType> for String {
    fn from(ty: ConnectionType) -> Self {
        match ty {
            ConnectionType::Other(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

/// Strategy-specific configuration, decoded once on read.
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyConfig {
    /// A decoded configuration object.
    Structured(Map<String, Value>),
    /// The stored blob could not be decoded into an object.
    ///
    /// Selection ignores this; the materializer rejects it.
    Malformed {
        /// The stored representation.
        raw: String,
        /// Why decoding failed.
        reason: String,
    },
}

impl StrategyConfig {
    /// Decodes a stored configuration value.
    ///
    /// Missing and `null` values decode to an empty object. Strings are parsed
    /// as JSON and must contain an object.
    pub fn decode(value: Option<Value>) -> Self {
        match value {
            None | Some(Value::Null) => Self::default(),
            Some(Value::Object(map)) => Self::Structured(map),
            Some(Value::String(raw)) => match serde_json::from_str::<Value>(&raw) {
                Ok(Value::Object(map)) => Self::Structured(map),
                Ok(Value::Null) => Self::default(),
                Ok(other) => Self::Malformed {
                    reason: format!("expected a JSON object, found {}", kind(&other)),
                    raw,
                },
                Err(e) => Self::Malformed {
                    reason: e.to_string(),
                    raw,
                },
            },
            Some(other) => Self::Malformed {
                reason: format!("expected a JSON object, found {}", kind(&other)),
                raw: other.to_string(),
            },
        }
    }

    /// Returns the decoded object, or the decode failure reason.
    pub fn structured(&self) -> Result<&Map<String, Value>, &str> {
        match self {
            Self::Structured(map) => Ok(map),
            Self::Malformed { reason, .. } => Err(reason),
        }
    }

    /// Looks up a key in a decoded config. Malformed configs have no keys.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.structured().ok().and_then(|map| map.get(key))
    }

    /// Returns true if the stored blob failed to decode.
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed { .. })
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self::Structured(Map::new())
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// A candidate way to connect to one named service.
#[derive(Debug, Clone, PartialEq)]
pub struct Strategy {
    /// Service this strategy connects to (e.g. `"database"`).
    pub service_name: String,
    /// Identifier unique within the service (e.g. `"pooled-url"`).
    pub method_name: String,
    /// Preference; lower is more preferred.
    pub rank: u32,
    /// Environment variable that must be set (non-empty) for this strategy
    /// to be usable. `None` means always available.
    pub env_var_required: Option<String>,
    /// Materializer handler tag.
    pub connection_type: ConnectionType,
    /// Opaque per-strategy configuration.
    pub config: StrategyConfig,
    /// Human-readable description, passed through unchanged.
    pub description: Option<String>,
}

impl Strategy {
    /// Creates a strategy with no environment requirement and an empty config.
    pub fn new(
        service_name: impl Into<String>,
        method_name: impl Into<String>,
        rank: u32,
        connection_type: impl Into<ConnectionType>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            method_name: method_name.into(),
            rank,
            env_var_required: None,
            connection_type: connection_type.into(),
            config: StrategyConfig::default(),
            description: None,
        }
    }

    /// Sets the environment variable this strategy requires.
    pub fn with_env_var(mut self, name: impl Into<String>) -> Self {
        self.env_var_required = Some(name.into());
        self
    }

    /// Sets the configuration blob, decoding it as a catalog read would.
    pub fn with_config(mut self, config: Value) -> Self {
        self.config = StrategyConfig::decode(Some(config));
        self
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Returns the required environment variable, treating an empty name as
    /// no requirement.
    pub fn required_env_var(&self) -> Option<&str> {
        self.env_var_required.as_deref().filter(|name| !name.is_empty())
    }
}

/// A strategy as stored in the catalog.
#[derive(Debug, Clone, Deserialize)]
pub struct StrategyRow {
    pub service_name: String,
    pub method_name: String,
    pub rank: u32,
    #[serde(default)]
    pub env_var_required: Option<String>,
    pub connection_type: String,
    #[serde(default)]
    pub config: Option<Value>,
    #[serde(default)]
    pub description: Option<String>,
}

impl From<StrategyRow> for Strategy {
    fn from(row: StrategyRow) -> Self {
        Self {
            service_name: row.service_name,
            method_name: row.method_name,
            rank: row.rank,
            env_var_required: row.env_var_required,
            connection_type: ConnectionType::parse(&row.connection_type),
            config: StrategyConfig::decode(row.config),
            description: row.description,
        }
    }
}
