//! Turning a selected strategy into a connected client.
//!
//! The materializer handles a closed set of connection types, each backed by a
//! factory injected at construction time:
//!
//! - `raw-protocol-client`: a [`ConnectionDescriptor`] is assembled from the
//!   strategy's config and the environment, then handed to a [`RawConnector`].
//! - `managed-service-client`: a [`ManagedClientFactory`] returns an
//!   already-configured client.
//!
//! Errors from the factories are returned untouched. The materializer never
//! retries and never tries another strategy.

use crate::availability::Environment;
use crate::error::ConnectError;
use crate::{ConnectionType, Strategy};
use connroute_core::BoxError;
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use url::Url;

#[cfg(feature = "tracing")]
use tracing::debug;

/// Default connect timeout when a strategy does not declare `timeout_ms`.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Default port for descriptors assembled from parts.
pub const DEFAULT_PORT: u16 = 5432;

const DEFAULT_USER: &str = "postgres";
const DEFAULT_DATABASE: &str = "postgres";

/// An opaque, connected client.
pub type Client = Arc<dyn Any + Send + Sync>;

/// A connected client plus how it was obtained.
#[derive(Clone)]
pub struct ConnectionHandle {
    /// The client. Use [`ConnectionHandle::downcast`] to recover its type.
    pub client: Client,
    /// Connection type that produced the client.
    pub connection_type: ConnectionType,
    /// Method name of the selected strategy.
    pub method: String,
}

impl ConnectionHandle {
    /// Returns the client as `T`, if that is what it is.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.client).downcast::<T>().ok()
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("connection_type", &self.connection_type)
            .field("method", &self.method)
            .finish_non_exhaustive()
    }
}

/// Transport encryption policy for raw-protocol connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SslPolicy {
    /// Plaintext.
    Disabled,
    /// Encrypted, optionally verifying the server certificate.
    Encrypted { verify_server: bool },
}

impl Default for SslPolicy {
    /// Encrypted without server-certificate verification.
    fn default() -> Self {
        Self::Encrypted {
            verify_server: false,
        }
    }
}

impl SslPolicy {
    /// Reads the policy from a strategy's `ssl` config value.
    ///
    /// Accepts a boolean, an object with `verify` or `reject_unauthorized`,
    /// or an `sslmode`-style string.
    pub fn from_config(value: Option<&Value>) -> Result<Self, String> {
        match value {
            None | Some(Value::Null) | Some(Value::Bool(true)) => Ok(Self::default()),
            Some(Value::Bool(false)) => Ok(Self::Disabled),
            Some(Value::Object(options)) => {
                let verify = options
                    .get("verify")
                    .or_else(|| options.get("reject_unauthorized"))
                    .map(|v| {
                        v.as_bool()
                            .ok_or_else(|| format!("ssl verification flag must be a boolean, got {}", v))
                    })
                    .transpose()?
                    .unwrap_or(false);
                Ok(Self::Encrypted {
                    verify_server: verify,
                })
            }
            Some(Value::String(mode)) => match mode.as_str() {
                "disable" => Ok(Self::Disabled),
                "prefer" | "require" => Ok(Self::default()),
                "verify-ca" | "verify-full" => Ok(Self::Encrypted {
                    verify_server: true,
                }),
                other => Err(format!("unknown ssl mode '{}'", other)),
            },
            Some(other) => Err(format!("unsupported ssl setting {}", other)),
        }
    }

    /// Returns the equivalent `sslmode` connection parameter.
    pub fn sslmode(&self) -> &'static str {
        match self {
            Self::Disabled => "disable",
            Self::Encrypted {
                verify_server: false,
            } => "require",
            Self::Encrypted {
                verify_server: true,
            } => "verify-full",
        }
    }
}

/// Everything a raw-protocol connector needs to open a connection.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    /// Method name of the strategy the descriptor came from.
    pub method: String,
    /// Connection URL. May contain a secret.
    pub url: String,
    /// Connect timeout.
    pub timeout: Duration,
    /// Transport encryption policy.
    pub ssl: SslPolicy,
    /// Optional `application_name` to report to the server.
    pub application_name: Option<String>,
}

impl ConnectionDescriptor {
    /// Builds a descriptor from a strategy's config and the environment.
    ///
    /// If the config names `host` or `host_env`, the URL is assembled from
    /// host, `port`, `user`, `database`, and the secret in `password_env`
    /// (or the strategy's required variable). Otherwise the full URL is read
    /// from `url_env`, or from the strategy's required variable.
    pub fn from_strategy(strategy: &Strategy, env: &dyn Environment) -> Result<Self, ConnectError> {
        let invalid = |reason: String| ConnectError::InvalidConfig {
            method: strategy.method_name.clone(),
            reason,
        };

        let config = strategy
            .config
            .structured()
            .map_err(|reason| invalid(reason.to_string()))?;

        let timeout = match config.get("timeout_ms") {
            None | Some(Value::Null) => DEFAULT_CONNECT_TIMEOUT,
            Some(value) => value
                .as_u64()
                .map(Duration::from_millis)
                .ok_or_else(|| invalid(format!("timeout_ms must be a non-negative integer, got {}", value)))?,
        };

        let ssl = SslPolicy::from_config(config.get("ssl")).map_err(invalid)?;

        let url = if config.contains_key("host") || config.contains_key("host_env") {
            url_from_parts(config, strategy, env).map_err(invalid)?
        } else {
            url_from_env(config, strategy, env).map_err(invalid)?
        };

        Ok(Self {
            method: strategy.method_name.clone(),
            url,
            timeout,
            ssl,
            application_name: string_key(config, "application_name").map_err(invalid)?,
        })
    }

    /// Returns the URL with any password masked.
    pub fn redacted_url(&self) -> String {
        match Url::parse(&self.url) {
            Ok(mut url) => {
                if url.password().is_some() {
                    let _ = url.set_password(Some("****"));
                }
                url.to_string()
            }
            Err(_) => "<unparseable url>".to_string(),
        }
    }
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("method", &self.method)
            .field("url", &self.redacted_url())
            .field("timeout", &self.timeout)
            .field("ssl", &self.ssl)
            .field("application_name", &self.application_name)
            .finish()
    }
}

fn string_key(config: &Map<String, Value>, key: &str) -> Result<Option<String>, String> {
    match config.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(format!("{} must be a string, got {}", key, other)),
    }
}

fn required_var(env: &dyn Environment, name: &str) -> Result<String, String> {
    env.var(name)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| format!("env var {} not set", name))
}

fn url_from_env(
    config: &Map<String, Value>,
    strategy: &Strategy,
    env: &dyn Environment,
) -> Result<String, String> {
    let name = match string_key(config, "url_env")? {
        Some(name) => name,
        None => strategy
            .required_env_var()
            .map(str::to_string)
            .ok_or_else(|| "no url_env configured and no env var required".to_string())?,
    };
    required_var(env, &name)
}

fn url_from_parts(
    config: &Map<String, Value>,
    strategy: &Strategy,
    env: &dyn Environment,
) -> Result<String, String> {
    let host = match string_key(config, "host")? {
        Some(host) => host,
        None => {
            let name = string_key(config, "host_env")?
                .ok_or_else(|| "host_env must be a string".to_string())?;
            required_var(env, &name)?
        }
    };

    let port = match config.get("port") {
        None | Some(Value::Null) => DEFAULT_PORT,
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|p| u16::try_from(p).ok())
            .ok_or_else(|| format!("port out of range: {}", n))?,
        Some(Value::String(s)) => s.parse().map_err(|_| format!("invalid port '{}'", s))?,
        Some(other) => return Err(format!("port must be a number, got {}", other)),
    };

    let user = string_key(config, "user")?.unwrap_or_else(|| DEFAULT_USER.to_string());
    let database =
        string_key(config, "database")?.unwrap_or_else(|| DEFAULT_DATABASE.to_string());

    let password_var = match string_key(config, "password_env")? {
        Some(name) => name,
        None => strategy
            .required_env_var()
            .map(str::to_string)
            .ok_or_else(|| "no password_env configured and no env var required".to_string())?,
    };
    let password = required_var(env, &password_var)?;

    let mut url = Url::parse(&format!("postgresql://{}:{}", host, port))
        .map_err(|e| format!("invalid host '{}': {}", host, e))?;
    url.set_username(&user)
        .map_err(|_| format!("cannot set user '{}'", user))?;
    url.set_password(Some(&password))
        .map_err(|_| "cannot set password".to_string())?;
    url.set_path(&format!("/{}", database.trim_start_matches('/')));

    Ok(url.to_string())
}

/// Opens raw-protocol connections from descriptors.
///
/// Any `Fn(ConnectionDescriptor) -> impl Future<Output = Result<Client, BoxError>>`
/// is a connector.
pub trait RawConnector: Send + Sync {
    /// Opens a connection. Errors are passed to the caller unchanged.
    fn connect(&self, descriptor: ConnectionDescriptor) -> BoxFuture<'static, Result<Client, BoxError>>;
}

impl<F, Fut> RawConnector for F
where
    F: Fn(ConnectionDescriptor) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Client, BoxError>> + Send + 'static,
{
    fn connect(&self, descriptor: ConnectionDescriptor) -> BoxFuture<'static, Result<Client, BoxError>> {
        Box::pin(self(descriptor))
    }
}

/// Hands out managed-service clients.
///
/// Any `Fn(&Strategy) -> impl Future<Output = Result<Client, BoxError>>` is a
/// factory.
pub trait ManagedClientFactory: Send + Sync {
    /// Returns a configured client for the strategy.
    fn client(&self, strategy: &Strategy) -> BoxFuture<'static, Result<Client, BoxError>>;
}

impl<F, Fut> ManagedClientFactory for F
where
    F: Fn(&Strategy) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Client, BoxError>> + Send + 'static,
{
    fn client(&self, strategy: &Strategy) -> BoxFuture<'static, Result<Client, BoxError>> {
        Box::pin(self(strategy))
    }
}

type InitFn = Arc<dyn Fn() -> BoxFuture<'static, Result<Client, BoxError>> + Send + Sync>;

/// A managed-client factory that builds one client lazily and shares it.
///
/// A failed initialisation is not cached; the next call tries again.
#[derive(Clone)]
pub struct SingletonFactory {
    cell: Arc<OnceCell<Client>>,
    init: InitFn,
}

impl SingletonFactory {
    /// Creates a factory that runs `init` on first use.
    pub fn new<F, Fut>(init: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Client, BoxError>> + Send + 'static,
    {
        Self {
            cell: Arc::new(OnceCell::new()),
            init: Arc::new(move || -> BoxFuture<'static, Result<Client, BoxError>> {
                Box::pin(init())
            }),
        }
    }

    /// Creates a factory around an existing client.
    pub fn from_client(client: Client) -> Self {
        let cell = Arc::new(OnceCell::new_with(Some(Arc::clone(&client))));
        Self {
            cell,
            init: Arc::new(move || -> BoxFuture<'static, Result<Client, BoxError>> {
                let client = Arc::clone(&client);
                Box::pin(async move { Ok(client) })
            }),
        }
    }
}

impl ManagedClientFactory for SingletonFactory {
    fn client(&self, _strategy: &Strategy) -> BoxFuture<'static, Result<Client, BoxError>> {
        let cell = Arc::clone(&self.cell);
        let init = Arc::clone(&self.init);
        Box::pin(async move { cell.get_or_try_init(|| init()).await.map(Arc::clone) })
    }
}

impl fmt::Debug for SingletonFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingletonFactory")
            .field("initialized", &self.cell.initialized())
            .finish()
    }
}

/// Constructs connected clients for selected strategies.
#[derive(Clone)]
pub struct Materializer {
    env: Arc<dyn Environment>,
    raw: Option<Arc<dyn RawConnector>>,
    managed: Option<Arc<dyn ManagedClientFactory>>,
}

impl Materializer {
    /// Creates a materializer with no factories.
    pub fn new(env: Arc<dyn Environment>) -> Self {
        Self {
            env,
            raw: None,
            managed: None,
        }
    }

    /// Sets the factory for `raw-protocol-client` strategies.
    pub fn with_raw_connector(mut self, connector: Arc<dyn RawConnector>) -> Self {
        self.raw = Some(connector);
        self
    }

    /// Sets the factory for `managed-service-client` strategies.
    pub fn with_managed_factory(mut self, factory: Arc<dyn ManagedClientFactory>) -> Self {
        self.managed = Some(factory);
        self
    }

    /// Connects using the given strategy.
    pub async fn materialize(&self, strategy: &Strategy) -> Result<ConnectionHandle, ConnectError> {
        let client = match &strategy.connection_type {
            ConnectionType::RawProtocolClient => self.open_raw(strategy).await?,
            ConnectionType::ManagedServiceClient => {
                let factory = self.managed.as_ref().ok_or_else(|| not_configured(strategy))?;
                factory.client(strategy).await.map_err(ConnectError::Connection)?
            }
            ConnectionType::Other(tag) => {
                return Err(ConnectError::UnsupportedConnectionType {
                    method: strategy.method_name.clone(),
                    connection_type: tag.clone(),
                });
            }
        };

        #[cfg(feature = "tracing")]
        debug!(
            service = %strategy.service_name,
            method = %strategy.method_name,
            connection_type = %strategy.connection_type,
            "connection materialized"
        );

        Ok(ConnectionHandle {
            client,
            connection_type: strategy.connection_type.clone(),
            method: strategy.method_name.clone(),
        })
    }

    async fn open_raw(&self, strategy: &Strategy) -> Result<Client, ConnectError> {
        let connector = self.raw.as_ref().ok_or_else(|| not_configured(strategy))?;
        let descriptor = ConnectionDescriptor::from_strategy(strategy, self.env.as_ref())?;
        let timeout = descriptor.timeout;

        #[cfg(feature = "tracing")]
        debug!(
            method = %descriptor.method,
            url = %descriptor.redacted_url(),
            ?timeout,
            sslmode = descriptor.ssl.sslmode(),
            "opening raw-protocol connection"
        );

        match tokio::time::timeout(timeout, connector.connect(descriptor)).await {
            Ok(result) => result.map_err(ConnectError::Connection),
            Err(_) => Err(ConnectError::Timeout {
                method: strategy.method_name.clone(),
                timeout,
            }),
        }
    }
}

fn not_configured(strategy: &Strategy) -> ConnectError {
    ConnectError::FactoryNotConfigured {
        connection_type: strategy.connection_type.to_string(),
    }
}

impl fmt::Debug for Materializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Materializer")
            .field("raw_connector", &self.raw.is_some())
            .field("managed_factory", &self.managed.is_some())
            .finish()
    }
}
