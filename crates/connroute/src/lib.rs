//! Ranked connection strategy resolution.
//!
//! A service (a database, a model provider) can usually be reached in more
//! than one way: a pooled URL, a direct connection with a password, a managed
//! client holding a service credential. `connroute` keeps those ways as a
//! ranked list of [`Strategy`] values, picks the best one the current
//! environment can satisfy, records the decision, and optionally opens the
//! connection.
//!
//! # Overview
//!
//! A [`Resolver`] ties the pieces together:
//!
//! - a [`StrategyCatalog`] supplies the authoritative ranked list per service;
//! - a per-resolver cache serves lists for a TTL and keeps serving the last
//!   good list while the catalog is unreachable;
//! - a [`FallbackTable`] stands in whenever the cache comes back empty;
//! - selection walks the list in order and stops at the first strategy whose
//!   required environment variable is set;
//! - every selection is dispatched to an [`AuditStore`] in the background;
//! - a [`Materializer`] turns the selected strategy into a connected client
//!   using the factory registered for its connection type.
//!
//! # Example
//!
//! ```rust
//! use connroute::{
//!     ConnectionType, InMemoryCatalog, ResolveOptions, Resolver, ResolverConfig, StaticEnv,
//!     Strategy,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let catalog = InMemoryCatalog::new().with_service(
//!     "db",
//!     vec![
//!         Strategy::new("db", "a", 1, ConnectionType::RawProtocolClient).with_env_var("X"),
//!         Strategy::new("db", "b", 2, ConnectionType::RawProtocolClient).with_env_var("Y"),
//!     ],
//! );
//!
//! let resolver = Resolver::new(
//!     catalog,
//!     ResolverConfig::builder()
//!         .name("app")
//!         .environment(StaticEnv::new().with("Y", "set"))
//!         .build(),
//! );
//!
//! let strategy = resolver.resolve("db", ResolveOptions::new()).await.unwrap();
//! assert_eq!(strategy.method_name, "b");
//! # }
//! ```
//!
//! # Connecting
//!
//! [`Resolver::connect`] selects and then materializes. Factories are
//! injected per connection type; plain closures work:
//!
//! ```rust
//! use connroute::materialize::{Client, ConnectionDescriptor};
//! use connroute::{BoxError, ResolverConfig};
//! use std::sync::Arc;
//!
//! let config = ResolverConfig::builder()
//!     .raw_connector(|descriptor: ConnectionDescriptor| async move {
//!         // open a connection with descriptor.url, descriptor.timeout, descriptor.ssl
//!         Ok::<Client, BoxError>(Arc::new(descriptor.url))
//!     })
//!     .build();
//! ```
//!
//! Errors raised by the client library come back as
//! [`ConnectError::Connection`] carrying the original error.
//!
//! # Features
//!
//! - `tracing` (default): `debug!`/`warn!` records for cache, selection, and
//!   audit outcomes.
//! - `metrics`: counters `connroute_cache_requests_total`,
//!   `connroute_selections_total`, and `connroute_audit_writes_total`.
//! - `rest`: [`rest::RestCatalog`] and [`rest::RestAuditStore`] over a
//!   PostgREST-style HTTP API.

pub mod audit;
pub mod availability;
pub mod cache;
pub mod catalog;
mod config;
mod error;
mod events;
pub mod fallback;
pub mod materialize;
mod resolver;
pub mod selector;
mod strategy;

#[cfg(feature = "rest")]
pub mod rest;

pub use audit::{AuditError, AuditStore, MemoryAuditStore, SelectionRecord};
pub use availability::{Environment, ProcessEnv, SkipReason, StaticEnv};
pub use cache::{CacheStatus, DEFAULT_TTL};
pub use catalog::{CatalogError, InMemoryCatalog, StrategyCatalog};
pub use config::{CandidateInfo, ResolveOptions, ResolverConfig, ResolverConfigBuilder};
pub use connroute_core::BoxError;
pub use error::ConnectError;
pub use events::ResolverEvent;
pub use fallback::FallbackTable;
pub use materialize::{ConnectionHandle, Materializer, SingletonFactory};
pub use resolver::Resolver;
pub use selector::{Selection, SkippedStrategy};
pub use strategy::{ConnectionType, Strategy, StrategyConfig, StrategyRow};
