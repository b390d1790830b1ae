//! Resolve and connect with an in-memory catalog.
//!
//! Run with: cargo run -p connroute --example basic_resolve

use connroute::materialize::{Client, ConnectionDescriptor};
use connroute::{
    BoxError, ConnectionType, InMemoryCatalog, MemoryAuditStore, ResolveOptions, Resolver,
    ResolverConfig, StaticEnv, Strategy,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let catalog = InMemoryCatalog::new().with_service(
        "database",
        vec![
            Strategy::new("database", "pooled-url", 1, ConnectionType::RawProtocolClient)
                .with_env_var("DATABASE_POOLER_URL")
                .with_description("Transaction pooler"),
            Strategy::new("database", "direct-password", 2, ConnectionType::RawProtocolClient)
                .with_env_var("DATABASE_PASSWORD")
                .with_config(json!({
                    "host": "db.internal",
                    "user": "app",
                    "database": "main",
                    "timeout_ms": 3000
                }))
                .with_description("Direct connection with password"),
        ],
    );

    let env = StaticEnv::new().with("DATABASE_PASSWORD", "example-password");
    let audit = Arc::new(MemoryAuditStore::new());

    let resolver = Resolver::new(
        catalog,
        ResolverConfig::builder()
            .name("example")
            .environment(env.clone())
            .audit_store(Arc::clone(&audit))
            .raw_connector(|descriptor: ConnectionDescriptor| async move {
                println!("connector received {:?}", descriptor);
                Ok::<Client, BoxError>(Arc::new(descriptor.url))
            })
            .on_selected(|service, method, rank| {
                println!("selected {} for {} (rank {})", method, service, rank);
            })
            .build(),
    );

    println!("candidates:");
    for candidate in resolver.list_candidates("database").await {
        println!(
            "  {} rank={} available={}",
            candidate.method_name, candidate.rank, candidate.available
        );
    }

    match resolver
        .connect("database", ResolveOptions::new().with_caller("example"))
        .await
    {
        Ok(handle) => println!("connected via {} ({})", handle.method, handle.connection_type),
        Err(e) => println!("connect failed: {}", e),
    }

    env.remove("DATABASE_PASSWORD");
    if let Err(e) = resolver.connect("database", ResolveOptions::new()).await {
        println!("after removing the password: {}", e);
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    for record in audit.records() {
        println!(
            "audit: service={} selected={} success={} skipped={}",
            record.service_name,
            record.method_selected,
            record.success,
            record.skipped.len()
        );
    }
}
