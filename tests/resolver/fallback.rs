//! Fallback table activation.

use super::{FlakyCatalog, db_catalog};
use connroute::{
    ConnectionType, FallbackTable, InMemoryCatalog, ResolveOptions, Resolver, ResolverConfig,
    StaticEnv, Strategy,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn table() -> FallbackTable {
    FallbackTable::new().with_service(
        "db",
        vec![
            Strategy::new("db", "embedded-url", 1, ConnectionType::RawProtocolClient)
                .with_env_var("EMBEDDED_URL"),
        ],
    )
}

#[tokio::test]
async fn test_empty_catalog_uses_fallback() {
    let used = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&used);
    let resolver = Resolver::new(
        InMemoryCatalog::new(),
        ResolverConfig::builder()
            .environment(StaticEnv::new().with("EMBEDDED_URL", "postgresql://embedded"))
            .fallback(table())
            .on_fallback(move |service| {
                assert_eq!(service, "db");
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .build(),
    );

    let strategy = resolver.resolve("db", ResolveOptions::new()).await.unwrap();
    assert_eq!(strategy.method_name, "embedded-url");
    assert_eq!(used.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unreachable_catalog_uses_fallback() {
    let catalog = FlakyCatalog::new(db_catalog());
    catalog.set_failing(true);

    let resolver = Resolver::new(
        Arc::clone(&catalog),
        ResolverConfig::builder()
            .environment(StaticEnv::new().with("EMBEDDED_URL", "postgresql://embedded"))
            .fallback(table())
            .build(),
    );

    let strategy = resolver.resolve("db", ResolveOptions::new()).await.unwrap();
    assert_eq!(strategy.method_name, "embedded-url");
}

#[tokio::test]
async fn test_fallback_is_not_merged_with_catalog() {
    let resolver = Resolver::new(
        db_catalog(),
        ResolverConfig::builder()
            .environment(StaticEnv::new().with("EMBEDDED_URL", "postgresql://embedded"))
            .fallback(table())
            .build(),
    );

    // Catalog has entries but none are available; the fallback entry must
    // not be consulted.
    assert!(resolver.resolve("db", ResolveOptions::new()).await.is_none());

    let methods: Vec<_> = resolver
        .list_candidates("db")
        .await
        .into_iter()
        .map(|c| c.method_name)
        .collect();
    assert_eq!(methods, vec!["a", "b"]);
}

#[tokio::test]
async fn test_unknown_service_without_fallback_is_none() {
    let resolver = Resolver::new(
        InMemoryCatalog::new(),
        ResolverConfig::builder()
            .environment(StaticEnv::new())
            .fallback(table())
            .build(),
    );

    let selection = resolver.select("queue", ResolveOptions::new()).await;
    assert!(selection.selected.is_none());
    assert!(selection.skipped.is_empty());
}

#[tokio::test]
async fn test_builtin_database_fallback() {
    let resolver = Resolver::new(
        InMemoryCatalog::new(),
        ResolverConfig::builder()
            .environment(StaticEnv::new().with("DATABASE_PASSWORD", "hunter2"))
            .build(),
    );

    let selection = resolver.select("database", ResolveOptions::new()).await;
    let strategy = selection.selected.unwrap();
    assert_eq!(strategy.method_name, "direct-password");
    assert_eq!(strategy.connection_type, ConnectionType::RawProtocolClient);
    assert_eq!(selection.skipped.len(), 1);
    assert_eq!(selection.skipped[0].method, "pooled-url");
}
