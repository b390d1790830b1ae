//! Serve-stale-on-error and TTL behaviour.

use super::{FlakyCatalog, db_catalog};
use connroute::{
    ConnectionType, FallbackTable, ResolveOptions, Resolver, ResolverConfig, StaticEnv, Strategy,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_stale_entries_survive_catalog_outage() {
    let catalog = FlakyCatalog::new(db_catalog());
    let stale_errors = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&stale_errors);

    let resolver = Resolver::new(
        Arc::clone(&catalog),
        ResolverConfig::builder()
            .cache_ttl(Duration::from_secs(300))
            .environment(StaticEnv::new().with("Y", "set"))
            .fallback(FallbackTable::new())
            .on_stale(move |service, error| {
                sink.lock().unwrap().push(format!("{}: {}", service, error));
            })
            .build(),
    );

    let first = resolver.resolve("db", ResolveOptions::new()).await.unwrap();
    assert_eq!(first.method_name, "b");

    catalog.set_failing(true);
    tokio::time::advance(Duration::from_secs(301)).await;

    let second = resolver.resolve("db", ResolveOptions::new()).await.unwrap();
    assert_eq!(second.method_name, "b");
    assert_eq!(catalog.fetches(), 2);

    let errors = stale_errors.lock().unwrap().clone();
    assert_eq!(
        errors,
        vec!["db: strategy catalog unavailable: connection refused"]
    );
    assert!(resolver.cache_status()["db"].stale);
}

#[tokio::test(start_paused = true)]
async fn test_fresh_entries_are_served_without_catalog() {
    let catalog = FlakyCatalog::new(db_catalog());
    let resolver = Resolver::new(
        Arc::clone(&catalog),
        ResolverConfig::builder()
            .cache_ttl(Duration::from_secs(300))
            .environment(StaticEnv::new().with("X", "set"))
            .build(),
    );

    for _ in 0..5 {
        resolver.resolve("db", ResolveOptions::new()).await;
        tokio::time::advance(Duration::from_secs(30)).await;
    }
    assert_eq!(catalog.fetches(), 1);

    tokio::time::advance(Duration::from_secs(200)).await;
    resolver.resolve("db", ResolveOptions::new()).await;
    assert_eq!(catalog.fetches(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_replaces_entry() {
    let catalog = FlakyCatalog::new(db_catalog());
    let resolver = Resolver::new(
        Arc::clone(&catalog),
        ResolverConfig::builder()
            .cache_ttl(Duration::from_secs(60))
            .environment(StaticEnv::new().with("X", "set").with("Z", "set"))
            .build(),
    );

    assert_eq!(
        resolver.resolve("db", ResolveOptions::new()).await.unwrap().method_name,
        "a"
    );

    catalog.inner.set_service(
        "db",
        vec![Strategy::new("db", "z", 1, ConnectionType::RawProtocolClient).with_env_var("Z")],
    );

    // Still cached.
    assert_eq!(
        resolver.resolve("db", ResolveOptions::new()).await.unwrap().method_name,
        "a"
    );

    tokio::time::advance(Duration::from_secs(60)).await;
    assert_eq!(
        resolver.resolve("db", ResolveOptions::new()).await.unwrap().method_name,
        "z"
    );
}

#[tokio::test(start_paused = true)]
async fn test_empty_refresh_replaces_populated_entry() {
    let catalog = FlakyCatalog::new(db_catalog());
    let resolver = Resolver::new(
        Arc::clone(&catalog),
        ResolverConfig::builder()
            .cache_ttl(Duration::from_secs(60))
            .environment(StaticEnv::new().with("X", "set"))
            .fallback(FallbackTable::new())
            .build(),
    );

    assert!(resolver.resolve("db", ResolveOptions::new()).await.is_some());

    catalog.inner.remove_service("db");
    tokio::time::advance(Duration::from_secs(60)).await;

    assert!(resolver.resolve("db", ResolveOptions::new()).await.is_none());
    assert_eq!(resolver.cache_status()["db"].count, 0);
}

#[tokio::test]
async fn test_resolvers_do_not_share_caches() {
    let catalog = FlakyCatalog::new(db_catalog());
    let config = || {
        ResolverConfig::builder()
            .environment(StaticEnv::new().with("X", "set"))
            .build()
    };

    let first = Resolver::new(Arc::clone(&catalog), config());
    let second = Resolver::new(Arc::clone(&catalog), config());

    first.resolve("db", ResolveOptions::new()).await;
    assert!(second.cache_status().is_empty());

    second.resolve("db", ResolveOptions::new()).await;
    assert_eq!(catalog.fetches(), 2);
}
