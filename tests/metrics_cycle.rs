// tests/metrics_cycle.rs
#![cfg(feature = "strict-metrics")]
use std::sync::Arc;

use wildfire_risk::metrics::install_prometheus;
use wildfire_risk::observe::TracingObserver;
use wildfire_risk::sources::{FixtureUpstream, SourceFields, SourceKind, WeatherFields};
use wildfire_risk::{Engine, Entity, EntityRegistry, SourceError};

#[tokio::test]
async fn metrics_exposed_after_cycle() {
    // Observer first: its one-time descriptions land on the no-op recorder.
    let observer = Arc::new(TracingObserver::new());
    let handle = install_prometheus(None).expect("recorder");

    let registry = EntityRegistry::from_entities(vec![
        Entity::new("Siskiyou", 41.5928, -122.5403),
        Entity::new("Trinity", 40.6507, -123.1126),
    ])
    .unwrap();
    let engine = Engine::builder(registry)
        .observer(observer)
        .upstream(Arc::new(FixtureUpstream::ok(SourceFields::Weather(
            WeatherFields {
                temperature_f: Some(80.0),
                ..WeatherFields::default()
            },
        ))))
        .upstream(Arc::new(FixtureUpstream::failing(
            SourceKind::Drought,
            SourceError::Http { status: 400 },
        )))
        .build();

    // Second cycle is served from cache for weather.
    assert!(engine.collect_cycle().await.is_published());
    assert!(engine.collect_cycle().await.is_published());

    // Scrape metrics text and check series presence by substring
    let out = handle.render();
    for needle in [
        "source_fetch_total",
        "source_fetch_ms",
        "cache_hits_total",
        "cache_misses_total",
        "cycle_published_total",
        "cycle_entities_published",
        "cycle_last_published_ts",
    ] {
        assert!(out.contains(needle), "missing {needle} in:\n{out}");
    }
    assert!(out.contains(r#"status="failed""#));
    assert!(
        out.contains("# HELP cache_hits_total Cache hits by source."),
        "descriptions missing in:\n{out}"
    );
    assert!(out.contains("# HELP source_fetch_total"));
}
