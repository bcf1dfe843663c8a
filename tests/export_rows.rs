// tests/export_rows.rs
use std::sync::Arc;

use chrono::{TimeZone, Utc};

use wildfire_risk::clock::ManualClock;
use wildfire_risk::export::{self, CSV_COLUMNS};
use wildfire_risk::scheduler::run_cycle;
use wildfire_risk::sources::{
    DroughtFields, DroughtLevel, FixtureUpstream, SourceFields, SourceKind, WeatherFields,
};
use wildfire_risk::{Engine, Entity, EntityRegistry, SourceError};

async fn published_engine() -> Engine {
    let registry = EntityRegistry::from_entities(vec![
        Entity::new("Tuolumne", 38.0297, -119.9741),
        Entity::new("Calaveras", 38.2046, -120.5541),
    ])
    .unwrap();
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 7, 4, 16, 30, 0).unwrap(),
    ));
    let engine = Engine::builder(registry)
        .clock(clock)
        .upstream(Arc::new(FixtureUpstream::ok(SourceFields::Weather(
            WeatherFields {
                temperature_f: Some(94.0),
                wind_speed: Some("5 to 10 mph".into()),
                wind_direction: Some("W".into()),
                relative_humidity: None,
                conditions: Some("Sunny, then Haze".into()),
            },
        ))))
        .upstream(Arc::new(
            FixtureUpstream::ok(SourceFields::Drought(DroughtFields::new(
                DroughtLevel::Moderate,
            )))
            .failing_for("Calaveras", SourceError::Misconfigured("no FIPS".into())),
        ))
        .upstream(Arc::new(FixtureUpstream::failing(
            SourceKind::ActiveFire,
            SourceError::Misconfigured("NASA_FIRMS_API_KEY is not set".into()),
        )))
        .build();
    assert!(engine.collect_cycle().await.is_published());
    engine
}

#[tokio::test]
async fn csv_has_stable_columns_and_empty_unknowns() {
    let engine = published_engine().await;
    let rows = engine.rows();
    let csv = export::to_csv_string(&rows).unwrap();
    let mut lines = csv.lines();

    assert_eq!(lines.next(), Some(CSV_COLUMNS.join(",").as_str()));
    // Registry order, not alphabetical.
    assert_eq!(
        lines.next(),
        Some("Tuolumne,2025-07-04 16:30:00,94.0,5 to 10 mph,W,,\"Sunny, then Haze\",Moderate,,8,Very High")
    );
    assert_eq!(
        lines.next(),
        Some("Calaveras,2025-07-04 16:30:00,94.0,5 to 10 mph,W,,\"Sunny, then Haze\",Unknown,,7,High")
    );
    assert_eq!(lines.next(), None);
}

#[tokio::test]
async fn json_rows_use_nulls_and_display_labels() {
    let engine = published_engine().await;
    let json: serde_json::Value =
        serde_json::from_str(&export::to_json(&engine.rows()).unwrap()).unwrap();
    let first = &json[0];
    assert_eq!(first["county"], "Tuolumne");
    assert!(first["relative_humidity"].is_null());
    assert!(first["active_fires_nearby"].is_null());
    assert_eq!(first["fire_danger_level"], "Very High");
    assert_eq!(json[1]["drought_level"], "Unknown");

    let keys: Vec<&str> = first
        .as_object()
        .unwrap()
        .keys()
        .map(String::as_str)
        .collect();
    let mut expected: Vec<&str> = CSV_COLUMNS.to_vec();
    expected.sort_unstable();
    let mut got = keys.clone();
    got.sort_unstable();
    assert_eq!(got, expected);
}

#[tokio::test]
async fn file_export_replaces_previous_content() {
    let engine = published_engine().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out").join("fire_risk.csv");

    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "stale content\n").unwrap();

    export::write_csv_file(&path, &engine.rows()).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.starts_with("county,timestamp,"));
    assert_eq!(text.lines().count(), 3);
    assert!(!path.with_extension("csv.tmp").exists());
}

#[test]
fn empty_batch_still_writes_header() {
    let csv = export::to_csv_string(&[]).unwrap();
    assert_eq!(csv.trim_end(), CSV_COLUMNS.join(","));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scheduled_cycle_writes_export_off_the_runtime() {
    let engine = published_engine().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fire_risk.csv");

    let report = run_cycle(&engine, Some(&path)).await;
    assert!(report.is_published());
    assert_eq!(engine.store().snapshot().cycle, 2);

    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text.lines().count(), 3);
    assert!(text.lines().nth(1).unwrap().starts_with("Tuolumne,"));
}
