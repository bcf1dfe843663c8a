// tests/retry_backoff.rs
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use tokio::time::Instant;

use wildfire_risk::cache::MemoryCache;
use wildfire_risk::clock::{Clock, ManualClock};
use wildfire_risk::observe::NoopObserver;
use wildfire_risk::registry::Entity;
use wildfire_risk::sources::{
    DroughtFields, DroughtLevel, FixtureUpstream, ReadingStatus, RetryPolicy, SourceClient,
    SourceFields, SourceKind, WeatherFields,
};
use wildfire_risk::{FailureKind, SourceError};

fn weather() -> SourceFields {
    SourceFields::Weather(WeatherFields {
        temperature_f: Some(71.0),
        ..WeatherFields::default()
    })
}

fn client_for(upstream: Arc<FixtureUpstream>, clock: Arc<ManualClock>) -> SourceClient {
    SourceClient::new(
        upstream,
        Arc::new(MemoryCache::with_clock(clock.clone())),
        Duration::from_secs(3600),
        RetryPolicy::default(),
        clock,
        Arc::new(NoopObserver),
    )
}

fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 9, 3, 18, 0, 0).unwrap(),
    ))
}

fn placer() -> Entity {
    Entity::new("Placer", 39.0916, -120.8039)
}

#[tokio::test(start_paused = true)]
async fn rate_limits_back_off_then_succeed() {
    let up = Arc::new(FixtureUpstream::ok(weather()).failing_first(2, SourceError::RateLimited));
    let client = client_for(up.clone(), clock());

    let started = Instant::now();
    let r = client
        .fetch(&placer(), started + Duration::from_secs(120))
        .await;

    assert_eq!(r.status, ReadingStatus::Ok);
    assert_eq!(r.attempts, 3);
    assert_eq!(up.calls(), 3);
    // 1s after the first failure, 2s after the second.
    let waited = started.elapsed();
    assert!(waited >= Duration::from_secs(3) && waited < Duration::from_secs(4), "{waited:?}");
}

#[tokio::test(start_paused = true)]
async fn transient_failures_exhaust_three_attempts() {
    let up = Arc::new(FixtureUpstream::failing(
        SourceKind::Weather,
        SourceError::Transient("connection reset".into()),
    ));
    let client = client_for(up.clone(), clock());
    let r = client
        .fetch(&placer(), Instant::now() + Duration::from_secs(120))
        .await;
    assert_eq!(r.status, ReadingStatus::Failed(FailureKind::Transient));
    assert_eq!(r.attempts, 3);
    assert!(r.fields.is_none());
}

#[tokio::test(start_paused = true)]
async fn schema_errors_are_not_retried() {
    let up = Arc::new(FixtureUpstream::failing(
        SourceKind::Weather,
        SourceError::UpstreamSchema("periods missing".into()),
    ));
    let client = client_for(up.clone(), clock());
    let r = client
        .fetch(&placer(), Instant::now() + Duration::from_secs(120))
        .await;
    assert_eq!(r.status, ReadingStatus::Failed(FailureKind::UpstreamSchema));
    assert_eq!(up.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn backoff_never_crosses_the_deadline() {
    let up = Arc::new(FixtureUpstream::failing(
        SourceKind::Weather,
        SourceError::Transient("503".into()),
    ));
    let client = client_for(up.clone(), clock());
    let started = Instant::now();
    let r = client.fetch(&placer(), started + Duration::from_secs(2)).await;

    // Attempt 1 at t=0, sleep 1s, attempt 2 at t=1; a 2s backoff would overrun.
    assert_eq!(r.attempts, 2);
    assert_eq!(r.status, ReadingStatus::Failed(FailureKind::Transient));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn slow_upstream_times_out_per_call() {
    let up = Arc::new(FixtureUpstream::ok(weather()).with_latency(Duration::from_secs(30)));
    let client = client_for(up.clone(), clock());
    let r = client
        .fetch(&placer(), Instant::now() + Duration::from_secs(120))
        .await;
    assert_eq!(r.status, ReadingStatus::Failed(FailureKind::Timeout));
    assert_eq!(r.attempts, 3);
}

#[tokio::test(start_paused = true)]
async fn old_upstream_data_is_stale_and_not_cached() {
    let clock = clock();
    let issued = clock.now() - chrono::Duration::hours(13);
    let up = Arc::new(FixtureUpstream::ok(weather()).with_issued_at(issued));
    let client = client_for(up.clone(), clock);
    let deadline = Instant::now() + Duration::from_secs(120);

    let r = client.fetch(&placer(), deadline).await;
    assert_eq!(r.status, ReadingStatus::Stale);
    assert!(r.fields.is_some());

    let again = client.fetch(&placer(), deadline).await;
    assert!(!again.from_cache);
    assert_eq!(up.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn fields_of_the_wrong_kind_are_a_schema_failure() {
    let up = Arc::new(
        FixtureUpstream::ok(SourceFields::Drought(DroughtFields::new(DroughtLevel::Severe)))
            .reporting_as(SourceKind::Weather),
    );
    let client = client_for(up, clock());
    let r = client
        .fetch(&placer(), Instant::now() + Duration::from_secs(120))
        .await;
    assert_eq!(r.status, ReadingStatus::Failed(FailureKind::UpstreamSchema));
}
