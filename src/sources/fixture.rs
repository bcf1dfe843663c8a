//! In-process [`Upstream`] double with scripted answers, latency and failures.
//!
//! Used by the test suite and handy for dry runs without network access.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::types::{Fetched, SourceFields, SourceKind, Upstream};
use crate::error::SourceError;
use crate::registry::Entity;

pub struct FixtureUpstream {
    kind: SourceKind,
    answer: Result<SourceFields, SourceError>,
    per_entity: HashMap<String, Result<SourceFields, SourceError>>,
    latency: Duration,
    latency_for: HashMap<String, Duration>,
    issued_at: Option<DateTime<Utc>>,
    /// Error returned by the first N calls before `answer` is served.
    fail_first: AtomicU32,
    fail_first_err: Option<SourceError>,
    calls: AtomicU32,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl FixtureUpstream {
    fn with_answer(kind: SourceKind, answer: Result<SourceFields, SourceError>) -> Self {
        Self {
            kind,
            answer,
            per_entity: HashMap::new(),
            latency: Duration::ZERO,
            latency_for: HashMap::new(),
            issued_at: None,
            fail_first: AtomicU32::new(0),
            fail_first_err: None,
            calls: AtomicU32::new(0),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Always answers `fields`; the kind is taken from them.
    pub fn ok(fields: SourceFields) -> Self {
        Self::with_answer(fields.kind(), Ok(fields))
    }

    pub fn failing(kind: SourceKind, err: SourceError) -> Self {
        Self::with_answer(kind, Err(err))
    }

    /// Claim to be `kind` regardless of what the answers contain.
    pub fn reporting_as(mut self, kind: SourceKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_latency_for(mut self, entity: &str, latency: Duration) -> Self {
        self.latency_for.insert(key(entity), latency);
        self
    }

    pub fn with_issued_at(mut self, at: DateTime<Utc>) -> Self {
        self.issued_at = Some(at);
        self
    }

    pub fn failing_first(mut self, n: u32, err: SourceError) -> Self {
        self.fail_first = AtomicU32::new(n);
        self.fail_first_err = Some(err);
        self
    }

    pub fn failing_for(mut self, entity: &str, err: SourceError) -> Self {
        self.per_entity.insert(key(entity), Err(err));
        self
    }

    pub fn with_fields_for(mut self, entity: &str, fields: SourceFields) -> Self {
        self.per_entity.insert(key(entity), Ok(fields));
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of concurrent `request` calls observed.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn take_scripted_failure(&self) -> Option<SourceError> {
        let err = self.fail_first_err.as_ref()?;
        self.fail_first
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .ok()
            .map(|_| err.clone())
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Upstream for FixtureUpstream {
    async fn request(&self, entity: &Entity) -> Result<Fetched, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let k = key(&entity.name);
        let latency = self.latency_for.get(&k).copied().unwrap_or(self.latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if let Some(err) = self.take_scripted_failure() {
            return Err(err);
        }
        let answer = self.per_entity.get(&k).unwrap_or(&self.answer).clone();
        answer.map(|fields| Fetched {
            fields,
            issued_at: self.issued_at,
        })
    }

    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn name(&self) -> &'static str {
        "fixture"
    }
}

fn key(entity: &str) -> String {
    entity.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::types::IncidentFields;

    #[tokio::test]
    async fn scripted_failures_then_answer() {
        let up = FixtureUpstream::ok(SourceFields::IncidentFeed(IncidentFields::default()))
            .failing_first(2, SourceError::RateLimited);
        let e = Entity::new("Kern", 35.4, -119.0);
        assert_eq!(up.request(&e).await, Err(SourceError::RateLimited));
        assert_eq!(up.request(&e).await, Err(SourceError::RateLimited));
        assert!(up.request(&e).await.is_ok());
        assert_eq!(up.calls(), 3);
        assert_eq!(up.peak_concurrency(), 1);
    }
}
