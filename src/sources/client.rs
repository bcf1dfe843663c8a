//! Cache-first, retrying wrapper around one [`Upstream`].
//!
//! Every capability goes through the same client: cache lookup, per-call timeout,
//! exponential backoff on transient failures and rate limits, cache write on success.
//! The client never returns an error; failures become `Failed(kind)` readings.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use super::types::{Fetched, ReadingStatus, SourceKind, SourceReading, Upstream};
use crate::cache::{CacheKey, CacheStore};
use crate::clock::Clock;
use crate::error::{FailureKind, SourceError};
use crate::observe::{EngineEvent, Observer};
use crate::registry::Entity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts in total, first call included.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each further failure.
    pub base_delay: Duration,
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            call_timeout: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay after the `attempt`-th failed call (1-based): 1s, 2s, 4s, ...
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << shift)
    }
}

pub struct SourceClient {
    upstream: Arc<dyn Upstream>,
    cache: Arc<dyn CacheStore>,
    ttl: Duration,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
    observer: Arc<dyn Observer>,
}

impl SourceClient {
    pub fn new(
        upstream: Arc<dyn Upstream>,
        cache: Arc<dyn CacheStore>,
        ttl: Duration,
        retry: RetryPolicy,
        clock: Arc<dyn Clock>,
        observer: Arc<dyn Observer>,
    ) -> Self {
        Self {
            upstream,
            cache,
            ttl,
            retry,
            clock,
            observer,
        }
    }

    pub fn kind(&self) -> SourceKind {
        self.upstream.kind()
    }

    pub fn upstream_name(&self) -> &'static str {
        self.upstream.name()
    }

    /// Fetch this source for `entity`, giving up no later than `deadline`.
    pub async fn fetch(&self, entity: &Entity, deadline: Instant) -> SourceReading {
        let kind = self.kind();
        let key = CacheKey::new(kind, &entity.name);

        if let Some(fields) = self.cache.get(&key).await {
            self.observer.on_event(&EngineEvent::CacheHit {
                source: kind,
                entity: entity.name.clone(),
            });
            let reading = SourceReading {
                source: kind,
                entity: entity.name.clone(),
                fetched_at: self.clock.now(),
                fields: Some(fields),
                status: ReadingStatus::Ok,
                from_cache: true,
                attempts: 0,
            };
            self.report(&reading, Duration::ZERO);
            return reading;
        }
        self.observer.on_event(&EngineEvent::CacheMiss {
            source: kind,
            entity: entity.name.clone(),
        });

        let started = Instant::now();
        let (result, attempts) = self.request_with_retry(entity, deadline).await;
        let reading = match result {
            Ok(fetched) => self.accept(key, entity, fetched, attempts).await,
            Err(kind_failed) => SourceReading::failed(
                kind,
                &entity.name,
                self.clock.now(),
                kind_failed,
                attempts,
            ),
        };
        self.report(&reading, started.elapsed());
        reading
    }

    async fn request_with_retry(
        &self,
        entity: &Entity,
        deadline: Instant,
    ) -> (Result<Fetched, FailureKind>, u32) {
        let max = self.retry.max_attempts.max(1);
        let mut attempts = 0u32;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return (Err(FailureKind::DeadlineExceeded), attempts);
            }
            attempts += 1;
            let budget = self.retry.call_timeout.min(remaining);
            let outcome = match tokio::time::timeout(budget, self.upstream.request(entity)).await
            {
                Ok(r) => r,
                Err(_) => Err(SourceError::Timeout(budget)),
            };

            let err = match outcome {
                Ok(fetched) => return (Ok(fetched), attempts),
                Err(e) => e,
            };
            if !err.is_retryable() || attempts >= max {
                tracing::debug!(
                    target: "source",
                    source = %self.kind(), entity = %entity.name, attempts, error = %err,
                    "giving up"
                );
                return (Err(err.kind()), attempts);
            }

            let delay = self.retry.backoff(attempts);
            if Instant::now() + delay >= deadline {
                tracing::debug!(
                    target: "source",
                    source = %self.kind(), entity = %entity.name, attempts, error = %err,
                    "backoff would cross cycle deadline"
                );
                return (Err(err.kind()), attempts);
            }
            tracing::debug!(
                target: "source",
                source = %self.kind(), entity = %entity.name, attempts, ?delay, error = %err,
                "retrying after backoff"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Validate a successful answer, classify freshness and populate the cache.
    async fn accept(
        &self,
        key: CacheKey,
        entity: &Entity,
        fetched: Fetched,
        attempts: u32,
    ) -> SourceReading {
        let kind = self.kind();
        let now = self.clock.now();
        if fetched.fields.kind() != kind {
            tracing::warn!(
                target: "source",
                source = %kind, entity = %entity.name, got = %fetched.fields.kind(),
                "upstream returned fields of another source"
            );
            return SourceReading::failed(
                kind,
                &entity.name,
                now,
                FailureKind::UpstreamSchema,
                attempts,
            );
        }

        let stale = match (fetched.issued_at, kind.max_age()) {
            (Some(issued), Some(max_age)) => chrono::Duration::from_std(max_age)
                .map(|m| now.signed_duration_since(issued) > m)
                .unwrap_or(false),
            _ => false,
        };

        if !stale {
            if let Err(e) = self
                .cache
                .set(key, fetched.fields.clone(), self.ttl)
                .await
            {
                tracing::warn!(
                    target: "cache",
                    source = %kind, entity = %entity.name, backend = self.cache.backend(), error = %e,
                    "cache write failed"
                );
            }
        }

        SourceReading {
            source: kind,
            entity: entity.name.clone(),
            fetched_at: now,
            fields: Some(fetched.fields),
            status: if stale {
                ReadingStatus::Stale
            } else {
                ReadingStatus::Ok
            },
            from_cache: false,
            attempts,
        }
    }

    fn report(&self, reading: &SourceReading, elapsed: Duration) {
        self.observer.on_event(&EngineEvent::SourceFetched {
            source: reading.source,
            entity: reading.entity.clone(),
            status: reading.status,
            attempts: reading.attempts,
            elapsed,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_from_base() {
        let p = RetryPolicy::default();
        assert_eq!(p.backoff(1), Duration::from_secs(1));
        assert_eq!(p.backoff(2), Duration::from_secs(2));
        assert_eq!(p.backoff(3), Duration::from_secs(4));
    }
}
