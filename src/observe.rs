//! Observability hook called by the engine at well-defined points.
//!
//! The engine never prints; it emits [`EngineEvent`]s to an [`Observer`].
//! [`TracingObserver`] turns them into `tracing` events and `metrics` series.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use metrics::{counter, gauge, histogram};

use crate::sources::{ReadingStatus, SourceKind};

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    CacheHit {
        source: SourceKind,
        entity: String,
    },
    CacheMiss {
        source: SourceKind,
        entity: String,
    },
    SourceFetched {
        source: SourceKind,
        entity: String,
        status: ReadingStatus,
        attempts: u32,
        elapsed: Duration,
    },
    CyclePublished {
        cycle: u64,
        published: usize,
        excluded: usize,
        deadline_hit: bool,
        elapsed: Duration,
    },
    CycleAborted {
        reason: &'static str,
        elapsed: Duration,
    },
}

pub trait Observer: Send + Sync {
    fn on_event(&self, event: &EngineEvent);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl Observer for NoopObserver {
    fn on_event(&self, _event: &EngineEvent) {}
}

/// Logs every event and records the engine's Prometheus series.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl TracingObserver {
    pub fn new() -> Self {
        crate::metrics::ensure_metrics_described();
        Self
    }
}

impl Observer for TracingObserver {
    fn on_event(&self, event: &EngineEvent) {
        match event {
            EngineEvent::CacheHit { source, entity } => {
                tracing::debug!(target: "cache", %source, %entity, "cache hit");
                counter!("cache_hits_total", "source" => source.as_str()).increment(1);
            }
            EngineEvent::CacheMiss { source, entity } => {
                tracing::debug!(target: "cache", %source, %entity, "cache miss");
                counter!("cache_misses_total", "source" => source.as_str()).increment(1);
            }
            EngineEvent::SourceFetched {
                source,
                entity,
                status,
                attempts,
                elapsed,
            } => {
                let ms = elapsed.as_secs_f64() * 1_000.0;
                match status {
                    ReadingStatus::Failed(kind) => tracing::warn!(
                        target: "source",
                        %source, %entity, attempts, ms, reason = kind.as_str(),
                        "source fetch failed"
                    ),
                    _ => tracing::debug!(
                        target: "source",
                        %source, %entity, attempts, ms, status = status.as_str(),
                        "source fetched"
                    ),
                }
                counter!(
                    "source_fetch_total",
                    "source" => source.as_str(),
                    "status" => status.as_str()
                )
                .increment(1);
                histogram!("source_fetch_ms", "source" => source.as_str()).record(ms);
            }
            EngineEvent::CyclePublished {
                cycle,
                published,
                excluded,
                deadline_hit,
                elapsed,
            } => {
                tracing::info!(
                    target: "engine",
                    cycle, published, excluded, deadline_hit,
                    secs = elapsed.as_secs_f64(),
                    "cycle published"
                );
                counter!("cycle_published_total").increment(1);
                gauge!("cycle_entities_published").set(*published as f64);
                gauge!("cycle_last_published_ts").set(chrono::Utc::now().timestamp() as f64);
            }
            EngineEvent::CycleAborted { reason, elapsed } => {
                tracing::warn!(
                    target: "engine",
                    reason, secs = elapsed.as_secs_f64(),
                    "cycle aborted; previous batch kept"
                );
                counter!("cycle_aborted_total", "reason" => *reason).increment(1);
            }
        }
    }
}

/// Keeps every event in memory. Handy in tests and for embedding diagnostics.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<EngineEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EngineEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self, pred: impl Fn(&EngineEvent) -> bool) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| pred(e))
            .count()
    }
}

impl Observer for RecordingObserver {
    fn on_event(&self, event: &EngineEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}
