//! Fan-out coordinator: one task per (entity, source), bounded by a semaphore per
//! upstream, joined against a single cycle deadline, then merged, scored and published.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Datelike;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::clock::Clock;
use crate::error::FailureKind;
use crate::observe::{EngineEvent, Observer};
use crate::record::RiskRecord;
use crate::registry::EntityRegistry;
use crate::scoring::{self, MergedFields};
use crate::sources::{ReadingStatus, SourceClient, SourceKind, SourceReading};
use crate::store::ResultStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleConfig {
    /// Concurrent calls to any one upstream, across all entities.
    pub max_concurrency: usize,
    pub deadline: Duration,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            deadline: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    RegistryEmpty,
    /// The deadline fired before any entity had a weather reading.
    DeadlineExceeded,
    /// Every entity finished, but none had usable weather.
    NoEntityCompleted,
}

impl AbortReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AbortReason::RegistryEmpty => "registry_empty",
            AbortReason::DeadlineExceeded => "deadline_exceeded",
            AbortReason::NoEntityCompleted => "no_entity_completed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Published { cycle: u64 },
    Aborted(AbortReason),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub outcome: CycleOutcome,
    pub published: usize,
    /// Entities left out for lack of a usable weather reading.
    pub excluded: Vec<String>,
    /// Failed readings per source, deadline cut-offs included.
    pub failures: BTreeMap<SourceKind, usize>,
    pub deadline_hit: bool,
    pub elapsed: Duration,
}

impl CycleReport {
    pub fn is_published(&self) -> bool {
        matches!(self.outcome, CycleOutcome::Published { .. })
    }
}

pub struct Coordinator {
    registry: Arc<EntityRegistry>,
    clients: Vec<Arc<SourceClient>>,
    store: Arc<ResultStore>,
    clock: Arc<dyn Clock>,
    observer: Arc<dyn Observer>,
    cfg: CycleConfig,
}

impl Coordinator {
    pub fn new(
        registry: Arc<EntityRegistry>,
        clients: Vec<Arc<SourceClient>>,
        store: Arc<ResultStore>,
        clock: Arc<dyn Clock>,
        observer: Arc<dyn Observer>,
        cfg: CycleConfig,
    ) -> Self {
        Self {
            registry,
            clients,
            store,
            clock,
            observer,
            cfg,
        }
    }

    pub fn config(&self) -> CycleConfig {
        self.cfg
    }

    /// Run one collection cycle. Never fails; the report says what happened.
    pub async fn collect_cycle(&self) -> CycleReport {
        let started = Instant::now();
        let deadline = started + self.cfg.deadline;

        if self.registry.is_empty() {
            return self.abort(
                AbortReason::RegistryEmpty,
                false,
                started,
                Vec::new(),
                BTreeMap::new(),
            );
        }

        let (readings, deadline_hit) = self.run_tasks(deadline).await;

        let collected_at = self.clock.now();
        let month = collected_at.month();
        let mut records = Vec::with_capacity(self.registry.len());
        let mut excluded = Vec::new();
        let mut failures: BTreeMap<SourceKind, usize> = BTreeMap::new();

        for (entity, got) in self.registry.iter().zip(readings) {
            let mut sources = BTreeMap::new();
            for client in &self.clients {
                let kind = client.kind();
                let status = got
                    .iter()
                    .find(|r| r.source == kind)
                    .map(|r| r.status)
                    .unwrap_or(ReadingStatus::Failed(FailureKind::DeadlineExceeded));
                if let ReadingStatus::Failed(_) = status {
                    *failures.entry(kind).or_default() += 1;
                }
                sources.insert(kind, status);
            }

            let has_weather = sources
                .get(&SourceKind::Weather)
                .is_some_and(ReadingStatus::is_usable);
            if !has_weather {
                tracing::debug!(target: "engine", entity = %entity.name, "excluded: no usable weather");
                excluded.push(entity.name.clone());
                continue;
            }

            let fields = MergedFields::merge(&got);
            let assessment = scoring::score(&fields, month);
            records.push(RiskRecord::new(
                entity.name.clone(),
                collected_at,
                fields,
                assessment,
                sources,
            ));
        }

        if records.is_empty() {
            let reason = if deadline_hit {
                AbortReason::DeadlineExceeded
            } else {
                AbortReason::NoEntityCompleted
            };
            return self.abort(reason, deadline_hit, started, excluded, failures);
        }

        let published = records.len();
        let cycle = self.store.publish(records, collected_at);
        let elapsed = started.elapsed();
        self.observer.on_event(&EngineEvent::CyclePublished {
            cycle,
            published,
            excluded: excluded.len(),
            deadline_hit,
            elapsed,
        });
        CycleReport {
            outcome: CycleOutcome::Published { cycle },
            published,
            excluded,
            failures,
            deadline_hit,
            elapsed,
        }
    }

    /// Readings grouped by registry position, and whether the deadline cut the join short.
    ///
    /// Each upstream has its own pool of `max_concurrency` permits; a hanging source
    /// only queues its own tasks. Weather tasks are spawned first.
    async fn run_tasks(&self, deadline: Instant) -> (Vec<Vec<SourceReading>>, bool) {
        let mut clients: Vec<&Arc<SourceClient>> = self.clients.iter().collect();
        clients.sort_by_key(|c| c.kind() != SourceKind::Weather);

        let mut set = JoinSet::new();
        for client in clients {
            let pool = Arc::new(Semaphore::new(self.cfg.max_concurrency.max(1)));
            for (ix, entity) in self.registry.iter().enumerate() {
                let pool = Arc::clone(&pool);
                let client = Arc::clone(client);
                let entity = entity.clone();
                set.spawn(async move {
                    let _permit = pool.acquire_owned().await.ok()?;
                    Some((ix, client.fetch(&entity, deadline).await))
                });
            }
        }

        let mut grouped: Vec<Vec<SourceReading>> = vec![Vec::new(); self.registry.len()];
        let mut deadline_hit = false;
        loop {
            match tokio::time::timeout_at(deadline, set.join_next()).await {
                Ok(Some(Ok(Some((ix, reading))))) => grouped[ix].push(reading),
                Ok(Some(Ok(None))) => {}
                Ok(Some(Err(e))) => {
                    tracing::warn!(target: "engine", error = ?e, "source task did not complete");
                }
                Ok(None) => break,
                Err(_) => {
                    deadline_hit = true;
                    tracing::warn!(
                        target: "engine",
                        outstanding = set.len(),
                        "cycle deadline reached; abandoning outstanding tasks"
                    );
                    set.abort_all();
                    break;
                }
            }
        }
        (grouped, deadline_hit)
    }

    fn abort(
        &self,
        reason: AbortReason,
        deadline_hit: bool,
        started: Instant,
        excluded: Vec<String>,
        failures: BTreeMap<SourceKind, usize>,
    ) -> CycleReport {
        let elapsed = started.elapsed();
        self.observer.on_event(&EngineEvent::CycleAborted {
            reason: reason.as_str(),
            elapsed,
        });
        CycleReport {
            outcome: CycleOutcome::Aborted(reason),
            published: 0,
            excluded,
            failures,
            deadline_hit,
            elapsed,
        }
    }
}
