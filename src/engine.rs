//! # Risk Engine
//! One handle over the registry, the four source clients, the coordinator and the
//! result store. Readers (`record`, `all`, `records_at_or_above`) never block a cycle.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::cache::{CacheStore, FileCache, MemoryCache, TtlPolicy};
use crate::clock::{Clock, SystemClock};
use crate::config::{CacheBackend, EngineConfig};
use crate::coordinator::{Coordinator, CycleConfig, CycleReport};
use crate::error::EngineError;
use crate::observe::{NoopObserver, Observer, TracingObserver};
use crate::record::{RiskRecord, RiskRow};
use crate::registry::EntityRegistry;
use crate::sources::http::build_client;
use crate::sources::providers::{CalFireIncidents, FirmsActiveFire, NwsWeather, UsdmDrought};
use crate::sources::{RetryPolicy, SourceClient, Upstream};
use crate::store::ResultStore;

pub struct Engine {
    registry: Arc<EntityRegistry>,
    store: Arc<ResultStore>,
    coordinator: Coordinator,
}

impl Engine {
    pub fn builder(registry: EntityRegistry) -> EngineBuilder {
        EngineBuilder::new(registry)
    }

    /// Production wiring: real upstreams, configured cache, tracing + metrics observer.
    pub fn from_config(cfg: &EngineConfig, registry: EntityRegistry) -> Result<Self> {
        let up = &cfg.upstream;
        let client = build_client(&up.user_agent, cfg.retry_policy().call_timeout)
            .context("building HTTP client")?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let cache: Arc<dyn CacheStore> = match cfg.cache.backend {
            CacheBackend::Memory => Arc::new(MemoryCache::with_clock(Arc::clone(&clock))),
            CacheBackend::File => Arc::new(FileCache::with_clock(
                cfg.cache.dir.clone(),
                Arc::clone(&clock),
            )),
        };

        if up.firms_api_key.is_none() {
            tracing::warn!(
                target: "engine",
                "NASA_FIRMS_API_KEY not set; active-fire readings will fail as misconfigured"
            );
        }

        let upstreams: Vec<Arc<dyn Upstream>> = vec![
            Arc::new(NwsWeather::new(&up.nws_base_url, client.clone())),
            Arc::new(UsdmDrought::new(
                &up.usdm_base_url,
                client.clone(),
                Arc::clone(&clock),
            )),
            Arc::new(FirmsActiveFire::new(
                &up.firms_base_url,
                up.firms_api_key.clone(),
                &up.firms_source,
                up.firms_day_range,
                up.firms_radius_km,
                client.clone(),
            )),
            Arc::new(CalFireIncidents::new(&up.calfire_url, client)),
        ];

        tracing::info!(
            target: "engine",
            entities = registry.len(),
            cache = cache.backend(),
            max_concurrency = cfg.cycle.max_concurrency,
            deadline_secs = cfg.cycle.deadline_secs,
            "engine configured"
        );

        let mut builder = Engine::builder(registry)
            .cache(cache)
            .clock(clock)
            .observer(Arc::new(TracingObserver::new()))
            .ttl(cfg.ttl_policy())
            .retry(cfg.retry_policy())
            .cycle(cfg.cycle_config());
        for u in upstreams {
            builder = builder.upstream(u);
        }
        Ok(builder.build())
    }

    pub async fn collect_cycle(&self) -> CycleReport {
        self.coordinator.collect_cycle().await
    }

    /// `NotFound` for names outside the registry; `Ok(None)` for a known entity
    /// with nothing published yet.
    pub fn record(&self, name: &str) -> Result<Option<Arc<RiskRecord>>, EngineError> {
        let entity = self.registry.lookup(name)?;
        Ok(self.store.get(&entity.name))
    }

    pub fn all(&self) -> BTreeMap<String, Arc<RiskRecord>> {
        self.store.get_all()
    }

    pub fn records_at_or_above(&self, min_score: u8) -> Vec<Arc<RiskRecord>> {
        self.store.records_at_or_above(min_score)
    }

    /// Current batch as flat rows, in registry order.
    pub fn rows(&self) -> Vec<RiskRow> {
        let batch = self.store.snapshot();
        self.registry
            .iter()
            .filter_map(|e| batch.records.get(&e.name))
            .map(|r| r.to_row())
            .collect()
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    pub fn cycle_config(&self) -> CycleConfig {
        self.coordinator.config()
    }
}

/// Assembles an [`Engine`] from parts. Defaults: memory cache, system clock,
/// no-op observer, default TTL/retry/cycle settings, no upstreams.
pub struct EngineBuilder {
    registry: EntityRegistry,
    upstreams: Vec<Arc<dyn Upstream>>,
    cache: Option<Arc<dyn CacheStore>>,
    clock: Arc<dyn Clock>,
    observer: Arc<dyn Observer>,
    ttl: TtlPolicy,
    retry: RetryPolicy,
    cycle: CycleConfig,
}

impl EngineBuilder {
    fn new(registry: EntityRegistry) -> Self {
        Self {
            registry,
            upstreams: Vec::new(),
            cache: None,
            clock: Arc::new(SystemClock),
            observer: Arc::new(NoopObserver),
            ttl: TtlPolicy::default(),
            retry: RetryPolicy::default(),
            cycle: CycleConfig::default(),
        }
    }

    pub fn upstream(mut self, upstream: Arc<dyn Upstream>) -> Self {
        self.upstreams.push(upstream);
        self
    }

    pub fn cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    pub fn ttl(mut self, ttl: TtlPolicy) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn cycle(mut self, cycle: CycleConfig) -> Self {
        self.cycle = cycle;
        self
    }

    pub fn build(self) -> Engine {
        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(MemoryCache::with_clock(Arc::clone(&self.clock))));
        let clients: Vec<Arc<SourceClient>> = self
            .upstreams
            .into_iter()
            .map(|u| {
                let ttl = self.ttl.ttl_for(u.kind());
                Arc::new(SourceClient::new(
                    u,
                    Arc::clone(&cache),
                    ttl,
                    self.retry,
                    Arc::clone(&self.clock),
                    Arc::clone(&self.observer),
                ))
            })
            .collect();

        let registry = Arc::new(self.registry);
        let store = Arc::new(ResultStore::new());
        let coordinator = Coordinator::new(
            Arc::clone(&registry),
            clients,
            Arc::clone(&store),
            self.clock,
            self.observer,
            self.cycle,
        );
        Engine {
            registry,
            store,
            coordinator,
        }
    }
}
