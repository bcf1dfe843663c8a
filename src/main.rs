//! Wildfire Risk Engine: binary entrypoint.
//! Loads config and the entity registry, then runs one cycle (`--once`) or the
//! cycle scheduler until Ctrl-C.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use wildfire_risk::scheduler::{run_cycle, spawn_cycle_scheduler, SchedulerCfg};
use wildfire_risk::{Engine, EngineConfig, EntityRegistry, RiskLevel};

/// Compact logs by default; `LOG_FORMAT=json` for structured output.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("wildfire_risk=info,warn"));
    let json = std::env::var("LOG_FORMAT")
        .ok()
        .is_some_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

fn load_registry(cfg: &EngineConfig) -> Result<EntityRegistry> {
    match &cfg.registry_path {
        Some(path) => EntityRegistry::load_from(path),
        None => Ok(EntityRegistry::california()),
    }
}

fn metrics_addr() -> Result<Option<SocketAddr>> {
    match std::env::var("METRICS_ADDR") {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("METRICS_ADDR is not a socket address: {raw}")),
        _ => Ok(None),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let once = std::env::args().skip(1).any(|a| a == "--once");

    let cfg = EngineConfig::load_default().context("loading engine config")?;
    let registry = load_registry(&cfg).context("loading entity registry")?;

    let _prometheus = wildfire_risk::metrics::install_prometheus(metrics_addr()?)?;

    let engine = Arc::new(Engine::from_config(&cfg, registry)?);
    let export_path: Option<PathBuf> = cfg.export_path.clone();

    if once {
        let report = run_cycle(&engine, export_path.as_ref()).await;
        let mut by_level: BTreeMap<RiskLevel, usize> = BTreeMap::new();
        for rec in engine.all().values() {
            *by_level.entry(rec.risk_level).or_default() += 1;
        }
        for (level, n) in by_level.iter().rev() {
            tracing::info!(level = %level, counties = n, "risk summary");
        }
        tracing::info!(
            outcome = ?report.outcome,
            published = report.published,
            excluded = report.excluded.len(),
            secs = report.elapsed.as_secs_f64(),
            "single cycle finished"
        );
        return Ok(());
    }

    let handle = spawn_cycle_scheduler(
        Arc::clone(&engine),
        SchedulerCfg {
            interval: cfg.interval(),
            export_path,
        },
    );
    tracing::info!(interval_secs = cfg.cycle.interval_secs, "scheduler started; Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;
    handle.abort();
    tracing::info!("shutting down");
    Ok(())
}
