// src/scheduler.rs
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::coordinator::CycleReport;
use crate::engine::Engine;
use crate::export;

#[derive(Clone, Debug)]
pub struct SchedulerCfg {
    pub interval: Duration,
    /// Rewritten after every published cycle when set.
    pub export_path: Option<PathBuf>,
}

/// One cycle, then the export if the cycle published. Export failures are logged.
pub async fn run_cycle(engine: &Engine, export_path: Option<&PathBuf>) -> CycleReport {
    let report = engine.collect_cycle().await;
    if let (true, Some(path)) = (report.is_published(), export_path) {
        let rows = engine.rows();
        let target = path.clone();
        let written =
            tokio::task::spawn_blocking(move || export::write_csv_file(&target, &rows)).await;
        match written {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(target: "engine", error = ?e, path = %path.display(), "export failed")
            }
            Err(e) => {
                tracing::warn!(target: "engine", error = ?e, path = %path.display(), "export task failed")
            }
        }
    }
    report
}

/// Spawn the periodic driver. The first cycle starts immediately; a slow cycle
/// delays the next tick instead of stacking cycles.
pub fn spawn_cycle_scheduler(engine: Arc<Engine>, cfg: SchedulerCfg) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(cfg.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let report = run_cycle(&engine, cfg.export_path.as_ref()).await;
            tracing::info!(
                target: "engine",
                outcome = ?report.outcome,
                published = report.published,
                excluded = report.excluded.len(),
                deadline_hit = report.deadline_hit,
                "scheduled cycle finished"
            );
        }
    })
}
