use std::net::SocketAddr;

use anyhow::{Context, Result};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
///
/// Descriptions go to whichever recorder is installed at the time;
/// [`install_prometheus`] describes again against its own recorder.
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(describe_metrics);
}

/// Describe every series on the current recorder.
pub fn describe_metrics() {
    describe_counter!(
        "source_fetch_total",
        "Source fetches by source and terminal status."
    );
    describe_histogram!(
        "source_fetch_ms",
        "Source fetch time in milliseconds, retries and backoff included."
    );
    describe_counter!("cache_hits_total", "Cache hits by source.");
    describe_counter!("cache_misses_total", "Cache misses by source.");
    describe_counter!("cycle_published_total", "Cycles that published a batch.");
    describe_counter!(
        "cycle_aborted_total",
        "Cycles that published nothing, by reason."
    );
    describe_gauge!(
        "cycle_entities_published",
        "Entities in the most recent published batch."
    );
    describe_gauge!(
        "cycle_last_published_ts",
        "Unix ts when a batch was last published."
    );
}

/// Install the Prometheus recorder. With `listen`, also serve `/metrics` on that address.
pub fn install_prometheus(listen: Option<SocketAddr>) -> Result<PrometheusHandle> {
    let handle = match listen {
        Some(addr) => {
            let builder = PrometheusBuilder::new().with_http_listener(addr);
            let (recorder, exporter) = builder
                .build()
                .context("prometheus: build recorder + listener")?;
            let handle = recorder.handle();
            metrics::set_global_recorder(recorder)
                .map_err(|_| anyhow::anyhow!("prometheus: a global recorder is already installed"))?;
            tokio::spawn(async move {
                if let Err(e) = exporter.await {
                    tracing::warn!(error = ?e, "prometheus exporter stopped");
                }
            });
            handle
        }
        None => PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?,
    };
    describe_metrics();
    Ok(handle)
}
