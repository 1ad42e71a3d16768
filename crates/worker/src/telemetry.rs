//! Prometheus exporter.
//!
//! The exporter serves `/metrics` from its own listener; the worker has no
//! other HTTP surface.

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

use crate::config::MetricsConfig;

/// Installs the global recorder and starts the scrape listener.
///
/// Must run inside the Tokio runtime, before any metric is recorded.
pub fn init_metrics(config: &MetricsConfig) -> anyhow::Result<()> {
    if !config.enabled {
        info!("Metrics exporter disabled");
        return Ok(());
    }

    let addr = config.socket_addr()?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets(&config.buckets)?
        .install()?;

    info!(listen_addr = %addr, "Metrics exporter listening");
    Ok(())
}
