use std::sync::OnceLock;

use anyhow::Context;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn default_filter(service_name: &str) -> String {
    format!("{service_name}=info,info")
}

/// Install the global subscriber. Events go to stderr so stdout stays free for
/// JSON reports. Keep the returned guard alive until exit to flush.
pub fn init_tracing(service_name: &str) -> WorkerGuard {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(service_name)));

    let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stderr());

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();

    guard
}

/// Install the Prometheus recorder once; later calls return the same handle.
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    if let Some(handle) = PROM_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("install prometheus recorder")?;

    let _ = PROM_HANDLE.set(handle.clone());
    Ok(handle)
}

/// Prometheus text exposition of everything recorded so far, if a recorder
/// was installed.
pub fn render_metrics() -> Option<String> {
    PROM_HANDLE.get().map(PrometheusHandle::render)
}
