//! Process-level logging and metrics setup shared by the binaries

use crate::config::ObservabilityConfig;
use crate::errors::{AppError, Result};
use crate::metrics::{DECAY_BUCKETS, LATENCY_BUCKETS, METRICS_PREFIX};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. `RUST_LOG` wins over the configured level.
pub fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Serve Prometheus metrics on `metrics_port`; port 0 disables the exporter.
pub fn install_metrics_exporter(config: &ObservabilityConfig) -> Result<()> {
    if config.metrics_port == 0 {
        tracing::info!("Metrics exporter disabled");
        return Ok(());
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let exporter_error = |e: metrics_exporter_prometheus::BuildError| AppError::Configuration {
        message: format!("Failed to install metrics exporter: {}", e),
    };

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_recommendation_duration_seconds", METRICS_PREFIX)),
            LATENCY_BUCKETS,
        )
        .map_err(exporter_error)?
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_request_duration_seconds", METRICS_PREFIX)),
            LATENCY_BUCKETS,
        )
        .map_err(exporter_error)?
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_decay_duration_seconds", METRICS_PREFIX)),
            DECAY_BUCKETS,
        )
        .map_err(exporter_error)?
        .install()
        .map_err(exporter_error)?;

    tracing::info!(%addr, service = %config.service_name, "Metrics exporter listening");
    Ok(())
}
