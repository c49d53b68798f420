// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Logging and metrics setup for host applications.

use courier_core::CourierError;

/// Installs a global fmt subscriber.
///
/// `RUST_LOG` wins when set; otherwise courier crates log at `log_level` and
/// everything else at `warn`.
pub fn init_tracing(log_level: &str) -> Result<(), CourierError> {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("courier={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .try_init()
        .map_err(|e| CourierError::Internal(format!("failed to install tracing subscriber: {e}")))
}

/// Installs the Prometheus recorder if `[telemetry] prometheus` is on.
#[cfg(feature = "prometheus")]
pub fn init_metrics(
    config: &courier_config::TelemetryConfig,
) -> Result<Option<courier_prometheus::PrometheusAdapter>, CourierError> {
    if !config.prometheus {
        return Ok(None);
    }
    courier_prometheus::PrometheusAdapter::install().map(Some)
}
