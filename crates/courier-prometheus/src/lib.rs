// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prometheus metrics adapter for the Courier sync engine.
//!
//! Uses the metrics-rs facade with the Prometheus exporter. Metrics are
//! rendered as Prometheus text format via [`PrometheusAdapter::render`].

pub mod recording;

use async_trait::async_trait;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use courier_core::{AdapterType, CourierError, HealthStatus, PluginAdapter};

pub use recording::{
    record_cache_read, record_flush, record_terminal_failures, register_metrics,
    set_live_channels, set_pending_operations,
};

/// Prometheus metrics adapter.
///
/// Installs the Prometheus recorder and exposes a handle for rendering
/// metrics in Prometheus text format.
pub struct PrometheusAdapter {
    handle: PrometheusHandle,
}

impl PrometheusAdapter {
    /// Installs the Prometheus recorder globally.
    ///
    /// Only one recorder can be installed per process. Returns an error if a
    /// recorder is already installed.
    pub fn install() -> Result<Self, CourierError> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            CourierError::Internal(format!("failed to install Prometheus recorder: {e}"))
        })?;

        recording::register_metrics();

        tracing::info!("prometheus metrics recorder installed");

        Ok(Self { handle })
    }

    /// Wraps an existing handle, e.g. from a recorder built by the host application.
    pub fn from_handle(handle: PrometheusHandle) -> Self {
        Self { handle }
    }

    pub fn handle(&self) -> &PrometheusHandle {
        &self.handle
    }

    /// Render all collected metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

#[async_trait]
impl PluginAdapter for PrometheusAdapter {
    fn name(&self) -> &str {
        "prometheus"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Observability
    }

    async fn health_check(&self) -> Result<HealthStatus, CourierError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), CourierError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    // The global recorder can only be installed once per process, so tests
    // record through a local one.
    fn render_with<F: FnOnce()>(f: F) -> String {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, f);
        PrometheusAdapter::from_handle(handle).render()
    }

    #[test]
    fn flush_metrics_are_rendered() {
        let out = render_with(|| {
            record_flush(5, Duration::from_millis(12), true);
            record_flush(3, Duration::from_millis(40), false);
        });
        assert!(out.contains("courier_messages_persisted_total 5"));
        assert!(out.contains("courier_batch_failures_total 1"));
        assert!(out.contains("courier_batch_size"));
    }

    #[test]
    fn cache_reads_are_labelled() {
        let out = render_with(|| {
            record_cache_read("messages_recent", true, Duration::from_millis(1));
            record_cache_read("messages_recent", false, Duration::from_millis(30));
        });
        assert!(out.contains("query_type=\"messages_recent\""));
        assert!(out.contains("outcome=\"hit\""));
        assert!(out.contains("outcome=\"miss\""));
    }

    #[test]
    fn gauges_are_rendered() {
        let out = render_with(|| {
            set_live_channels(3);
            set_pending_operations(2);
        });
        assert!(out.contains("courier_live_channels 3"));
        assert!(out.contains("courier_pending_operations 2"));
    }

    #[tokio::test]
    async fn adapter_identity() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let adapter = PrometheusAdapter::from_handle(recorder.handle());
        assert_eq!(adapter.name(), "prometheus");
        assert_eq!(adapter.adapter_type(), AdapterType::Observability);
        assert_eq!(adapter.health_check().await.unwrap(), HealthStatus::Healthy);
    }
}
