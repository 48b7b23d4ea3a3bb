// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prometheus metrics adapter for the Switchboard gateway.
//!
//! Uses the metrics-rs facade with the Prometheus exporter.
//! Metrics are rendered as Prometheus text format via [`PrometheusAdapter::render`],
//! which the gateway exposes on `/metrics`.

pub mod recording;

use async_trait::async_trait;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use switchboard_core::{AdapterType, HealthStatus, PluginAdapter, SwitchboardError};

pub use recording::{
    record_event, record_job, record_rate_limited, record_webhook, set_instances,
    set_room_connections,
};

/// Prometheus metrics adapter.
///
/// Installs the Prometheus recorder and exposes a handle for rendering
/// metrics in Prometheus text format.
#[derive(Clone)]
pub struct PrometheusAdapter {
    handle: PrometheusHandle,
}

impl PrometheusAdapter {
    /// Installs the Prometheus recorder globally.
    ///
    /// Only one recorder can be installed per process; a second call errors.
    pub fn new() -> Result<Self, SwitchboardError> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            SwitchboardError::Internal(format!("failed to install Prometheus recorder: {e}"))
        })?;

        recording::register_metrics();

        tracing::info!("prometheus metrics recorder installed");

        Ok(Self { handle })
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

    async fn health_check(&self) -> Result<HealthStatus, SwitchboardError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), SwitchboardError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The global recorder can only be installed once per process, so these
    // tests use a local recorder.
    fn render_with(f: impl FnOnce()) -> String {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, f);
        handle.render()
    }

    #[test]
    fn job_outcomes_are_labelled() {
        let out = render_with(|| {
            record_job("sent");
            record_job("sent");
            record_job("dead_lettered");
        });
        assert!(out.contains(r#"switchboard_jobs_total{outcome="sent"} 2"#));
        assert!(out.contains(r#"switchboard_jobs_total{outcome="dead_lettered"} 1"#));
    }

    #[test]
    fn webhook_records_counter_and_latency() {
        let out = render_with(|| record_webhook("message", "delivered", 0.25));
        assert!(out.contains("switchboard_webhooks_total"));
        assert!(out.contains(r#"event="message""#));
        assert!(out.contains("switchboard_webhook_latency_seconds"));
    }

    #[test]
    fn gauges_take_latest_value() {
        let out = render_with(|| {
            set_instances(3);
            set_instances(2);
            set_room_connections(7);
        });
        assert!(out.contains("switchboard_instances 2"));
        assert!(out.contains("switchboard_room_connections 7"));
    }
}
