// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-tenant webhook configuration and best-effort delivery.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use tracing::{debug, error, warn};

use switchboard_config::model::WebhookConfig as DeliverySettings;
use switchboard_core::types::{WebhookConfig, WebhookEvent, event_types};
use switchboard_core::{
    AdapterType, EventSink, HealthStatus, PluginAdapter, SwitchboardError, WebhookStore,
};

use crate::signing;

/// Signs, filters and POSTs tenant events to their configured endpoint.
///
/// Holds no per-tenant state; every send re-reads the tenant's config.
#[derive(Clone)]
pub struct WebhookDispatcher {
    store: Arc<dyn WebhookStore>,
    client: reqwest::Client,
    signature_header: String,
}

impl WebhookDispatcher {
    pub fn new(
        store: Arc<dyn WebhookStore>,
        settings: &DeliverySettings,
    ) -> Result<Self, SwitchboardError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|e| SwitchboardError::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            store,
            client,
            signature_header: settings.signature_header.clone(),
        })
    }

    /// Replaces the tenant's configuration.
    ///
    /// An empty event list defaults to message, status and receipt. Explicitly
    /// set configs are always enabled.
    pub async fn set_config(
        &self,
        mut config: WebhookConfig,
    ) -> Result<WebhookConfig, SwitchboardError> {
        if config.instance_id.trim().is_empty() {
            return Err(SwitchboardError::Validation(
                "instance_id is required".to_string(),
            ));
        }
        if config.url.trim().is_empty() {
            return Err(SwitchboardError::Validation("url is required".to_string()));
        }
        if config.events.is_empty() {
            config.events = event_types::DEFAULTS.iter().map(|e| e.to_string()).collect();
        }
        config.enabled = true;

        self.store.upsert_webhook(&config).await?;
        debug!(instance_id = %config.instance_id, url = %config.url, "webhook configured");
        self.get_config(&config.instance_id).await
    }

    pub async fn get_config(&self, instance_id: &str) -> Result<WebhookConfig, SwitchboardError> {
        self.store
            .get_webhook(instance_id)
            .await?
            .ok_or_else(|| SwitchboardError::NotFound(format!("webhook for {instance_id}")))
    }

    pub async fn delete_config(&self, instance_id: &str) -> Result<(), SwitchboardError> {
        self.store.delete_webhook(instance_id).await
    }

    /// Delivers one event.
    ///
    /// Silently skips tenants without a config, with a disabled config, or
    /// not subscribed to the event. A non-2xx answer is logged only; a
    /// transport failure is returned as transient.
    pub async fn send(
        &self,
        instance_id: &str,
        mut event: WebhookEvent,
    ) -> Result<(), SwitchboardError> {
        let config = match self.store.get_webhook(instance_id).await {
            Ok(Some(config)) => config,
            Ok(None) => {
                debug!(instance_id, "no webhook configured");
                return Ok(());
            }
            Err(e) => {
                debug!(instance_id, error = %e, "webhook config lookup failed");
                return Ok(());
            }
        };

        if !config.enabled || !config.subscribes_to(&event.event) {
            return Ok(());
        }

        event.instance_id = instance_id.to_string();
        event.timestamp = chrono::Utc::now().timestamp();

        let body = serde_json::to_vec(&event)
            .map_err(|e| SwitchboardError::Internal(format!("encode webhook event: {e}")))?;

        let mut request = self
            .client
            .post(&config.url)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(secret) = config.secret.as_deref().filter(|s| !s.is_empty()) {
            let signature = signing::sign(&body, secret)?;
            request = request.header(self.signature_header.as_str(), signature);
        }

        let started = Instant::now();
        let response = request.body(body).send().await;
        let elapsed = started.elapsed().as_secs_f64();

        match response {
            Ok(response) if response.status().as_u16() >= 400 => {
                switchboard_prometheus::record_webhook(&event.event, "rejected", elapsed);
                warn!(
                    instance_id,
                    url = %config.url,
                    status = %response.status(),
                    event = %event.event,
                    "webhook endpoint returned an error"
                );
                Ok(())
            }
            Ok(_) => {
                switchboard_prometheus::record_webhook(&event.event, "delivered", elapsed);
                debug!(instance_id, event = %event.event, "webhook delivered");
                Ok(())
            }
            Err(e) => {
                switchboard_prometheus::record_webhook(&event.event, "error", elapsed);
                error!(instance_id, url = %config.url, error = %e, "webhook delivery failed");
                Err(SwitchboardError::Transient {
                    message: format!("webhook delivery to {} failed: {e}", config.url),
                    source: Some(Box::new(e)),
                })
            }
        }
    }
}

#[async_trait]
impl EventSink for WebhookDispatcher {
    async fn send(&self, instance_id: &str, event: WebhookEvent) -> Result<(), SwitchboardError> {
        WebhookDispatcher::send(self, instance_id, event).await
    }
}

#[async_trait]
impl PluginAdapter for WebhookDispatcher {
    fn name(&self) -> &str {
        "webhook"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Webhook
    }

    async fn health_check(&self) -> Result<HealthStatus, SwitchboardError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), SwitchboardError> {
        Ok(())
    }
}
