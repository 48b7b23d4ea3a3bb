// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use switchboard_config::model::BridgeConfig;
use switchboard_core::{
    AdapterType, HealthStatus, PluginAdapter, SessionClient, SessionFactory, SwitchboardError,
};

use crate::client::BridgeClient;

#[derive(Deserialize)]
struct Restored {
    #[serde(default)]
    found: bool,
}

/// Hands out [`BridgeClient`]s that all talk to the same sidecar.
#[derive(Debug, Clone)]
pub struct BridgeFactory {
    config: BridgeConfig,
}

impl BridgeFactory {
    pub fn new(config: BridgeConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl PluginAdapter for BridgeFactory {
    fn name(&self) -> &str {
        "bridge"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Session
    }

    async fn health_check(&self) -> Result<HealthStatus, SwitchboardError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), SwitchboardError> {
        Ok(())
    }
}

#[async_trait]
impl SessionFactory for BridgeFactory {
    async fn create(&self, instance_id: &str) -> Result<Arc<dyn SessionClient>, SwitchboardError> {
        Ok(Arc::new(BridgeClient::new(instance_id, self.config.clone())))
    }

    async fn restore(
        &self,
        instance_id: &str,
        jid: &str,
    ) -> Result<Option<Arc<dyn SessionClient>>, SwitchboardError> {
        let client = BridgeClient::new(instance_id, self.config.clone()).with_identity(jid);
        let reply = client.request("restore", json!({ "jid": jid })).await?;
        let restored: Restored = serde_json::from_value(reply)
            .map_err(|e| SwitchboardError::Internal(format!("malformed restore reply: {e}")))?;

        if !restored.found {
            info!(instance_id, jid, "device record gone, tenant must pair again");
            client.close_link().await;
            return Ok(None);
        }
        Ok(Some(Arc::new(client)))
    }
}
