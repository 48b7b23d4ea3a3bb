// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Incoming-call policy.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{info, warn};

use switchboard_core::events::IncomingCall;
use switchboard_core::types::{CallSettings, SettingKind, WebhookEvent, event_types};
use switchboard_core::{OutgoingMessage, SwitchboardError};

use crate::manager::{InstanceManager, ManagerState};

/// Reads and writes call policy, and rejects calls on request.
#[derive(Clone)]
pub struct CallService {
    manager: InstanceManager,
}

impl CallService {
    pub fn new(manager: InstanceManager) -> Self {
        Self { manager }
    }

    pub async fn get_settings(&self, instance_id: &str) -> Result<CallSettings, SwitchboardError> {
        self.manager.require_instance(instance_id).await?;
        self.manager
            .state()
            .setting(instance_id, SettingKind::CallPolicy)
            .await
    }

    pub async fn set_settings(
        &self,
        instance_id: &str,
        settings: CallSettings,
    ) -> Result<CallSettings, SwitchboardError> {
        self.manager.require_client(instance_id).await?;
        self.manager
            .state()
            .put_setting(instance_id, SettingKind::CallPolicy, &settings)
            .await?;
        info!(
            instance_id,
            auto_reject = settings.auto_reject,
            "call policy updated"
        );
        Ok(settings)
    }

    pub async fn reject_call(
        &self,
        instance_id: &str,
        call_id: &str,
        from: &str,
    ) -> Result<(), SwitchboardError> {
        let client = self.manager.require_client(instance_id).await?;
        if !client.is_logged_in() {
            return Err(SwitchboardError::Unauthenticated(format!(
                "instance {instance_id} is not logged in"
            )));
        }
        client.reject_call(from, call_id).await
    }
}

/// Applies the tenant's call policy to `call` on the task runner.
///
/// A `call` webhook is always emitted, reporting `incoming` or `rejected`.
/// The auto-reply only goes out for calls the policy rejects. The reject
/// delay is not bounded by the task timeout; each I/O step is.
pub(crate) fn spawn_incoming(state: &Arc<ManagerState>, instance_id: &str, call: IncomingCall) {
    let task_state = state.clone();
    let instance_id = instance_id.to_string();
    state.tasks.spawn_steps("incoming_call", async move {
        let state = task_state;
        let settings: CallSettings = match state
            .tasks
            .bounded(
                "call_policy",
                state.setting::<CallSettings>(&instance_id, SettingKind::CallPolicy),
            )
            .await
        {
            Ok(settings) => settings,
            Err(e) => {
                warn!(instance_id = %instance_id, error = %e, "failed to load call policy");
                CallSettings::default()
            }
        };
        let client = state.client(&instance_id).await;

        let mut status = "incoming";
        if let Some(client) = client.filter(|_| settings.auto_reject) {
            tokio::time::sleep(Duration::from_secs(settings.reject_delay)).await;
            match state
                .tasks
                .bounded("call_reject", client.reject_call(&call.from, &call.call_id))
                .await
            {
                Ok(()) => {
                    status = "rejected";
                    info!(instance_id = %instance_id, call_id = %call.call_id, "call rejected");
                }
                Err(e) => warn!(instance_id = %instance_id, error = %e, "call reject failed"),
            }

            if settings.auto_reply_enabled && !settings.auto_reply_message.trim().is_empty() {
                tokio::time::sleep(Duration::from_millis(state.config.call_reply_delay_ms)).await;
                let reply = OutgoingMessage::Text {
                    body: settings.auto_reply_message.clone(),
                };
                if let Err(e) = state
                    .tasks
                    .bounded("call_reply", client.send_message(&call.from, reply))
                    .await
                {
                    warn!(instance_id = %instance_id, error = %e, "call auto-reply failed");
                }
            }
        }

        let event = WebhookEvent::new(
            event_types::CALL,
            json!({
                "call_id": call.call_id,
                "from": call.from,
                "timestamp": chrono::Utc::now().timestamp(),
                "is_video": call.is_video,
                "status": status,
            }),
        );
        state
            .tasks
            .bounded("call_webhook", state.sink.send(&instance_id, event))
            .await
    });
}
