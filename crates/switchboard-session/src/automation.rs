// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tenant automation: auto-reply, auto-label, scheduled and bulk sends.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use switchboard_core::phone::normalize_phone;
use switchboard_core::types::{
    AutoReplyConfig, JobType, LabelRule, MatchType, ScheduledMessage, SettingKind,
};
use switchboard_core::{OutgoingMessage, SessionClient, SwitchboardError};

use crate::manager::{InstanceManager, ManagerState};

const DEFAULT_MIN_DELAY_MS: u64 = 2000;
const DEFAULT_MAX_DELAY_MS: u64 = 5000;

/// Body of a bulk-send request.
#[derive(Debug, Clone, Deserialize)]
pub struct BulkRequest {
    pub recipients: Vec<String>,
    pub message: String,
    #[serde(default)]
    pub min_delay_ms: Option<u64>,
    #[serde(default)]
    pub max_delay_ms: Option<u64>,
}

/// Acknowledgement of an accepted bulk send.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkJob {
    pub job_id: String,
    pub total_recipients: usize,
    pub status: String,
}

/// Whether `text` triggers the auto-reply rule.
pub fn auto_reply_matches(config: &AutoReplyConfig, text: &str) -> bool {
    if !config.enabled {
        return false;
    }
    if config.trigger_keywords.is_empty() {
        return true;
    }

    let text = text.trim().to_lowercase();
    config.trigger_keywords.iter().any(|keyword| {
        let keyword = keyword.trim().to_lowercase();
        match config.match_type {
            MatchType::Exact => text == keyword,
            MatchType::StartsWith => text.starts_with(&keyword),
            MatchType::Contains => text.contains(&keyword),
        }
    })
}

/// Labels whose keywords appear in `text`, case-insensitively.
pub fn matching_labels<'a>(rules: &'a [LabelRule], text: &str) -> Vec<&'a str> {
    let text = text.to_lowercase();
    rules
        .iter()
        .filter(|rule| {
            rule.keywords
                .iter()
                .any(|keyword| !keyword.is_empty() && text.contains(&keyword.to_lowercase()))
        })
        .map(|rule| rule.label_id.as_str())
        .collect()
}

/// Evaluates label and auto-reply rules for one inbound message, detached.
pub(crate) fn spawn_rules(
    state: &Arc<ManagerState>,
    instance_id: &str,
    client: Arc<dyn SessionClient>,
    chat: &str,
    text: &str,
) {
    if text.trim().is_empty() {
        return;
    }

    let task_state = state.clone();
    let label_client = client.clone();
    let (id, label_chat, label_text) = (instance_id.to_string(), chat.to_string(), text.to_string());
    state.tasks.spawn("auto_label", async move {
        let rules: Vec<LabelRule> = task_state.setting(&id, SettingKind::LabelRules).await?;
        let timeout = Duration::from_secs(task_state.config.label_timeout_secs);
        for label_id in matching_labels(&rules, &label_text) {
            match tokio::time::timeout(timeout, label_client.label_chat(&label_chat, label_id)).await
            {
                Ok(Ok(())) => debug!(instance_id = %id, label_id, "chat labelled"),
                Ok(Err(e)) => warn!(instance_id = %id, label_id, error = %e, "labelling failed"),
                Err(_) => warn!(instance_id = %id, label_id, "labelling timed out"),
            }
        }
        Ok(())
    });

    let task_state = state.clone();
    let (id, chat, text) = (instance_id.to_string(), chat.to_string(), text.to_string());
    state.tasks.spawn("auto_reply", async move {
        let config: AutoReplyConfig = task_state.setting(&id, SettingKind::AutoReply).await?;
        if config.message.trim().is_empty() || !auto_reply_matches(&config, &text) {
            return Ok(());
        }

        tokio::time::sleep(Duration::from_millis(task_state.config.auto_reply_delay_ms)).await;
        client
            .send_message(&chat, OutgoingMessage::Text { body: config.message })
            .await?;
        info!(instance_id = %id, chat = %chat, "auto-reply sent");
        Ok(())
    });
}

/// Per-tenant automation settings and bulk operations.
#[derive(Clone)]
pub struct AutomationService {
    manager: InstanceManager,
}

impl AutomationService {
    pub fn new(manager: InstanceManager) -> Self {
        Self { manager }
    }

    pub async fn set_auto_reply(
        &self,
        instance_id: &str,
        config: AutoReplyConfig,
    ) -> Result<AutoReplyConfig, SwitchboardError> {
        self.manager.require_instance(instance_id).await?;
        if config.enabled && config.message.trim().is_empty() {
            return Err(SwitchboardError::Validation(
                "message is required when auto-reply is enabled".to_string(),
            ));
        }

        self.manager
            .state()
            .put_setting(instance_id, SettingKind::AutoReply, &config)
            .await?;
        Ok(config)
    }

    pub async fn get_auto_reply(
        &self,
        instance_id: &str,
    ) -> Result<AutoReplyConfig, SwitchboardError> {
        self.manager.require_instance(instance_id).await?;
        self.manager
            .state()
            .setting(instance_id, SettingKind::AutoReply)
            .await
    }

    /// Replaces the tenant's label rules.
    pub async fn set_label_rules(
        &self,
        instance_id: &str,
        rules: Vec<LabelRule>,
    ) -> Result<Vec<LabelRule>, SwitchboardError> {
        self.manager.require_instance(instance_id).await?;
        for rule in &rules {
            if rule.label_id.trim().is_empty() {
                return Err(SwitchboardError::Validation(
                    "label_id is required".to_string(),
                ));
            }
            if rule.keywords.iter().all(|k| k.trim().is_empty()) {
                return Err(SwitchboardError::Validation(format!(
                    "label {} needs at least one keyword",
                    rule.label_id
                )));
            }
        }

        self.manager
            .state()
            .put_setting(instance_id, SettingKind::LabelRules, &rules)
            .await?;
        Ok(rules)
    }

    pub async fn get_label_rules(
        &self,
        instance_id: &str,
    ) -> Result<Vec<LabelRule>, SwitchboardError> {
        self.manager.require_instance(instance_id).await?;
        self.manager
            .state()
            .setting(instance_id, SettingKind::LabelRules)
            .await
    }

    /// Stores a text message for delivery at `execute_at` (Unix seconds).
    pub async fn schedule_message(
        &self,
        instance_id: &str,
        phone: &str,
        message: &str,
        execute_at: i64,
    ) -> Result<ScheduledMessage, SwitchboardError> {
        self.manager.require_instance(instance_id).await?;
        let phone = normalize_phone(phone)?;
        if message.trim().is_empty() {
            return Err(SwitchboardError::Validation("message is required".to_string()));
        }
        if execute_at <= chrono::Utc::now().timestamp() {
            return Err(SwitchboardError::Validation(
                "execute_at must be in the future".to_string(),
            ));
        }

        let scheduled = ScheduledMessage {
            id: uuid::Uuid::new_v4().to_string(),
            instance_id: instance_id.to_string(),
            phone,
            message: message.to_string(),
            execute_at,
        };
        self.manager
            .state()
            .store
            .add_scheduled(&scheduled)
            .await?;
        info!(instance_id, id = %scheduled.id, execute_at, "message scheduled");
        Ok(scheduled)
    }

    /// Sends one text to every recipient with a random pause between sends.
    ///
    /// Returns as soon as the job is accepted; delivery happens detached and
    /// per-recipient failures are only logged.
    pub async fn bulk_send(
        &self,
        instance_id: &str,
        request: BulkRequest,
    ) -> Result<BulkJob, SwitchboardError> {
        let client = self.manager.require_client(instance_id).await?;
        if !client.is_logged_in() {
            return Err(SwitchboardError::Unauthenticated(format!(
                "instance {instance_id} is not logged in"
            )));
        }
        if request.recipients.is_empty() {
            return Err(SwitchboardError::Validation(
                "recipients must not be empty".to_string(),
            ));
        }
        if request.message.trim().is_empty() {
            return Err(SwitchboardError::Validation("message is required".to_string()));
        }

        let min_delay = request.min_delay_ms.unwrap_or(DEFAULT_MIN_DELAY_MS);
        let max_delay = request.max_delay_ms.unwrap_or(DEFAULT_MAX_DELAY_MS).max(min_delay);
        let job = BulkJob {
            job_id: uuid::Uuid::new_v4().to_string(),
            total_recipients: request.recipients.len(),
            status: "processing".to_string(),
        };

        let manager = self.manager.clone();
        let instance_id = instance_id.to_string();
        let job_id = job.job_id.clone();
        self.manager.tasks().spawn_unbounded("bulk_send", async move {
            let total = request.recipients.len();
            let mut sent = 0usize;
            for (index, recipient) in request.recipients.iter().enumerate() {
                let payload = serde_json::json!({"phone": recipient, "message": request.message});
                match manager.send(&instance_id, JobType::Text, &payload).await {
                    Ok(_) => sent += 1,
                    Err(e) => warn!(
                        instance_id = %instance_id,
                        job_id = %job_id,
                        recipient = %recipient,
                        error = %e,
                        "bulk send failed"
                    ),
                }

                if index + 1 < total {
                    let pause = rand::thread_rng().gen_range(min_delay..=max_delay);
                    tokio::time::sleep(Duration::from_millis(pause)).await;
                }
            }
            info!(instance_id = %instance_id, job_id = %job_id, sent, total, "bulk send finished");
        });

        Ok(job)
    }
}
