// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery loop for scheduled messages.

use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use switchboard_core::SwitchboardError;
use switchboard_core::types::JobType;

use crate::manager::InstanceManager;

/// Delivers due messages every `tick` until `cancel` fires.
pub async fn run_scheduler(manager: InstanceManager, tick: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(tick);
    // The first tick completes immediately.
    interval.tick().await;

    info!(tick_secs = tick.as_secs(), "scheduler started");
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let now = chrono::Utc::now().timestamp();
                if let Err(e) = deliver_due(&manager, now).await {
                    warn!(error = %e, "scheduled delivery pass failed");
                }
            }
            _ = cancel.cancelled() => {
                info!("scheduler shutting down");
                break;
            }
        }
    }
}

/// Sends every message due at `now`. Returns how many were attempted.
///
/// Entries for tenants that are not logged in stay queued for a later pass.
/// Attempted entries are removed whether or not the send succeeded.
pub async fn deliver_due(manager: &InstanceManager, now: i64) -> Result<usize, SwitchboardError> {
    let store = manager.state().store.clone();
    let due = store.due_scheduled(now).await?;
    let mut attempted = 0;

    for message in due {
        let ready = manager
            .client(&message.instance_id)
            .await
            .is_some_and(|client| client.is_logged_in());
        if !ready {
            debug!(instance_id = %message.instance_id, id = %message.id, "tenant offline, deferring");
            continue;
        }

        let payload = json!({"phone": message.phone, "message": message.message});
        match manager.send(&message.instance_id, JobType::Text, &payload).await {
            Ok(receipt) => info!(
                instance_id = %message.instance_id,
                id = %message.id,
                message_id = %receipt.message_id.0,
                "scheduled message sent"
            ),
            Err(e) => warn!(
                instance_id = %message.instance_id,
                id = %message.id,
                error = %e,
                "scheduled message failed"
            ),
        }

        store.remove_scheduled(&message.id).await?;
        attempted += 1;
    }

    Ok(attempted)
}
