// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! On-demand chat history sync.
//!
//! Each tenant has at most one progress record. A new run may start once
//! the previous one left `running`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use switchboard_core::types::{SyncOptions, SyncProgress, SyncStatus};
use switchboard_core::{SessionClient, SwitchboardError};

use crate::manager::InstanceManager;
use crate::media;

const DEFAULT_MAX_CHATS: usize = 20;
const DEFAULT_MESSAGES_PER_CHAT: usize = 50;

struct Run {
    id: String,
    progress: SyncProgress,
    cancel: CancellationToken,
}

type Runs = Arc<Mutex<HashMap<String, Run>>>;

fn lock(runs: &Runs) -> MutexGuard<'_, HashMap<String, Run>> {
    runs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn no_sync(instance_id: &str) -> SwitchboardError {
    SwitchboardError::NotFound(format!("no history sync for {instance_id}"))
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Starts, tracks and cancels history syncs.
#[derive(Clone)]
pub struct SyncService {
    manager: InstanceManager,
    runs: Runs,
}

impl SyncService {
    pub fn new(manager: InstanceManager) -> Self {
        Self {
            manager,
            runs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Starts a background sync and returns its initial progress.
    pub async fn start(
        &self,
        instance_id: &str,
        options: SyncOptions,
    ) -> Result<SyncProgress, SwitchboardError> {
        let client = self.manager.require_client(instance_id).await?;
        if !client.is_logged_in() {
            return Err(SwitchboardError::Unauthenticated(format!(
                "instance {instance_id} is not logged in"
            )));
        }

        let cancel = CancellationToken::new();
        let run_id = uuid::Uuid::new_v4().to_string();
        let progress = SyncProgress {
            instance_id: instance_id.to_string(),
            status: SyncStatus::Running,
            total_chats: 0,
            processed_chats: 0,
            total_messages: 0,
            synced_messages: 0,
            current_chat: None,
            started_at: now(),
            completed_at: None,
            error: None,
        };
        {
            let mut runs = lock(&self.runs);
            if runs
                .get(instance_id)
                .is_some_and(|run| run.progress.status == SyncStatus::Running)
            {
                return Err(SwitchboardError::Conflict(format!(
                    "a history sync is already running for {instance_id}"
                )));
            }
            runs.insert(
                instance_id.to_string(),
                Run {
                    id: run_id.clone(),
                    progress: progress.clone(),
                    cancel: cancel.clone(),
                },
            );
        }

        info!(
            instance_id,
            max_chats = options.max_chats,
            advanced = options.advanced,
            "history sync started"
        );
        let service = self.clone();
        let instance_id = instance_id.to_string();
        self.manager.tasks().spawn_unbounded("history_sync", async move {
            let result = tokio::select! {
                _ = cancel.cancelled() => Ok(()),
                result = service.walk(&instance_id, &run_id, client, &options) => result,
            };
            service.finish(&instance_id, &run_id, result);
        });

        Ok(progress)
    }

    /// Current progress of the tenant's latest sync.
    pub fn progress(&self, instance_id: &str) -> Result<SyncProgress, SwitchboardError> {
        lock(&self.runs)
            .get(instance_id)
            .map(|run| run.progress.clone())
            .ok_or_else(|| no_sync(instance_id))
    }

    /// Cancels a running sync.
    pub fn cancel(&self, instance_id: &str) -> Result<SyncProgress, SwitchboardError> {
        let mut runs = lock(&self.runs);
        let run = runs
            .get_mut(instance_id)
            .ok_or_else(|| no_sync(instance_id))?;
        if run.progress.status != SyncStatus::Running {
            return Err(SwitchboardError::Validation(format!(
                "history sync for {instance_id} is not running"
            )));
        }

        run.progress.status = SyncStatus::Cancelled;
        run.progress.completed_at = Some(now());
        run.cancel.cancel();
        info!(instance_id, "history sync cancelled");
        Ok(run.progress.clone())
    }

    /// Mutates the progress of run `run_id`, unless a newer run replaced it.
    fn update(&self, instance_id: &str, run_id: &str, apply: impl FnOnce(&mut SyncProgress)) {
        if let Some(run) = lock(&self.runs).get_mut(instance_id)
            && run.id == run_id
        {
            apply(&mut run.progress);
        }
    }

    async fn walk(
        &self,
        instance_id: &str,
        run_id: &str,
        client: Arc<dyn SessionClient>,
        options: &SyncOptions,
    ) -> Result<(), SwitchboardError> {
        let mut chats = client.list_chats().await?;
        let limit = match (options.max_chats, options.advanced) {
            (0, true) => chats.len(),
            (0, false) => DEFAULT_MAX_CHATS,
            (max, _) => max,
        };
        chats.truncate(limit);
        let per_chat = match options.messages_per_chat {
            0 => DEFAULT_MESSAGES_PER_CHAT,
            n => n,
        };
        self.update(instance_id, run_id, |p| p.total_chats = chats.len());

        let store = self.manager.state().store.clone();
        let own_jid = client.jid();
        for chat in chats {
            self.update(instance_id, run_id, |p| p.current_chat = Some(chat.clone()));

            let messages = client.chat_history(&chat, per_chat).await?;
            self.update(instance_id, run_id, |p| p.total_messages += messages.len());
            for message in &messages {
                let sender = crate::router::history_sender(message, own_jid.as_deref());
                let record = media::stored_message(instance_id, message, &chat, &sender, "history");
                if store.insert_message(&record).await? {
                    self.update(instance_id, run_id, |p| p.synced_messages += 1);
                }
            }

            self.update(instance_id, run_id, |p| p.processed_chats += 1);
        }
        Ok(())
    }

    fn finish(&self, instance_id: &str, run_id: &str, result: Result<(), SwitchboardError>) {
        self.update(instance_id, run_id, |p| {
            p.current_chat = None;
            if p.completed_at.is_none() {
                p.completed_at = Some(now());
            }
            match result {
                Err(e) if p.status == SyncStatus::Running => {
                    warn!(instance_id, error = %e, "history sync failed");
                    p.status = SyncStatus::Failed;
                    p.error = Some(e.to_string());
                }
                Ok(()) if p.status == SyncStatus::Running => {
                    info!(instance_id, synced = p.synced_messages, "history sync completed");
                    p.status = SyncStatus::Completed;
                }
                _ => {}
            }
        });
    }
}
