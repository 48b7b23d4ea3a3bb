// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-tenant event router.
//!
//! One router task consumes each client's event stream. State transitions
//! are persisted inline; webhook delivery, media downloads and automation
//! are handed to the task runner so the stream keeps moving.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use switchboard_core::events::{HistoryConversation, InboundMessage, PresenceChange, Receipt};
use switchboard_core::types::{WebhookEvent, event_types};
use switchboard_core::{EventStream, LifecycleState, SessionEvent};

use crate::automation;
use crate::calls;
use crate::manager::{ManagerState, qr_cache_key};
use crate::media::{self, Addressing};

/// Consumes `events` until the stream ends or `cancel` fires.
pub(crate) async fn route_events(
    state: Arc<ManagerState>,
    instance_id: String,
    mut events: EventStream,
    cancel: CancellationToken,
) {
    debug!(instance_id = %instance_id, "event router started");
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.next() => event,
        };
        let Some(event) = event else { break };

        switchboard_prometheus::record_event(event.kind());
        handle_event(&state, &instance_id, event).await;
    }
    debug!(instance_id = %instance_id, "event router stopped");
}

async fn handle_event(state: &Arc<ManagerState>, instance_id: &str, event: SessionEvent) {
    match event {
        SessionEvent::ProvisioningCode { codes } => {
            on_provisioning_code(state, instance_id, codes).await
        }
        SessionEvent::PairSuccess { jid } => on_pair_success(state, instance_id, jid).await,
        SessionEvent::Connected => on_connected(state, instance_id).await,
        SessionEvent::Disconnected => {
            state
                .persist_status(instance_id, LifecycleState::Disconnected)
                .await;
            publish_status(state, instance_id, "disconnected", None);
        }
        SessionEvent::LoggedOut { reason } => on_logged_out(state, instance_id, reason).await,
        SessionEvent::HistorySnapshot {
            sync_type,
            progress,
            conversations,
        } => on_history(state, instance_id, sync_type, progress, conversations).await,
        SessionEvent::InboundMessage(message) => on_message(state, instance_id, *message).await,
        SessionEvent::Receipt(receipt) => on_receipt(state, instance_id, receipt),
        SessionEvent::PresenceChange(change) => on_presence(state, instance_id, change),
        SessionEvent::IncomingCall(call) => calls::spawn_incoming(state, instance_id, call),
    }
}

async fn on_provisioning_code(state: &ManagerState, instance_id: &str, codes: Vec<String>) {
    let Some(code) = codes.into_iter().next() else {
        debug!(instance_id, "provisioning event without codes");
        return;
    };

    let ttl = Duration::from_secs(state.config.qr_ttl_secs);
    if let Err(e) = state
        .store
        .set(&qr_cache_key(instance_id), &code, Some(ttl))
        .await
    {
        warn!(instance_id, error = %e, "failed to cache provisioning code");
    }
    state
        .broadcaster
        .broadcast(instance_id, "qr", json!({"instance_id": instance_id, "qr": code}));
}

async fn on_pair_success(state: &ManagerState, instance_id: &str, jid: String) {
    info!(instance_id, jid = %jid, "pairing succeeded");

    if let Err(e) = state.store.update_jid(instance_id, Some(&jid)).await {
        warn!(instance_id, error = %e, "failed to persist identity");
    }
    state
        .persist_status(instance_id, LifecycleState::Authenticated)
        .await;
    if let Err(e) = state.store.touch_last_connected(instance_id).await {
        warn!(instance_id, error = %e, "failed to touch last_connected_at");
    }
    if let Err(e) = state.store.delete(&qr_cache_key(instance_id)).await {
        warn!(instance_id, error = %e, "failed to clear provisioning code");
    }

    state.broadcaster.broadcast(
        instance_id,
        "status",
        json!({"instance_id": instance_id, "status": "authenticated", "jid": jid}),
    );
}

async fn on_connected(state: &ManagerState, instance_id: &str) {
    // A paired session coming back online is still authenticated.
    let logged_in = state
        .client(instance_id)
        .await
        .is_some_and(|client| client.is_logged_in());
    let status = if logged_in {
        LifecycleState::Authenticated
    } else {
        LifecycleState::Connected
    };

    state.persist_status(instance_id, status).await;
    if let Err(e) = state.store.touch_last_connected(instance_id).await {
        warn!(instance_id, error = %e, "failed to touch last_connected_at");
    }
    publish_status(state, instance_id, "connected", None);
}

async fn on_logged_out(state: &ManagerState, instance_id: &str, reason: Option<String>) {
    warn!(instance_id, reason = ?reason, "session logged out");

    // The device record is gone; the tenant must pair again.
    if let Err(e) = state.store.update_jid(instance_id, None).await {
        warn!(instance_id, error = %e, "failed to clear identity");
    }
    state
        .persist_status(instance_id, LifecycleState::Disconnected)
        .await;
    publish_status(state, instance_id, "logged_out", reason);
}

fn publish_status(state: &ManagerState, instance_id: &str, status: &str, reason: Option<String>) {
    let mut data = json!({"status": status});
    if let Some(reason) = reason {
        data["reason"] = json!(reason);
    }
    state.emit(instance_id, event_types::STATUS, data);
    state.broadcaster.broadcast(
        instance_id,
        "status",
        json!({"instance_id": instance_id, "status": status}),
    );
}

async fn on_history(
    state: &Arc<ManagerState>,
    instance_id: &str,
    sync_type: String,
    progress: u32,
    conversations: Vec<HistoryConversation>,
) {
    let opted_in = match state.store.get_instance(instance_id).await {
        Ok(instance) => instance.is_some_and(|i| i.sync_history),
        Err(e) => {
            warn!(instance_id, error = %e, "failed to read sync preference");
            false
        }
    };
    if !opted_in {
        debug!(instance_id, "history sync disabled, dropping snapshot");
        return;
    }

    state.emit(
        instance_id,
        event_types::SYNC_PROGRESS,
        json!({"percentage": progress, "sync_type": sync_type.to_lowercase()}),
    );

    let own_jid = match state.client(instance_id).await {
        Some(client) => client.jid(),
        None => None,
    };
    let tasks = state.tasks.clone();
    let state = state.clone();
    let instance_id = instance_id.to_string();
    tasks.spawn_unbounded("history_snapshot", async move {
        let mut stored = 0usize;
        for conversation in conversations {
            for message in conversation.messages {
                let sender = history_sender(&message, own_jid.as_deref());
                let record =
                    media::stored_message(&instance_id, &message, &message.chat, &sender, "history");
                match state.store.insert_message(&record).await {
                    Ok(true) => stored += 1,
                    Ok(false) => {}
                    Err(e) => {
                        warn!(instance_id = %instance_id, error = %e, "failed to store history message")
                    }
                }
            }
        }
        info!(instance_id = %instance_id, stored, "history snapshot persisted");
    });
}

/// Sender of a history message: our own identity when it was sent by us.
pub(crate) fn history_sender(message: &InboundMessage, own_jid: Option<&str>) -> String {
    match (message.from_me, own_jid) {
        (true, Some(jid)) => jid.to_string(),
        _ => message.sender.clone(),
    }
}

async fn on_message(state: &Arc<ManagerState>, instance_id: &str, message: InboundMessage) {
    let client = state.client(instance_id).await;

    let (chat, sender) = match &client {
        Some(client) => {
            let chat = client.resolve_identity(&message.chat).await;
            let sender = match &message.sender_alt {
                Some(alt) => alt.clone(),
                None => client.resolve_identity(&message.sender).await,
            };
            (chat, sender)
        }
        None => (
            message.chat.clone(),
            message.sender_alt.clone().unwrap_or_else(|| message.sender.clone()),
        ),
    };

    let record = media::stored_message(instance_id, &message, &chat, &sender, "received");
    if let Err(e) = state.store.insert_message(&record).await {
        warn!(instance_id, message_id = %message.id, error = %e, "failed to persist message");
    }

    if !message.from_me
        && let Some(client) = &client
    {
        let text = message.content.text().unwrap_or_default();
        automation::spawn_rules(state, instance_id, client.clone(), &chat, text);
    }

    let task_state = state.clone();
    let instance_id = instance_id.to_string();
    // Media download inside the event builder carries its own deadline.
    state.tasks.spawn_steps("inbound_message", async move {
        let chat_name = match &client {
            Some(client) => task_state
                .tasks
                .bounded("contact_name", async { Ok(client.contact_name(&chat).await) })
                .await
                .ok()
                .flatten(),
            None => None,
        };
        let addressing = Addressing {
            instance_id: &instance_id,
            chat: &chat,
            sender: &sender,
            chat_name,
        };
        let event = media::build_message_event(
            client.as_deref(),
            &task_state.config,
            &task_state.public_url,
            addressing,
            &message,
        )
        .await;

        let data = serde_json::to_value(&event).map_err(|e| {
            switchboard_core::SwitchboardError::Internal(format!("failed to encode message: {e}"))
        })?;
        task_state.broadcaster.broadcast(
            &instance_id,
            "message",
            json!({"instance_id": instance_id, "data": data}),
        );
        let event = WebhookEvent::new(event_types::MESSAGE, data);
        task_state
            .tasks
            .bounded("message_webhook", task_state.sink.send(&instance_id, event))
            .await
    });
}

fn on_receipt(state: &ManagerState, instance_id: &str, receipt: Receipt) {
    state.emit(
        instance_id,
        event_types::RECEIPT,
        json!({
            "message_id": receipt.message_ids.first(),
            "message_ids": receipt.message_ids,
            "from": receipt.from,
            "type": receipt.receipt_type,
            "timestamp": receipt.timestamp,
        }),
    );
}

fn on_presence(state: &ManagerState, instance_id: &str, change: PresenceChange) {
    state.broadcaster.broadcast(
        instance_id,
        "presence",
        json!({"instance_id": instance_id, "from": change.from, "type": change.state}),
    );
    state.emit(
        instance_id,
        event_types::PRESENCE,
        json!({"from": change.from, "state": change.state, "media": change.media}),
    );
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use switchboard_config::model::SessionConfig;
    use switchboard_core::MediaKind;
    use switchboard_core::events::{MediaAttachment, MessageContent, PresenceState};
    use switchboard_core::{InstanceStore, KeyValueCache, MessageStore, SessionClient};
    use switchboard_test_utils::{TestHarness, wait_until};

    use super::*;
    use crate::manager::{InstanceManager, ManagerDeps};

    const WAIT: Duration = Duration::from_secs(2);

    fn manager(harness: &TestHarness) -> InstanceManager {
        manager_with(harness, harness.config.session.clone())
    }

    fn manager_with(harness: &TestHarness, config: SessionConfig) -> InstanceManager {
        InstanceManager::new(
            ManagerDeps {
                store: harness.storage.clone(),
                factory: harness.factory.clone(),
                sink: harness.sink.clone(),
                broadcaster: Arc::new(harness.broadcaster.clone()),
            },
            config,
            None,
        )
    }

    fn text_message(id: &str, text: &str) -> InboundMessage {
        InboundMessage {
            id: id.into(),
            chat: "15550001111@s".into(),
            sender: "15550001111@s".into(),
            sender_alt: None,
            is_group: false,
            from_me: false,
            push_name: Some("Ana".into()),
            timestamp: 1_700_000_000,
            content: MessageContent::Text { text: text.into() },
        }
    }

    #[tokio::test]
    async fn pairing_authenticates_and_clears_code() {
        let harness = TestHarness::builder().build().await.unwrap();
        let manager = manager(&harness);
        manager.create("t1", false).await.unwrap();
        let client = harness.factory.client("t1").unwrap();

        client.inject_event(SessionEvent::ProvisioningCode {
            codes: vec!["2@code".into()],
        });
        client.pair("1234@s");

        let storage = harness.storage.clone();
        assert!(
            wait_until(WAIT, || {
                let storage = storage.clone();
                async move {
                    let row = storage.get_instance("t1").await.unwrap().unwrap();
                    row.status == LifecycleState::Authenticated
                }
            })
            .await
        );
        let row = harness.storage.get_instance("t1").await.unwrap().unwrap();
        assert_eq!(row.jid.as_deref(), Some("1234@s"));
        assert!(row.last_connected_at.is_some());
        assert!(harness.storage.get("qr:t1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reconnect_of_paired_session_stays_authenticated() {
        let harness = TestHarness::builder().build().await.unwrap();
        let manager = manager(&harness);
        manager.create("t1", false).await.unwrap();
        let client = harness.factory.client("t1").unwrap();
        client.set_logged_in(Some("1234@s".into()));

        client.inject_event(SessionEvent::Connected);
        harness.sink.wait_for("status", 1, WAIT).await;

        let row = harness.storage.get_instance("t1").await.unwrap().unwrap();
        assert_eq!(row.status, LifecycleState::Authenticated);
        assert!(row.last_connected_at.is_some());
    }

    #[tokio::test]
    async fn status_events_emit_webhook_and_broadcast() {
        let harness = TestHarness::builder().build().await.unwrap();
        let manager = manager(&harness);
        manager.create("t1", false).await.unwrap();
        let client = harness.factory.client("t1").unwrap();

        client.inject_event(SessionEvent::Connected);
        client.inject_event(SessionEvent::Disconnected);

        let events = harness.sink.wait_for("status", 2, WAIT).await;
        assert_eq!(events.len(), 2);
        let statuses: Vec<_> = events.iter().map(|e| e.data["status"].clone()).collect();
        assert!(statuses.contains(&json!("connected")));
        assert!(statuses.contains(&json!("disconnected")));
        assert_eq!(harness.broadcaster.messages_of("status").len(), 2);
    }

    #[tokio::test]
    async fn logged_out_clears_identity() {
        let harness = TestHarness::builder().build().await.unwrap();
        let manager = manager(&harness);
        manager.create("t1", false).await.unwrap();
        let client = harness.factory.client("t1").unwrap();
        client.pair("1234@s");
        client.inject_event(SessionEvent::LoggedOut { reason: None });

        let events = harness.sink.wait_for("status", 1, WAIT).await;
        assert_eq!(events[0].data["status"], "logged_out");
        let row = harness.storage.get_instance("t1").await.unwrap().unwrap();
        assert_eq!(row.jid, None);
        assert_eq!(row.status, LifecycleState::Disconnected);
    }

    #[tokio::test]
    async fn inbound_message_is_persisted_and_fanned_out() {
        let harness = TestHarness::builder().build().await.unwrap();
        let manager = manager(&harness);
        manager.create("t1", false).await.unwrap();
        let client = harness.factory.client("t1").unwrap();
        client.set_contact_name("15550001111@s", "Ana Contact");

        client.inject_event(SessionEvent::InboundMessage(Box::new(text_message(
            "m1", "hello",
        ))));

        let events = harness.sink.wait_for("message", 1, WAIT).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data["text"], "hello");
        assert_eq!(events[0].data["chat_name"], "Ana Contact");
        assert_eq!(events[0].data["sender_name"], "Ana");

        let stored = harness.storage.get_message("t1", "m1").await.unwrap().unwrap();
        assert_eq!(stored.status, "received");
        assert_eq!(harness.broadcaster.messages_of("message").len(), 1);
    }

    #[tokio::test]
    async fn slow_media_download_still_delivers_message() {
        let harness = TestHarness::builder().build().await.unwrap();
        let mut config = harness.config.session.clone();
        config.task_timeout_secs = 1;
        let manager = manager_with(&harness, config);
        manager.create("t1", false).await.unwrap();
        let client = harness.factory.client("t1").unwrap();
        client.set_media(vec![1, 2, 3]);
        client.set_media_delay(Duration::from_secs(3));

        let mut message = text_message("m3", "");
        message.content = MessageContent::Media(MediaAttachment {
            kind: MediaKind::Image,
            caption: None,
            mime_type: Some("image/jpeg".into()),
            file_name: None,
            file_size: 3,
            handle: serde_json::Value::Null,
        });
        client.inject_event(SessionEvent::InboundMessage(Box::new(message)));

        let events = harness
            .sink
            .wait_for("message", 1, Duration::from_secs(4))
            .await;
        assert_eq!(events.len(), 1);
        assert!(events[0].data.get("media_data").is_none());
        assert!(
            events[0].data["media_url"]
                .as_str()
                .unwrap()
                .ends_with("/instances/t1/messages/m3/media")
        );
    }

    #[tokio::test]
    async fn aliased_sender_is_resolved() {
        let harness = TestHarness::builder().build().await.unwrap();
        let manager = manager(&harness);
        manager.create("t1", false).await.unwrap();
        let client = harness.factory.client("t1").unwrap();
        client.set_alias("9876@lid", "15550002222@s");

        let mut message = text_message("m2", "hi");
        message.chat = "9876@lid".into();
        message.sender = "9876@lid".into();
        client.inject_event(SessionEvent::InboundMessage(Box::new(message)));

        let events = harness.sink.wait_for("message", 1, WAIT).await;
        assert_eq!(events[0].data["from"], "15550002222@s");
        assert_eq!(events[0].data["to"], "15550002222@s");
    }

    #[tokio::test]
    async fn failing_webhook_does_not_stop_routing() {
        let harness = TestHarness::builder().build().await.unwrap();
        harness.sink.fail_deliveries();
        let manager = manager(&harness);
        manager.create("t1", false).await.unwrap();
        let client = harness.factory.client("t1").unwrap();

        client.inject_event(SessionEvent::InboundMessage(Box::new(text_message("a", "1"))));
        client.inject_event(SessionEvent::InboundMessage(Box::new(text_message("b", "2"))));

        assert_eq!(harness.sink.wait_for("message", 2, WAIT).await.len(), 2);
        assert!(harness.storage.get_message("t1", "b").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn history_snapshot_respects_opt_in() {
        let harness = TestHarness::builder().build().await.unwrap();
        let manager = manager(&harness);
        manager.create("off", false).await.unwrap();
        manager.create("on", true).await.unwrap();

        let mut mine = text_message("h2", "sent by me");
        mine.from_me = true;
        let snapshot = SessionEvent::HistorySnapshot {
            sync_type: "INITIAL_BOOTSTRAP".into(),
            progress: 40,
            conversations: vec![HistoryConversation {
                chat: "15550001111@s".into(),
                messages: vec![text_message("h1", "old"), mine],
            }],
        };

        for id in ["off", "on"] {
            let client = harness.factory.client(id).unwrap();
            client.set_logged_in(Some(format!("{id}@s")));
            client.inject_event(snapshot.clone());
        }

        let progress = harness.sink.wait_for("sync_progress", 1, WAIT).await;
        assert_eq!(progress.len(), 1);
        assert_eq!(progress[0].instance_id, "on");
        assert_eq!(progress[0].data["sync_type"], "initial_bootstrap");

        let storage = harness.storage.clone();
        assert!(
            wait_until(WAIT, || {
                let storage = storage.clone();
                async move { storage.get_message("on", "h2").await.unwrap().is_some() }
            })
            .await
        );
        let mine = harness.storage.get_message("on", "h2").await.unwrap().unwrap();
        assert_eq!(mine.sender, "on@s");
        assert_eq!(mine.status, "history");
        assert!(harness.storage.get_message("off", "h1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn receipt_and_presence_reach_the_sink() {
        let harness = TestHarness::builder().build().await.unwrap();
        let manager = manager(&harness);
        manager.create("t1", false).await.unwrap();
        let client = harness.factory.client("t1").unwrap();

        client.inject_event(SessionEvent::Receipt(Receipt {
            message_ids: vec!["m1".into(), "m2".into()],
            from: "15550001111@s".into(),
            receipt_type: "read".into(),
            timestamp: 10,
        }));
        client.inject_event(SessionEvent::PresenceChange(PresenceChange {
            from: "15550001111@s".into(),
            state: PresenceState::Composing,
            media: None,
        }));

        let receipts = harness.sink.wait_for("receipt", 1, WAIT).await;
        assert_eq!(receipts[0].data["message_id"], "m1");
        assert_eq!(receipts[0].data["type"], "read");

        let presence = harness.sink.wait_for("presence", 1, WAIT).await;
        assert_eq!(presence[0].data["state"], "composing");
        assert_eq!(harness.broadcaster.messages_of("presence").len(), 1);
    }

    #[tokio::test]
    async fn deleted_tenant_router_stops() {
        let harness = TestHarness::builder().build().await.unwrap();
        let manager = manager(&harness);
        manager.create("t1", false).await.unwrap();
        let client = harness.factory.client("t1").unwrap();
        manager.delete("t1").await.unwrap();

        client.inject_event(SessionEvent::Connected);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(harness.sink.events_of("status").is_empty());
        assert!(harness.storage.get_instance("t1").await.unwrap().is_none());
        assert!(!client.is_connected());
    }
}
