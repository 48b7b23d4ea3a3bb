// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capability doubles that record what the manager and worker emit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use switchboard_core::types::WebhookEvent;
use switchboard_core::{Broadcaster, EventSink, SwitchboardError};

/// An [`EventSink`] that keeps every event it is given.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(String, WebhookEvent)>>,
    notify: Notify,
    failing: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subsequent sends record the event and then return a transient error.
    pub fn fail_deliveries(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    /// All recorded `(instance_id, event)` pairs, oldest first.
    pub fn events(&self) -> Vec<(String, WebhookEvent)> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Recorded events with the given type name.
    pub fn events_of(&self, event_type: &str) -> Vec<WebhookEvent> {
        self.events()
            .into_iter()
            .filter(|(_, e)| e.event == event_type)
            .map(|(_, e)| e)
            .collect()
    }

    /// Waits until at least `count` events of `event_type` arrived.
    ///
    /// Returns whatever was recorded when the deadline passes.
    pub async fn wait_for(
        &self,
        event_type: &str,
        count: usize,
        timeout: Duration,
    ) -> Vec<WebhookEvent> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            let found = self.events_of(event_type);
            if found.len() >= count {
                return found;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.events_of(event_type);
            }
        }
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn send(&self, instance_id: &str, mut event: WebhookEvent) -> Result<(), SwitchboardError> {
        event.instance_id = instance_id.to_string();
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((instance_id.to_string(), event));
        self.notify.notify_waiters();

        if self.failing.load(Ordering::SeqCst) {
            return Err(SwitchboardError::transient("recording sink set to fail"));
        }
        Ok(())
    }
}

/// One room message captured by [`RecordingBroadcaster`].
#[derive(Debug, Clone, PartialEq)]
pub struct RoomMessage {
    pub instance_id: String,
    pub message_type: String,
    pub payload: serde_json::Value,
}

/// A [`Broadcaster`] that keeps every room message.
#[derive(Default, Clone)]
pub struct RecordingBroadcaster {
    messages: Arc<Mutex<Vec<RoomMessage>>>,
}

impl RecordingBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<RoomMessage> {
        self.messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn messages_of(&self, message_type: &str) -> Vec<RoomMessage> {
        self.messages()
            .into_iter()
            .filter(|m| m.message_type == message_type)
            .collect()
    }
}

impl Broadcaster for RecordingBroadcaster {
    fn broadcast(&self, instance_id: &str, message_type: &str, payload: serde_json::Value) {
        self.messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(RoomMessage {
                instance_id: instance_id.to_string(),
                message_type: message_type.to_string(),
                payload,
            });
    }
}
