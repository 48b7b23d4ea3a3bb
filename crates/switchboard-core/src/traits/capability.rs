// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Narrow capabilities injected into the instance manager and queue worker.
//!
//! These keep the manager free of concrete references to the webhook
//! dispatcher, the room broadcaster, and itself (for the queue worker).

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::SwitchboardError;
use crate::traits::session::SessionClient;
use crate::types::WebhookEvent;

/// Can deliver a tenant-scoped webhook event.
#[async_trait]
pub trait EventSink: Send + Sync + 'static {
    /// Delivers `event` for `instance_id`. Filtering and signing are the
    /// sink's concern; an `Ok` does not imply the endpoint accepted it.
    async fn send(&self, instance_id: &str, event: WebhookEvent) -> Result<(), SwitchboardError>;
}

/// Can fan a message out to a tenant's live dashboard connections.
pub trait Broadcaster: Send + Sync + 'static {
    /// Non-blocking; messages for tenants without listeners are dropped.
    fn broadcast(&self, instance_id: &str, message_type: &str, payload: serde_json::Value);
}

/// Can resolve a tenant to its live session client.
#[async_trait]
pub trait SessionRegistry: Send + Sync + 'static {
    async fn client(&self, instance_id: &str) -> Option<Arc<dyn SessionClient>>;
}
