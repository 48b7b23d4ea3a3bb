// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session client contract for the external messaging protocol.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_core::Stream;

use crate::error::SwitchboardError;
use crate::events::{InboundMessage, MediaAttachment, OutgoingMessage, SessionEvent};
use crate::traits::adapter::PluginAdapter;
use crate::types::SendReceipt;

/// Stream of events produced by one session client.
pub type EventStream = Pin<Box<dyn Stream<Item = SessionEvent> + Send>>;

/// One tenant's connection to the messaging network.
///
/// Implementations own the protocol state (encryption, device keys). The
/// gateway only drives the lifecycle and consumes the event stream.
#[async_trait]
pub trait SessionClient: Send + Sync + 'static {
    /// The tenant this client belongs to.
    fn instance_id(&self) -> &str;

    /// Opens the network connection. Pairing, if needed, is reported through
    /// [`SessionEvent::ProvisioningCode`] events.
    async fn connect(&self) -> Result<(), SwitchboardError>;

    /// Closes the network connection. The client stays usable for a later connect.
    async fn disconnect(&self) -> Result<(), SwitchboardError>;

    fn is_connected(&self) -> bool;

    fn is_logged_in(&self) -> bool;

    /// Remote identity bound by pairing, if any.
    fn jid(&self) -> Option<String>;

    /// Sends one message and returns the protocol message id and timestamp.
    async fn send_message(
        &self,
        recipient: &str,
        message: OutgoingMessage,
    ) -> Result<SendReceipt, SwitchboardError>;

    /// Takes the event stream. Returns `None` once it has been taken.
    fn take_events(&self) -> Option<EventStream>;

    /// Downloads and decrypts inbound media.
    async fn download_media(&self, media: &MediaAttachment) -> Result<Vec<u8>, SwitchboardError>;

    async fn reject_call(&self, from: &str, call_id: &str) -> Result<(), SwitchboardError>;

    async fn label_chat(&self, chat: &str, label_id: &str) -> Result<(), SwitchboardError>;

    /// Chats known to the session, most recent first.
    async fn list_chats(&self) -> Result<Vec<String>, SwitchboardError>;

    /// Up to `limit` most recent messages of one chat.
    async fn chat_history(
        &self,
        chat: &str,
        limit: usize,
    ) -> Result<Vec<InboundMessage>, SwitchboardError>;

    /// Maps a protocol-internal alias to a stable contact identifier.
    async fn resolve_identity(&self, jid: &str) -> String {
        jid.to_string()
    }

    /// Display name of a contact or group, when known.
    async fn contact_name(&self, _jid: &str) -> Option<String> {
        None
    }
}

/// Allocates and restores session clients.
#[async_trait]
pub trait SessionFactory: PluginAdapter {
    /// A fresh client with a new protocol identity, not yet connected.
    async fn create(&self, instance_id: &str) -> Result<Arc<dyn SessionClient>, SwitchboardError>;

    /// Rehydrates the device record bound to `jid`. `Ok(None)` when the
    /// record no longer exists and the tenant must pair again.
    async fn restore(
        &self,
        instance_id: &str,
        jid: &str,
    ) -> Result<Option<Arc<dyn SessionClient>>, SwitchboardError>;
}
