// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session events emitted by protocol clients and the outbound message model.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Media categories understood by the gateway.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Document,
}

/// Media attached to an inbound message.
///
/// `handle` is opaque to the gateway; the client that produced it knows how
/// to turn it back into bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaAttachment {
    pub kind: MediaKind,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub file_size: u64,
    #[serde(default)]
    pub handle: serde_json::Value,
}

/// Decoded content of an inbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text {
        text: String,
    },
    Media(MediaAttachment),
    Location {
        latitude: f64,
        longitude: f64,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        address: Option<String>,
    },
    /// Anything the gateway does not interpret (reactions, polls, stickers...).
    Unsupported,
}

impl MessageContent {
    /// Short type name used in persistence and webhooks.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Media(m) => match m.kind {
                MediaKind::Image => "image",
                MediaKind::Video => "video",
                MediaKind::Audio => "audio",
                MediaKind::Document => "document",
            },
            Self::Location { .. } => "location",
            Self::Unsupported => "unknown",
        }
    }

    /// Human-readable text for persistence: body, caption, or a placeholder.
    pub fn summary(&self) -> String {
        match self {
            Self::Text { text } => text.clone(),
            Self::Media(m) => match (&m.caption, m.kind) {
                (Some(c), _) if !c.is_empty() => c.clone(),
                (_, MediaKind::Image) => "[Image]".to_string(),
                (_, MediaKind::Video) => "[Video]".to_string(),
                (_, MediaKind::Audio) => "[Audio]".to_string(),
                (_, MediaKind::Document) => "[Document]".to_string(),
            },
            Self::Location { .. } => "[Location]".to_string(),
            Self::Unsupported => String::new(),
        }
    }

    /// The text a rule engine should match against, if any.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::Media(m) => m.caption.as_deref(),
            _ => None,
        }
    }
}

/// A message delivered by the protocol, live or from a history snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: String,
    /// Conversation identifier (a contact or a group).
    pub chat: String,
    pub sender: String,
    /// Stable identifier for `sender` when the protocol used an alias.
    #[serde(default)]
    pub sender_alt: Option<String>,
    #[serde(default)]
    pub is_group: bool,
    #[serde(default)]
    pub from_me: bool,
    #[serde(default)]
    pub push_name: Option<String>,
    /// Unix seconds.
    pub timestamp: i64,
    pub content: MessageContent,
}

/// One conversation inside a history snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryConversation {
    pub chat: String,
    #[serde(default)]
    pub messages: Vec<InboundMessage>,
}

/// Delivery or read receipt for one or more sent messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub message_ids: Vec<String>,
    pub from: String,
    /// `delivered`, `read`, `played`...
    pub receipt_type: String,
    pub timestamp: i64,
}

/// Chat presence of a contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PresenceState {
    Composing,
    Paused,
    Available,
    Unavailable,
}

/// A presence change reported by the protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceChange {
    pub from: String,
    pub state: PresenceState,
    /// Set to `audio` while the contact is recording a voice note.
    #[serde(default)]
    pub media: Option<String>,
}

/// An incoming voice or video call offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingCall {
    pub call_id: String,
    pub from: String,
    pub timestamp: i64,
    #[serde(default)]
    pub is_video: bool,
}

/// Everything a session client can report to its tenant's router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Pairing codes to render as QR. The first one is current.
    ProvisioningCode { codes: Vec<String> },
    PairSuccess { jid: String },
    Connected,
    Disconnected,
    LoggedOut {
        #[serde(default)]
        reason: Option<String>,
    },
    HistorySnapshot {
        #[serde(default)]
        sync_type: String,
        #[serde(default)]
        progress: u32,
        #[serde(default)]
        conversations: Vec<HistoryConversation>,
    },
    InboundMessage(Box<InboundMessage>),
    Receipt(Receipt),
    PresenceChange(PresenceChange),
    IncomingCall(IncomingCall),
}

impl SessionEvent {
    /// Stable event kind name, used for logging and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ProvisioningCode { .. } => "provisioning_code",
            Self::PairSuccess { .. } => "pair_success",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::LoggedOut { .. } => "logged_out",
            Self::HistorySnapshot { .. } => "history_snapshot",
            Self::InboundMessage(_) => "inbound_message",
            Self::Receipt(_) => "receipt",
            Self::PresenceChange(_) => "presence_change",
            Self::IncomingCall(_) => "incoming_call",
        }
    }
}

/// A message to send through a session client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutgoingMessage {
    Text {
        body: String,
    },
    Media {
        media: MediaKind,
        /// Remote URL or `data:` URI; the client uploads it.
        source: String,
        #[serde(default)]
        caption: Option<String>,
        #[serde(default)]
        file_name: Option<String>,
    },
}
