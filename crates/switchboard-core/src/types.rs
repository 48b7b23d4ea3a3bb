// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common domain types shared across the Switchboard crates.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Unique identifier for a message produced by a session client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a [`PluginAdapter`](crate::PluginAdapter).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Storage,
    Session,
    Webhook,
    Observability,
}

/// Lifecycle state of a tenant instance.
///
/// `Authenticated` is only reached after a pairing event.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Authenticated,
    Failed,
}

impl LifecycleState {
    /// States that should trigger an automatic reconnect on startup.
    pub fn was_online(self) -> bool {
        matches!(self, Self::Connected | Self::Authenticated)
    }
}

/// A persisted tenant instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub instance_id: String,
    /// Remote identity bound by pairing. `None` until the tenant pairs.
    pub jid: Option<String>,
    pub name: Option<String>,
    pub webhook_url: Option<String>,
    pub status: LifecycleState,
    pub sync_history: bool,
    pub last_connected_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Instance {
    /// A fresh, never-paired instance row.
    pub fn new(instance_id: impl Into<String>, sync_history: bool) -> Self {
        Self {
            instance_id: instance_id.into(),
            jid: None,
            name: None,
            webhook_url: None,
            status: LifecycleState::Disconnected,
            sync_history,
            last_connected_at: None,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }
}

/// Live status derived from a session client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceStatus {
    pub instance_id: String,
    pub status: LifecycleState,
    pub connected: bool,
    pub logged_in: bool,
    pub jid: Option<String>,
}

/// A message persisted for a tenant (inbound, history, or outbound).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub instance_id: String,
    pub chat: String,
    pub sender: String,
    pub from_me: bool,
    pub message_type: String,
    pub content: String,
    pub push_name: Option<String>,
    pub timestamp: i64,
    pub status: String,
    /// Serialized media handle used for deferred downloads.
    pub media: Option<String>,
}

/// Kind of outbound send a queued job performs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    Text,
    Image,
    Video,
    Audio,
    Document,
}

/// A durable outbound-send job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageJob {
    pub instance_id: String,
    pub correlation_id: String,
    #[serde(rename = "type")]
    pub job_type: JobType,
    /// Request body, kept opaque until the job is executed.
    pub payload: serde_json::Value,
    #[serde(default)]
    pub retry_count: u32,
}

/// Body of a text send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendTextRequest {
    pub phone: String,
    pub message: String,
}

/// Body of an image/video/audio/document send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendMediaRequest {
    pub phone: String,
    /// Remote URL or `data:` URI.
    pub media_url: String,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
}

/// Result of a synchronous send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendReceipt {
    pub message_id: MessageId,
    pub timestamp: i64,
}

/// Outcome reported in a `message_ack` webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Sent,
    Failed,
}

/// Payload of a `message_ack` webhook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageAck {
    pub status: AckStatus,
    pub correlation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-tenant webhook configuration. Replaced wholesale on every set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub instance_id: String,
    pub url: String,
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

impl WebhookConfig {
    /// Whether this configuration wants events of the given type.
    pub fn subscribes_to(&self, event: &str) -> bool {
        self.events
            .iter()
            .any(|e| e == event_types::ALL || e == event)
    }
}

/// A tenant-scoped webhook event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub instance_id: String,
    pub event: String,
    /// Unix seconds, stamped by the dispatcher.
    pub timestamp: i64,
    pub data: serde_json::Value,
}

impl WebhookEvent {
    /// An unstamped event; the dispatcher fills in tenant and time.
    pub fn new(event: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            instance_id: String::new(),
            event: event.into(),
            timestamp: 0,
            data,
        }
    }
}

/// Webhook event type names.
pub mod event_types {
    /// Wildcard subscription.
    pub const ALL: &str = "all";
    pub const MESSAGE: &str = "message";
    pub const STATUS: &str = "status";
    pub const RECEIPT: &str = "receipt";
    pub const PRESENCE: &str = "presence";
    pub const CALL: &str = "call";
    pub const MESSAGE_ACK: &str = "message_ack";
    pub const SYNC_PROGRESS: &str = "sync_progress";

    /// Subscription applied when a config is set with no events.
    pub const DEFAULTS: [&str; 3] = [MESSAGE, STATUS, RECEIPT];
}

/// State of a history sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Progress of the single active history sync for a tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncProgress {
    pub instance_id: String,
    pub status: SyncStatus,
    pub total_chats: usize,
    pub processed_chats: usize,
    pub total_messages: usize,
    pub synced_messages: usize,
    pub current_chat: Option<String>,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub error: Option<String>,
}

/// Options for a history sync run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Messages fetched per chat. Zero means the default of 50.
    #[serde(default)]
    pub messages_per_chat: usize,
    /// Maximum chats walked. Zero means 20, or unlimited in advanced mode.
    #[serde(default)]
    pub max_chats: usize,
    #[serde(default)]
    pub advanced: bool,
}

/// How auto-reply keywords are compared against message text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Exact,
    #[serde(rename = "startswith")]
    StartsWith,
    #[default]
    Contains,
}

/// Per-tenant auto-reply rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutoReplyConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub trigger_keywords: Vec<String>,
    #[serde(default)]
    pub match_type: MatchType,
}

/// Applies `label_id` to chats whose messages contain any keyword.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelRule {
    pub label_id: String,
    pub keywords: Vec<String>,
}

/// Per-tenant incoming-call policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallSettings {
    #[serde(default)]
    pub auto_reject: bool,
    #[serde(default)]
    pub auto_reply_enabled: bool,
    #[serde(default)]
    pub auto_reply_message: String,
    /// Seconds to wait before rejecting.
    #[serde(default)]
    pub reject_delay: u64,
}

/// A message queued for delivery at a future time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledMessage {
    pub id: String,
    pub instance_id: String,
    pub phone: String,
    pub message: String,
    /// Unix seconds.
    pub execute_at: i64,
}

/// Per-tenant settings documents stored as JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum SettingKind {
    AutoReply,
    CallPolicy,
    LabelRules,
}
