// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Switchboard gateway.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Switchboard configuration.
///
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SwitchboardConfig {
    /// HTTP listener and API authentication.
    #[serde(default)]
    pub server: ServerConfig,

    /// SQLite storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Durable outbound queue and worker settings.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Webhook delivery settings.
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Per-caller admission control.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Live dashboard rooms.
    #[serde(default)]
    pub rooms: RoomsConfig,

    /// Instance manager and event routing settings.
    #[serde(default)]
    pub session: SessionConfig,

    /// Scheduled-message delivery.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Protocol sidecar connection.
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Log output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP listener configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Key required on protected routes. Without one every protected
    /// request is rejected.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Prefix for deferred media URLs (e.g. `https://gw.example.com`).
    #[serde(default)]
    pub public_url: Option<String>,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("api_key", &self.api_key.as_ref().map(|_| "[redacted]"))
            .field("public_url", &self.public_url)
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            api_key: None,
            public_url: None,
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("switchboard").join("switchboard.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("switchboard.db"))
        .to_string_lossy()
        .into_owned()
}

/// Outbound queue configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    #[serde(default = "default_queue_name")]
    pub queue_name: String,

    #[serde(default = "default_dead_letter_name")]
    pub dead_letter_name: String,

    /// Attempts after the first before a job is dead-lettered.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff unit; retry `n` sleeps `n * backoff_secs`.
    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: u64,

    /// Number of concurrent worker loops.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Fallback poll interval for the blocking pop.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Pause after a failed pop before trying again.
    #[serde(default = "default_pop_error_backoff_secs")]
    pub pop_error_backoff_secs: u64,
}

impl QueueConfig {
    pub fn backoff(&self, retry_count: u32) -> Duration {
        Duration::from_secs(self.backoff_secs.saturating_mul(u64::from(retry_count)))
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            queue_name: default_queue_name(),
            dead_letter_name: default_dead_letter_name(),
            max_retries: default_max_retries(),
            backoff_secs: default_backoff_secs(),
            workers: default_workers(),
            poll_interval_ms: default_poll_interval_ms(),
            pop_error_backoff_secs: default_pop_error_backoff_secs(),
        }
    }
}

fn default_queue_name() -> String {
    "switchboard_message_queue".to_string()
}

fn default_dead_letter_name() -> String {
    "switchboard_dead_letter_queue".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_secs() -> u64 {
    2
}

fn default_workers() -> usize {
    1
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_pop_error_backoff_secs() -> u64 {
    5
}

/// Webhook delivery configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookConfig {
    /// Per-request timeout.
    #[serde(default = "default_webhook_timeout_secs")]
    pub timeout_secs: u64,

    /// Header carrying the hex HMAC-SHA256 body signature.
    #[serde(default = "default_signature_header")]
    pub signature_header: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_webhook_timeout_secs(),
            signature_header: default_signature_header(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_webhook_timeout_secs() -> u64 {
    10
}

fn default_signature_header() -> String {
    "X-Webhook-Signature".to_string()
}

fn default_user_agent() -> String {
    "Switchboard-Webhook/1.0".to_string()
}

/// Rate limiter configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Requests allowed per window; also the bucket's burst size.
    #[serde(default = "default_requests")]
    pub requests: u32,

    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Interval at which every bucket is dropped.
    #[serde(default = "default_sweep_secs")]
    pub sweep_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests: default_requests(),
            window_secs: default_window_secs(),
            sweep_secs: default_sweep_secs(),
        }
    }
}

fn default_requests() -> u32 {
    100
}

fn default_window_secs() -> u64 {
    60
}

fn default_sweep_secs() -> u64 {
    300
}

/// Live room configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RoomsConfig {
    /// A connection silent for this long is dropped.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Liveness probe interval; must be shorter than the idle timeout.
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,

    /// Largest inbound frame accepted from a dashboard.
    #[serde(default = "default_read_limit_bytes")]
    pub read_limit_bytes: usize,

    /// Outbound messages buffered per connection.
    #[serde(default = "default_send_buffer")]
    pub send_buffer: usize,
}

impl Default for RoomsConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            ping_interval_secs: default_ping_interval_secs(),
            read_limit_bytes: default_read_limit_bytes(),
            send_buffer: default_send_buffer(),
        }
    }
}

fn default_idle_timeout_secs() -> u64 {
    60
}

fn default_ping_interval_secs() -> u64 {
    54
}

fn default_read_limit_bytes() -> usize {
    512
}

fn default_send_buffer() -> usize {
    256
}

/// Instance manager configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Lifetime of a cached provisioning code.
    #[serde(default = "default_qr_ttl_secs")]
    pub qr_ttl_secs: u64,

    #[serde(default = "default_qr_poll_attempts")]
    pub qr_poll_attempts: u32,

    #[serde(default = "default_qr_poll_interval_ms")]
    pub qr_poll_interval_ms: u64,

    /// Inline-media ceilings, in megabytes.
    #[serde(default = "default_media_limit_mb")]
    pub image_limit_mb: u64,

    #[serde(default = "default_media_limit_mb")]
    pub video_limit_mb: u64,

    #[serde(default = "default_media_limit_mb")]
    pub audio_limit_mb: u64,

    #[serde(default = "default_document_limit_mb")]
    pub document_limit_mb: u64,

    /// Deadline for detached tasks (webhook fan-out, auto-reply, media).
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,

    #[serde(default = "default_label_timeout_secs")]
    pub label_timeout_secs: u64,

    #[serde(default = "default_auto_reply_delay_ms")]
    pub auto_reply_delay_ms: u64,

    #[serde(default = "default_call_reply_delay_ms")]
    pub call_reply_delay_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            qr_ttl_secs: default_qr_ttl_secs(),
            qr_poll_attempts: default_qr_poll_attempts(),
            qr_poll_interval_ms: default_qr_poll_interval_ms(),
            image_limit_mb: default_media_limit_mb(),
            video_limit_mb: default_media_limit_mb(),
            audio_limit_mb: default_media_limit_mb(),
            document_limit_mb: default_document_limit_mb(),
            task_timeout_secs: default_task_timeout_secs(),
            label_timeout_secs: default_label_timeout_secs(),
            auto_reply_delay_ms: default_auto_reply_delay_ms(),
            call_reply_delay_ms: default_call_reply_delay_ms(),
        }
    }
}

fn default_qr_ttl_secs() -> u64 {
    120
}

fn default_qr_poll_attempts() -> u32 {
    10
}

fn default_qr_poll_interval_ms() -> u64 {
    500
}

fn default_media_limit_mb() -> u64 {
    16
}

fn default_document_limit_mb() -> u64 {
    50
}

fn default_task_timeout_secs() -> u64 {
    30
}

fn default_label_timeout_secs() -> u64 {
    10
}

fn default_auto_reply_delay_ms() -> u64 {
    2000
}

fn default_call_reply_delay_ms() -> u64 {
    1500
}

/// Scheduled-message delivery configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
        }
    }
}

fn default_tick_secs() -> u64 {
    30
}

/// Protocol sidecar configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// WebSocket base URL of the sidecar.
    #[serde(default = "default_bridge_url")]
    pub url: String,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            url: default_bridge_url(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_bridge_url() -> String {
    "ws://127.0.0.1:9400".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
