// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.

use crate::diagnostic::ConfigError;
use crate::model::SwitchboardConfig;

/// Validates semantic constraints serde cannot express.
///
/// Collects every failure rather than stopping at the first.
pub fn validate_config(config: &SwitchboardConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if config.server.host.trim().is_empty() {
        fail("server.host must not be empty".to_string());
    } else {
        let host = config.server.host.trim();
        let is_ip = host.parse::<std::net::IpAddr>().is_ok();
        let is_hostname = host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':');
        if !is_ip && !is_hostname {
            fail(format!(
                "server.host `{host}` is not a valid IP address or hostname"
            ));
        }
    }

    if config.server.port == 0 {
        fail("server.port must not be 0".to_string());
    }

    if let Some(key) = &config.server.api_key
        && key.trim().is_empty()
    {
        fail("server.api_key must not be blank when set".to_string());
    }

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }

    if config.queue.queue_name == config.queue.dead_letter_name {
        fail("queue.queue_name and queue.dead_letter_name must differ".to_string());
    }

    if config.queue.workers == 0 {
        fail("queue.workers must be at least 1".to_string());
    }

    if config.webhook.timeout_secs == 0 {
        fail("webhook.timeout_secs must be greater than 0".to_string());
    }

    if config.rate_limit.requests == 0 {
        fail("rate_limit.requests must be greater than 0".to_string());
    }

    if config.rate_limit.window_secs == 0 {
        fail("rate_limit.window_secs must be greater than 0".to_string());
    }

    if config.rooms.ping_interval_secs >= config.rooms.idle_timeout_secs {
        fail(format!(
            "rooms.ping_interval_secs ({}) must be less than rooms.idle_timeout_secs ({})",
            config.rooms.ping_interval_secs, config.rooms.idle_timeout_secs
        ));
    }

    if config.scheduler.tick_secs == 0 {
        fail("scheduler.tick_secs must be greater than 0".to_string());
    }

    if !(config.bridge.url.starts_with("ws://") || config.bridge.url.starts_with("wss://")) {
        fail(format!(
            "bridge.url `{}` must start with ws:// or wss://",
            config.bridge.url
        ));
    }

    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.logging.level.as_str()) {
        fail(format!(
            "logging.level `{}` must be one of: {}",
            config.logging.level,
            valid_levels.join(", ")
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
