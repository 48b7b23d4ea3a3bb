// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./switchboard.toml` > `~/.config/switchboard/switchboard.toml`
//! > `/etc/switchboard/switchboard.toml`, with environment variable overrides via
//! the `SWITCHBOARD_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::SwitchboardConfig;

/// Config sections, longest first so `rate_limit_` wins over shorter prefixes.
const SECTIONS: &[&str] = &[
    "rate_limit",
    "scheduler",
    "logging",
    "storage",
    "webhook",
    "session",
    "server",
    "bridge",
    "queue",
    "rooms",
];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/switchboard/switchboard.toml`
/// 3. `~/.config/switchboard/switchboard.toml`
/// 4. `./switchboard.toml`
/// 5. `SWITCHBOARD_*` environment variables
pub fn load_config() -> Result<SwitchboardConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<SwitchboardConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(SwitchboardConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<SwitchboardConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(SwitchboardConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used for config loading, before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(SwitchboardConfig::default()))
        .merge(Toml::file("/etc/switchboard/switchboard.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("switchboard/switchboard.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("switchboard.toml"))
        .merge(env_provider())
}

/// Environment provider with explicit section mapping.
///
/// `Env::split("_")` would turn `SWITCHBOARD_QUEUE_MAX_RETRIES` into
/// `queue.max.retries`; only the section prefix is split off here.
fn env_provider() -> Env {
    Env::prefixed("SWITCHBOARD_").map(|key| map_env_key(key.as_str()).into())
}

/// Maps a lowercased, prefix-stripped env key to a dotted config path.
///
/// `rate_limit_requests` becomes `rate_limit.requests`. Keys outside a known
/// section are returned unchanged so figment reports them as unknown.
pub fn map_env_key(key: &str) -> String {
    for section in SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|r| r.strip_prefix('_'))
            && !rest.is_empty()
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}
