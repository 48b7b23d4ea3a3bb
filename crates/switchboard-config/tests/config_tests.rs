// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Switchboard configuration system.

use switchboard_config::diagnostic::ConfigError;
use switchboard_config::model::SwitchboardConfig;
use serial_test::serial;
use switchboard_config::{load_and_validate_path, load_and_validate_str, load_config_from_str};

#[test]
fn valid_toml_deserializes() {
    let toml = r#"
[server]
host = "0.0.0.0"
port = 9000
api_key = "k-123"

[storage]
database_path = "/tmp/switchboard-test.db"

[queue]
max_retries = 5
backoff_secs = 1
workers = 4

[webhook]
timeout_secs = 3

[rate_limit]
requests = 5
window_secs = 1

[session]
qr_ttl_secs = 60
document_limit_mb = 20

[logging]
level = "debug"
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.server.port, 9000);
    assert_eq!(config.server.api_key.as_deref(), Some("k-123"));
    assert_eq!(config.storage.database_path, "/tmp/switchboard-test.db");
    assert_eq!(config.queue.max_retries, 5);
    assert_eq!(config.queue.workers, 4);
    assert_eq!(config.webhook.timeout_secs, 3);
    assert_eq!(config.rate_limit.requests, 5);
    assert_eq!(config.rate_limit.window_secs, 1);
    assert_eq!(config.session.qr_ttl_secs, 60);
    assert_eq!(config.session.document_limit_mb, 20);
    assert_eq!(config.session.image_limit_mb, 16);
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn missing_sections_use_defaults() {
    let config = load_config_from_str("").expect("empty TOML is valid");
    assert_eq!(config.server.port, 8080);
    assert!(config.server.api_key.is_none());
    assert_eq!(config.queue.queue_name, "switchboard_message_queue");
    assert_eq!(config.queue.dead_letter_name, "switchboard_dead_letter_queue");
    assert_eq!(config.queue.max_retries, 3);
    assert_eq!(config.queue.backoff_secs, 2);
    assert_eq!(config.webhook.timeout_secs, 10);
    assert_eq!(config.webhook.signature_header, "X-Webhook-Signature");
    assert_eq!(config.rate_limit.requests, 100);
    assert_eq!(config.rate_limit.window_secs, 60);
    assert_eq!(config.rate_limit.sweep_secs, 300);
    assert_eq!(config.rooms.idle_timeout_secs, 60);
    assert_eq!(config.rooms.read_limit_bytes, 512);
    assert_eq!(config.session.qr_ttl_secs, 120);
    assert_eq!(config.scheduler.tick_secs, 30);
}

#[test]
fn backoff_grows_with_retry_count() {
    let config = SwitchboardConfig::default();
    assert_eq!(config.queue.backoff(1).as_secs(), 2);
    assert_eq!(config.queue.backoff(3).as_secs(), 6);
}

#[test]
fn unknown_key_is_rejected_with_suggestion() {
    let toml = r#"
[queue]
max_retires = 4
"#;

    let errors = load_and_validate_str(toml).expect_err("unknown key should fail");
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        ConfigError::UnknownKey {
            key,
            suggestion,
            valid_keys,
            ..
        } => {
            assert_eq!(key, "max_retires");
            assert_eq!(suggestion.as_deref(), Some("max_retries"));
            assert!(valid_keys.contains("backoff_secs"));
        }
        other => panic!("expected UnknownKey, got {other:?}"),
    }
}

#[test]
fn unknown_top_level_section_is_rejected() {
    let err = load_config_from_str("[telemetry]\nenabled = true\n")
        .expect_err("unknown section should fail");
    assert!(format!("{err}").contains("telemetry"));
}

#[test]
fn invalid_type_is_reported() {
    let errors = load_and_validate_str("[server]\nport = \"eighty\"\n")
        .expect_err("string port should fail");
    assert!(matches!(errors[0], ConfigError::InvalidType { .. }));
}

#[test]
fn env_style_override_via_figment() {
    use figment::{
        Figment,
        providers::{Format, Serialized, Toml},
    };

    let config: SwitchboardConfig = Figment::new()
        .merge(Serialized::defaults(SwitchboardConfig::default()))
        .merge(Toml::string("[rate_limit]\nrequests = 10\n"))
        .merge(("rate_limit.requests", 7))
        .extract()
        .expect("should merge override");
    assert_eq!(config.rate_limit.requests, 7);
}

#[test]
fn validation_runs_after_parse() {
    let errors = load_and_validate_str("[rate_limit]\nwindow_secs = 0\n")
        .expect_err("zero window should fail validation");
    assert!(matches!(errors[0], ConfigError::Validation { .. }));
}

#[test]
fn api_key_is_redacted_in_debug() {
    let config = load_config_from_str("[server]\napi_key = \"super-secret\"\n").unwrap();
    let debug = format!("{:?}", config.server);
    assert!(!debug.contains("super-secret"));
    assert!(debug.contains("[redacted]"));
}

#[test]
fn diagnostics_render_through_miette() {
    let errors = load_and_validate_str("[server]\nprot = 1\n").unwrap_err();
    let handler = miette::GraphicalReportHandler::new();
    let mut out = String::new();
    handler
        .render_report(&mut out, &errors[0] as &dyn miette::Diagnostic)
        .unwrap();
    assert!(out.contains("prot"));
}

#[test]
#[serial]
fn env_overrides_file_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("switchboard.toml");
    std::fs::write(&path, "[rate_limit]\nrequests = 10\n\n[queue]\nmax_retries = 1\n").unwrap();

    unsafe { std::env::set_var("SWITCHBOARD_RATE_LIMIT_REQUESTS", "7") };
    unsafe { std::env::set_var("SWITCHBOARD_QUEUE_MAX_RETRIES", "5") };
    let result = load_and_validate_path(&path);
    unsafe { std::env::remove_var("SWITCHBOARD_RATE_LIMIT_REQUESTS") };
    unsafe { std::env::remove_var("SWITCHBOARD_QUEUE_MAX_RETRIES") };

    let config = result.expect("env overrides should apply");
    assert_eq!(config.rate_limit.requests, 7);
    assert_eq!(config.queue.max_retries, 5);
}

#[test]
#[serial]
fn invalid_env_value_fails_validation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("switchboard.toml");
    std::fs::write(&path, "").unwrap();

    unsafe { std::env::set_var("SWITCHBOARD_QUEUE_WORKERS", "0") };
    let result = load_and_validate_path(&path);
    unsafe { std::env::remove_var("SWITCHBOARD_QUEUE_WORKERS") };

    let errors = result.expect_err("zero workers should fail validation");
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { .. }))
    );
}
