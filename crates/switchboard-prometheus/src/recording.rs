// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade, so calls are no-ops until a recorder is
//! installed.

use metrics::{describe_counter, describe_gauge, describe_histogram};

/// Register all Switchboard metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!(
        "switchboard_webhooks_total",
        "Webhook deliveries by event type and outcome"
    );
    describe_counter!(
        "switchboard_jobs_total",
        "Queued send jobs by outcome (sent, retried, dead_lettered)"
    );
    describe_counter!(
        "switchboard_events_total",
        "Session events routed, by kind"
    );
    describe_counter!(
        "switchboard_rate_limited_total",
        "Requests rejected by the rate limiter"
    );
    describe_gauge!("switchboard_instances", "Session clients in the registry");
    describe_gauge!(
        "switchboard_room_connections",
        "Live dashboard connections across all rooms"
    );
    describe_histogram!(
        "switchboard_webhook_latency_seconds",
        "Webhook POST latency in seconds"
    );
}

/// Record one webhook delivery attempt. `outcome` is `delivered`, `rejected` or `error`.
pub fn record_webhook(event: &str, outcome: &'static str, seconds: f64) {
    metrics::counter!(
        "switchboard_webhooks_total",
        "event" => event.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    metrics::histogram!("switchboard_webhook_latency_seconds").record(seconds);
}

pub fn record_job(outcome: &'static str) {
    metrics::counter!("switchboard_jobs_total", "outcome" => outcome).increment(1);
}

pub fn record_event(kind: &'static str) {
    metrics::counter!("switchboard_events_total", "kind" => kind).increment(1);
}

pub fn record_rate_limited() {
    metrics::counter!("switchboard_rate_limited_total").increment(1);
}

pub fn set_instances(count: usize) {
    metrics::gauge!("switchboard_instances").set(count as f64);
}

pub fn set_room_connections(count: usize) {
    metrics::gauge!("switchboard_room_connections").set(count as f64);
}
