// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests across the gateway, manager, queue and webhook crates.
//!
//! Each test builds an isolated TestHarness (temp SQLite, mock session
//! factory) and wires the real dispatcher, queue worker and router on top.
//! Webhook endpoints are wiremock servers.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use switchboard_core::types::{JobType, MessageJob, WebhookConfig, WebhookEvent};
use switchboard_core::{InstanceStore, JobQueue, KeyValueCache, LifecycleState, SessionEvent};
use switchboard_gateway::{
    AppState, AuthConfig, HealthState, RateLimiter, RoomBroadcaster, build_router,
};
use switchboard_queue::QueueWorker;
use switchboard_session::manager::qr_cache_key;
use switchboard_session::{
    AutomationService, CallService, InstanceManager, ManagerDeps, SyncService,
};
use switchboard_test_utils::{TestHarness, wait_until};
use switchboard_webhook::WebhookDispatcher;

struct Stack {
    app: Router,
    manager: InstanceManager,
    queue: QueueWorker,
    webhooks: Arc<WebhookDispatcher>,
    harness: TestHarness,
}

async fn stack_with(harness: TestHarness) -> Stack {
    let rooms = RoomBroadcaster::new(16);
    let webhooks = Arc::new(
        WebhookDispatcher::new(harness.storage.clone(), &harness.config.webhook).unwrap(),
    );
    let manager = InstanceManager::new(
        ManagerDeps {
            store: harness.storage.clone(),
            factory: harness.factory.clone(),
            sink: webhooks.clone(),
            broadcaster: Arc::new(rooms.clone()),
        },
        harness.config.session.clone(),
        None,
    );
    let queue = QueueWorker::new(
        harness.storage.clone(),
        manager.clone(),
        webhooks.clone(),
        harness.config.queue.clone(),
    );
    let state = AppState {
        automation: AutomationService::new(manager.clone()),
        calls: CallService::new(manager.clone()),
        sync: SyncService::new(manager.clone()),
        manager: manager.clone(),
        queue: queue.clone(),
        webhooks: webhooks.clone(),
        rooms,
        rooms_config: harness.config.rooms.clone(),
        health: HealthState {
            storage: harness.storage.clone(),
            start_time: std::time::Instant::now(),
            prometheus_render: None,
        },
    };
    let auth = AuthConfig {
        api_key: harness.config.server.api_key.clone(),
    };
    let limiter = Arc::new(RateLimiter::from_config(&harness.config.rate_limit));

    Stack {
        app: build_router(state, auth, limiter),
        manager,
        queue,
        webhooks,
        harness,
    }
}

async fn stack() -> Stack {
    stack_with(TestHarness::builder().build().await.unwrap()).await
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-api-key", "test-key");
    let req = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    send(app, req).await
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

/// Points `instance_id`'s webhook at `server` with the given subscription.
async fn subscribe(stack: &Stack, instance_id: &str, server: &MockServer, events: &[&str]) {
    stack
        .webhooks
        .set_config(WebhookConfig {
            instance_id: instance_id.into(),
            url: format!("{}/hook", server.uri()),
            events: events.iter().map(|e| e.to_string()).collect(),
            secret: Some("s3cret".into()),
            enabled: true,
            created_at: String::new(),
            updated_at: String::new(),
        })
        .await
        .unwrap();
}

async fn webhook_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    server
}

/// Delivered webhook bodies with the given event name.
async fn delivered(server: &MockServer, event: &str) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter_map(|r| serde_json::from_slice::<Value>(&r.body).ok())
        .filter(|body| body["event"] == event)
        .collect()
}

async fn wait_for_delivery(server: &MockServer, event: &str, count: usize) -> Vec<Value> {
    wait_until(Duration::from_secs(5), move || async move {
        delivered(server, event).await.len() >= count
    })
    .await;
    delivered(server, event).await
}

// ---- Registry uniqueness ----

#[tokio::test]
async fn concurrent_get_or_create_yields_one_client() {
    let stack = stack().await;

    let lookups = (0..16).map(|_| {
        let manager = stack.manager.clone();
        tokio::spawn(async move { manager.get_or_create("t1").await.unwrap() })
    });
    let clients: Vec<_> = futures::future::join_all(lookups)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let first = Arc::as_ptr(&clients[0]) as *const ();
    assert!(
        clients
            .iter()
            .all(|client| Arc::as_ptr(client) as *const () == first)
    );
    assert_eq!(stack.harness.factory.created_count(), 1);
}

// ---- Pairing ----

#[tokio::test]
async fn pairing_authenticates_the_instance() {
    let stack = stack().await;
    let body = json!({"instance_id": "t1"});
    let (status, _) = call(&stack.app, "POST", "/instances", Some(body)).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = call(&stack.app, "POST", "/instances/t1/connect", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "connecting");

    let client = stack.harness.factory.client("t1").unwrap();
    let storage = stack.harness.storage.clone();
    client.inject_event(SessionEvent::ProvisioningCode {
        codes: vec!["2@pairing-code".into()],
    });
    assert!(
        wait_until(Duration::from_secs(5), || {
            let storage = storage.clone();
            async move { storage.get(&qr_cache_key("t1")).await.unwrap().is_some() }
        })
        .await
    );

    client.pair("1234@s");
    assert!(
        wait_until(Duration::from_secs(5), || {
            let storage = storage.clone();
            async move {
                storage
                    .get_instance("t1")
                    .await
                    .unwrap()
                    .is_some_and(|row| row.status == LifecycleState::Authenticated)
            }
        })
        .await
    );

    let row = storage.get_instance("t1").await.unwrap().unwrap();
    assert_eq!(row.jid.as_deref(), Some("1234@s"));
    assert!(storage.get(&qr_cache_key("t1")).await.unwrap().is_none());

    let (status, body) = call(&stack.app, "GET", "/instances/t1/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["logged_in"], true);
}

// ---- Async sends through the running worker ----

#[tokio::test]
async fn queued_send_retries_then_acks_sent() {
    let stack = stack().await;
    let server = webhook_server().await;
    stack.manager.create("t1", false).await.unwrap();
    subscribe(&stack, "t1", &server, &["all"]).await;

    let client = stack.harness.factory.client("t1").unwrap();
    client.set_logged_in(Some("me@s".into()));
    client.script_send_failure("timeout");
    client.script_send_failure("timeout");

    let req = Request::post("/instances/t1/messages/text")
        .header("x-api-key", "test-key")
        .header("x-async", "true")
        .header("x-correlation-id", "corr-e2e")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({"phone": "+1 (555) 123-4567", "message": "hello"}).to_string(),
        ))
        .unwrap();
    let (status, body) = send(&stack.app, req).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "queued");
    assert_eq!(body["correlation_id"], "corr-e2e");

    let cancel = CancellationToken::new();
    let worker = {
        let queue = stack.queue.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { queue.run(cancel).await })
    };

    let acks = wait_for_delivery(&server, "message_ack", 1).await;
    cancel.cancel();
    worker.await.unwrap();

    assert_eq!(acks.len(), 1);
    assert_eq!(acks[0]["instance_id"], "t1");
    assert_eq!(acks[0]["data"]["status"], "sent");
    assert_eq!(acks[0]["data"]["correlation_id"], "corr-e2e");
    assert_eq!(client.send_attempts(), 3);
    assert_eq!(client.sent_messages().len(), 1);

    let queue = &stack.harness.config.queue;
    assert_eq!(stack.harness.storage.len(&queue.queue_name).await.unwrap(), 0);
    assert_eq!(stack.harness.storage.len(&queue.dead_letter_name).await.unwrap(), 0);
}

#[tokio::test]
async fn exhausted_send_is_dead_lettered_with_failed_ack() {
    let harness = TestHarness::builder()
        .with_max_retries(2)
        .build()
        .await
        .unwrap();
    let stack = stack_with(harness).await;
    let server = webhook_server().await;
    stack.manager.create("t1", false).await.unwrap();
    subscribe(&stack, "t1", &server, &["message_ack"]).await;

    let client = stack.harness.factory.client("t1").unwrap();
    client.set_logged_in(Some("me@s".into()));
    client.fail_all_sends("network unreachable");

    stack
        .queue
        .enqueue(
            "t1",
            JobType::Text,
            json!({"phone": "15551234567", "message": "hello"}),
            Some("corr-dead".into()),
        )
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    let worker = {
        let queue = stack.queue.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { queue.run(cancel).await })
    };
    let acks = wait_for_delivery(&server, "message_ack", 1).await;
    cancel.cancel();
    worker.await.unwrap();

    assert_eq!(acks.len(), 1);
    assert_eq!(acks[0]["data"]["status"], "failed");
    assert_eq!(acks[0]["data"]["correlation_id"], "corr-dead");
    assert!(!acks[0]["data"]["error"].as_str().unwrap().is_empty());
    assert_eq!(client.send_attempts(), 3);

    let queue = &stack.harness.config.queue;
    assert_eq!(stack.harness.storage.len(&queue.queue_name).await.unwrap(), 0);
    let dead = stack
        .harness
        .storage
        .peek_all(&queue.dead_letter_name)
        .await
        .unwrap();
    assert_eq!(dead.len(), 1);
    let job: MessageJob = serde_json::from_str(&dead[0]).unwrap();
    assert_eq!(job.retry_count, 2);
    assert_eq!(job.correlation_id, "corr-dead");
}

// ---- Webhook filtering ----

#[tokio::test]
async fn status_only_webhook_never_sees_messages() {
    let stack = stack().await;
    let status_only = webhook_server().await;
    let everything = webhook_server().await;
    subscribe(&stack, "t1", &status_only, &["status"]).await;
    subscribe(&stack, "t2", &everything, &["all"]).await;

    for tenant in ["t1", "t2"] {
        for event in ["message", "status", "receipt", "call"] {
            stack
                .webhooks
                .send(tenant, WebhookEvent::new(event, json!({"n": 1})))
                .await
                .unwrap();
        }
    }

    let received = status_only.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    assert!(delivered(&status_only, "message").await.is_empty());
    assert_eq!(delivered(&status_only, "status").await.len(), 1);

    assert_eq!(everything.received_requests().await.unwrap().len(), 4);
}

// ---- Deletion ----

#[tokio::test]
async fn deleting_a_never_connected_instance_leaves_nothing() {
    let stack = stack().await;
    let body = json!({"instance_id": "t1"});
    let (status, _) = call(&stack.app, "POST", "/instances", Some(body)).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = call(&stack.app, "DELETE", "/instances/t1", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    assert!(stack.manager.client("t1").await.is_none());
    assert!(stack.harness.storage.get_instance("t1").await.unwrap().is_none());
    assert!(
        stack
            .harness
            .storage
            .get(&qr_cache_key("t1"))
            .await
            .unwrap()
            .is_none()
    );

    let (status, _) = call(&stack.app, "GET", "/instances/t1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ---- Rate limiting ----

#[tokio::test]
async fn rate_limiter_admits_exactly_the_budget_per_caller() {
    let harness = TestHarness::builder()
        .with_rate_limit(5, 1)
        .build()
        .await
        .unwrap();
    let stack = stack_with(harness).await;

    let from = |ip: &str| {
        Request::get("/")
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .unwrap()
    };

    for _ in 0..5 {
        let (status, _) = send(&stack.app, from("10.0.0.1")).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, body) = send(&stack.app, from("10.0.0.1")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "too many requests");

    let (status, _) = send(&stack.app, from("10.0.0.2")).await;
    assert_eq!(status, StatusCode::OK);
}

// ---- History sync ----

#[tokio::test]
async fn concurrent_sync_conflicts_while_running() {
    let stack = stack().await;
    stack.manager.create("t1", false).await.unwrap();
    let client = stack.harness.factory.client("t1").unwrap();
    client.set_logged_in(Some("me@s".into()));
    client.set_history_delay(Duration::from_millis(500));

    let (first, second) = tokio::join!(
        call(&stack.app, "POST", "/instances/t1/sync", None),
        call(&stack.app, "POST", "/instances/t1/sync", None),
    );
    let mut statuses = [first.0, second.0];
    statuses.sort();
    assert_eq!(statuses, [StatusCode::ACCEPTED, StatusCode::CONFLICT]);

    let (status, body) = call(&stack.app, "GET", "/instances/t1/sync/progress", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "running");
}
