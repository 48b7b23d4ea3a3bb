// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the gateway.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post, put},
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use switchboard_config::model::{RoomsConfig, ServerConfig};
use switchboard_core::{PluginAdapter, SwitchboardError};
use switchboard_queue::QueueWorker;
use switchboard_session::{AutomationService, CallService, InstanceManager, SyncService};
use switchboard_webhook::WebhookDispatcher;

use crate::auth::{AuthConfig, auth_middleware};
use crate::handlers;
use crate::ratelimit::{RateLimiter, rate_limit_middleware};
use crate::rooms::RoomBroadcaster;
use crate::tenant;
use crate::ws;

/// Health state for unauthenticated health/metrics endpoints.
#[derive(Clone)]
pub struct HealthState {
    /// Storage whose health decides the `/health` status.
    pub storage: Arc<dyn PluginAdapter>,
    /// Process start time for uptime calculation.
    pub start_time: std::time::Instant,
    /// Optional Prometheus metrics render function.
    pub prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>>,
}

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct AppState {
    pub manager: InstanceManager,
    pub queue: QueueWorker,
    pub webhooks: Arc<WebhookDispatcher>,
    pub automation: AutomationService,
    pub calls: CallService,
    pub sync: SyncService,
    pub rooms: RoomBroadcaster,
    pub rooms_config: RoomsConfig,
    pub health: HealthState,
}

/// Builds the full route table.
///
/// - public: `/`, `/health`, `/metrics`
/// - protected by API key: everything under `/instances`
/// - dashboard WebSocket: `/instances/{id}/ws` (no key)
///
/// Every route sits behind the rate limiter.
pub fn build_router(state: AppState, auth: AuthConfig, limiter: Arc<RateLimiter>) -> Router {
    let public_routes = Router::new()
        .route("/", get(handlers::get_root))
        .route("/health", get(handlers::get_health))
        .route("/metrics", get(handlers::get_metrics))
        .with_state(state.clone());

    // `{message}` names both the message type (send) and the message id
    // (media); the router wants one name per segment.
    let api_routes = Router::new()
        .route(
            "/instances",
            post(handlers::create_instance).get(handlers::list_instances),
        )
        .route(
            "/instances/{id}",
            get(handlers::get_instance)
                .put(handlers::update_instance)
                .delete(handlers::delete_instance),
        )
        .route("/instances/{id}/connect", post(handlers::connect_instance))
        .route(
            "/instances/{id}/disconnect",
            post(handlers::disconnect_instance),
        )
        .route("/instances/{id}/qr", get(handlers::get_qr))
        .route("/instances/{id}/status", get(handlers::get_status))
        .route(
            "/instances/{id}/messages/{message}",
            post(handlers::send_message),
        )
        .route(
            "/instances/{id}/messages/{message}/media",
            get(handlers::download_media),
        )
        .route(
            "/instances/{id}/webhook",
            post(handlers::set_webhook)
                .get(handlers::get_webhook)
                .delete(handlers::delete_webhook),
        )
        .route(
            "/instances/{id}/sync",
            post(tenant::start_sync).delete(tenant::cancel_sync),
        )
        .route("/instances/{id}/sync/progress", get(tenant::sync_progress))
        .route(
            "/instances/{id}/automation/auto-reply",
            post(tenant::set_auto_reply).get(tenant::get_auto_reply),
        )
        .route(
            "/instances/{id}/automation/labels",
            put(tenant::set_label_rules).get(tenant::get_label_rules),
        )
        .route(
            "/instances/{id}/automation/schedule-message",
            post(tenant::schedule_message),
        )
        .route(
            "/instances/{id}/automation/bulk-message",
            post(tenant::bulk_message),
        )
        .route(
            "/instances/{id}/calls/settings",
            get(tenant::get_call_settings).put(tenant::set_call_settings),
        )
        .route("/instances/{id}/calls/reject", post(tenant::reject_call))
        .route_layer(axum_middleware::from_fn_with_state(auth, auth_middleware))
        .with_state(state.clone());

    let ws_routes = Router::new()
        .route("/instances/{id}/ws", get(ws::ws_handler))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .merge(ws_routes)
        .layer(axum_middleware::from_fn_with_state(
            limiter,
            rate_limit_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serves `app` on `host:port` until `cancel` fires.
pub async fn start_server(
    config: &ServerConfig,
    app: Router,
    cancel: CancellationToken,
) -> Result<(), SwitchboardError> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| {
            SwitchboardError::Internal(format!("failed to bind gateway to {addr}: {e}"))
        })?;

    tracing::info!("gateway listening on {addr}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(cancel.cancelled_owned())
    .await
    .map_err(|e| SwitchboardError::Internal(format!("gateway server error: {e}")))?;

    tracing::info!("gateway stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use futures::StreamExt;
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use switchboard_core::{Broadcaster, JobQueue};
    use switchboard_session::ManagerDeps;
    use switchboard_test_utils::{TestHarness, wait_until};

    use super::*;

    struct Gateway {
        app: Router,
        state: AppState,
        harness: TestHarness,
    }

    async fn gateway_with(harness: TestHarness) -> Gateway {
        let rooms = RoomBroadcaster::new(16);
        let manager = InstanceManager::new(
            ManagerDeps {
                store: harness.storage.clone(),
                factory: harness.factory.clone(),
                sink: harness.sink.clone(),
                broadcaster: Arc::new(rooms.clone()),
            },
            harness.config.session.clone(),
            None,
        );
        let webhooks = Arc::new(
            WebhookDispatcher::new(harness.storage.clone(), &harness.config.webhook).unwrap(),
        );
        let queue = QueueWorker::new(
            harness.storage.clone(),
            manager.clone(),
            harness.sink.clone(),
            harness.config.queue.clone(),
        );
        let state = AppState {
            automation: AutomationService::new(manager.clone()),
            calls: CallService::new(manager.clone()),
            sync: SyncService::new(manager.clone()),
            manager,
            queue,
            webhooks,
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
        Gateway {
            app: build_router(state.clone(), auth, limiter),
            state,
            harness,
        }
    }

    async fn gateway() -> Gateway {
        gateway_with(TestHarness::builder().build().await.unwrap()).await
    }

    fn request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-api-key", "test-key");
        match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, body)
    }

    async fn create(gw: &Gateway, id: &str) {
        let (status, _) = call(
            &gw.app,
            request("POST", "/instances", Some(json!({"instance_id": id}))),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn root_and_health_are_public() {
        let gw = gateway().await;
        let req = Request::get("/").body(Body::empty()).unwrap();
        let (status, body) = call(&gw.app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "running");

        let req = Request::get("/health").body(Body::empty()).unwrap();
        let (status, body) = call(&gw.app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["database"], "ok");

        let req = Request::get("/metrics").body(Body::empty()).unwrap();
        let (status, _) = call(&gw.app, req).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn protected_routes_need_the_api_key() {
        let gw = gateway().await;
        let req = Request::get("/instances").body(Body::empty()).unwrap();
        let (status, body) = call(&gw.app, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthorized");

        let req = Request::get("/instances")
            .header("authorization", "Bearer test-key")
            .body(Body::empty())
            .unwrap();
        let (status, body) = call(&gw.app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn instance_crud_maps_errors() {
        let gw = gateway().await;
        create(&gw, "t1").await;

        let (status, body) = call(
            &gw.app,
            request("POST", "/instances", Some(json!({"instance_id": "t1"}))),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].is_string());

        let (status, body) = call(&gw.app, request("GET", "/instances/t1", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["instance_id"], "t1");

        let (status, _) = call(&gw.app, request("GET", "/instances/ghost", None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = call(
            &gw.app,
            request("PUT", "/instances/t1", Some(json!({"name": "Front desk"}))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Front desk");

        let (status, _) = call(&gw.app, request("DELETE", "/instances/t1", None)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = call(&gw.app, request("GET", "/instances/t1", None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_body_is_a_json_400() {
        let gw = gateway().await;
        let req = Request::post("/instances")
            .header("x-api-key", "test-key")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = call(&gw.app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn webhook_url_on_create_installs_default_config() {
        let gw = gateway().await;
        let (status, _) = call(
            &gw.app,
            request(
                "POST",
                "/instances",
                Some(json!({"instance_id": "t1", "webhook_url": "https://hooks.example/in"})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = call(&gw.app, request("GET", "/instances/t1/webhook", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["url"], "https://hooks.example/in");
        assert_eq!(body["events"], json!(["message", "status", "receipt"]));
        assert_eq!(body["enabled"], true);
    }

    #[tokio::test]
    async fn webhook_set_get_delete() {
        let gw = gateway().await;
        create(&gw, "t1").await;

        let (status, _) = call(&gw.app, request("GET", "/instances/t1/webhook", None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = call(
            &gw.app,
            request(
                "POST",
                "/instances/t1/webhook",
                Some(json!({"url": "https://hooks.example/in", "events": ["all"], "secret": "s"})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["events"], json!(["all"]));

        let (status, _) = call(&gw.app, request("DELETE", "/instances/t1/webhook", None)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = call(&gw.app, request("GET", "/instances/t1/webhook", None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn sync_send_requires_login_and_returns_receipt() {
        let gw = gateway().await;
        create(&gw, "t1").await;
        let payload = json!({"phone": "+1 (555) 123-4567", "message": "hello"});

        let (status, _) = call(
            &gw.app,
            request("POST", "/instances/t1/messages/text", Some(payload.clone())),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let client = gw.harness.factory.client("t1").unwrap();
        client.set_logged_in(Some("me@s".into()));
        let (status, body) = call(
            &gw.app,
            request("POST", "/instances/t1/messages/text", Some(payload)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["message_id"].is_string());
        assert_eq!(client.sent_messages().len(), 1);
    }

    #[tokio::test]
    async fn async_send_is_queued_with_correlation_id() {
        let gw = gateway().await;
        create(&gw, "t1").await;

        let mut req = request(
            "POST",
            "/instances/t1/messages/text",
            Some(json!({"phone": "15551234567", "message": "later"})),
        );
        req.headers_mut().insert("x-async", "true".parse().unwrap());
        req.headers_mut()
            .insert("x-correlation-id", "corr-42".parse().unwrap());
        let (status, body) = call(&gw.app, req).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body, json!({"status": "queued", "correlation_id": "corr-42"}));

        let queued = gw
            .harness
            .storage
            .len(&gw.harness.config.queue.queue_name)
            .await
            .unwrap();
        assert_eq!(queued, 1);
    }

    #[tokio::test]
    async fn unknown_message_type_is_rejected() {
        let gw = gateway().await;
        create(&gw, "t1").await;
        let (status, body) = call(
            &gw.app,
            request(
                "POST",
                "/instances/t1/messages/sticker",
                Some(json!({"phone": "15551234567"})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("sticker"));
    }

    #[tokio::test]
    async fn sync_routes_track_progress() {
        let gw = gateway().await;
        create(&gw, "t1").await;
        let client = gw.harness.factory.client("t1").unwrap();
        client.set_logged_in(Some("me@s".into()));
        client.set_history_delay(Duration::from_millis(300));

        let (status, _) = call(&gw.app, request("GET", "/instances/t1/sync/progress", None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = call(&gw.app, request("POST", "/instances/t1/sync", None)).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["status"], "running");

        let (status, _) = call(&gw.app, request("POST", "/instances/t1/sync", None)).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = call(&gw.app, request("DELETE", "/instances/t1/sync", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "cancelled");
    }

    #[tokio::test]
    async fn automation_and_call_settings_round_trip() {
        let gw = gateway().await;
        create(&gw, "t1").await;

        let config = json!({
            "enabled": true,
            "message": "we are closed",
            "trigger_keywords": ["hours"],
            "match_type": "contains",
        });
        let (status, _) = call(
            &gw.app,
            request("POST", "/instances/t1/automation/auto-reply", Some(config.clone())),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = call(
            &gw.app,
            request("GET", "/instances/t1/automation/auto-reply", None),
        )
        .await;
        assert_eq!(body, config);

        let rules = json!([{"label_id": "l1", "keywords": ["invoice"]}]);
        let (status, body) = call(
            &gw.app,
            request("PUT", "/instances/t1/automation/labels", Some(rules.clone())),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, rules);

        let settings = json!({
            "auto_reject": true,
            "auto_reply_enabled": false,
            "auto_reply_message": "",
            "reject_delay": 0,
        });
        let (status, _) = call(
            &gw.app,
            request("PUT", "/instances/t1/calls/settings", Some(settings.clone())),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = call(&gw.app, request("GET", "/instances/t1/calls/settings", None)).await;
        assert_eq!(body["auto_reject"], true);
    }

    #[tokio::test]
    async fn schedule_in_the_past_is_a_validation_error() {
        let gw = gateway().await;
        create(&gw, "t1").await;

        let (status, _) = call(
            &gw.app,
            request(
                "POST",
                "/instances/t1/automation/schedule-message",
                Some(json!({"phone": "15551234567", "message": "hi", "execute_at": 1})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let later = chrono::Utc::now().timestamp() + 3600;
        let (status, body) = call(
            &gw.app,
            request(
                "POST",
                "/instances/t1/automation/schedule-message",
                Some(json!({"phone": "15551234567", "message": "hi", "execute_at": later})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["execute_at"], later);
    }

    #[tokio::test]
    async fn rate_limit_rejects_over_budget_callers() {
        let harness = TestHarness::builder()
            .with_rate_limit(2, 60)
            .build()
            .await
            .unwrap();
        let gw = gateway_with(harness).await;

        let from = |ip: &str| {
            Request::get("/")
                .header("x-forwarded-for", ip)
                .body(Body::empty())
                .unwrap()
        };
        assert_eq!(call(&gw.app, from("203.0.113.1")).await.0, StatusCode::OK);
        assert_eq!(call(&gw.app, from("203.0.113.1")).await.0, StatusCode::OK);
        let (status, body) = call(&gw.app, from("203.0.113.1")).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body, json!({"error": "too many requests"}));

        assert_eq!(call(&gw.app, from("203.0.113.2")).await.0, StatusCode::OK);
    }

    #[tokio::test]
    async fn status_broadcasts_reach_room_subscribers() {
        let gw = gateway().await;
        create(&gw, "t1").await;
        let mut sub = gw.state.rooms.join("t1");

        let client = gw.harness.factory.client("t1").unwrap();
        client.inject_event(switchboard_core::SessionEvent::PairSuccess {
            jid: "1234@s".into(),
        });

        let frame = tokio::time::timeout(Duration::from_secs(2), sub.rx.recv())
            .await
            .unwrap()
            .unwrap();
        let frame: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(frame["type"], "status");
        assert_eq!(frame["payload"]["status"], "authenticated");
    }

    #[tokio::test]
    async fn dashboard_socket_receives_room_frames() {
        let gw = gateway().await;
        create(&gw, "t1").await;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = gw.app.clone();
        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .unwrap();
        });

        let (mut socket, _) =
            tokio_tungstenite::connect_async(format!("ws://{addr}/instances/t1/ws"))
                .await
                .unwrap();
        let rooms = gw.state.rooms.clone();
        let joined = wait_until(Duration::from_secs(2), || {
            let rooms = rooms.clone();
            async move { rooms.connection_count(Some("t1")).await == 1 }
        })
        .await;
        assert!(joined);

        rooms.broadcast("t1", "qr", json!({"instance_id": "t1", "qr": "code"}));
        let message = tokio::time::timeout(Duration::from_secs(2), socket.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let frame: Value = serde_json::from_str(message.to_text().unwrap()).unwrap();
        assert_eq!(frame["type"], "qr");
        assert_eq!(frame["payload"]["qr"], "code");

        socket.close(None).await.unwrap();
        let left = wait_until(Duration::from_secs(2), || {
            let rooms = rooms.clone();
            async move { rooms.connection_count(Some("t1")).await == 0 }
        })
        .await;
        assert!(left);
    }
}
