// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the instance, messaging and webhook routes.

use std::str::FromStr;

use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::{Value, json};

use switchboard_core::types::{InstanceStatus, JobType, SendReceipt, WebhookConfig};
use switchboard_core::{HealthStatus, Instance, SwitchboardError};
use switchboard_session::{InstanceUpdate, ProvisioningQr};

use crate::error::{ApiError, error_response};
use crate::extract::ApiJson;
use crate::server::AppState;

type ApiResult<T> = Result<T, ApiError>;

/// Request body for `POST /instances`.
#[derive(Debug, Deserialize)]
pub struct CreateInstanceRequest {
    pub instance_id: String,
    #[serde(default)]
    pub sync_history: bool,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub webhook_url: Option<String>,
}

/// Request body for `POST /instances/{id}/webhook`.
#[derive(Debug, Deserialize)]
pub struct SetWebhookRequest {
    pub url: String,
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default)]
    pub secret: Option<String>,
}

/// GET /
pub async fn get_root() -> Json<Value> {
    Json(json!({
        "service": "switchboard",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
    }))
}

/// GET /health
///
/// `503` when storage is unhealthy.
pub async fn get_health(State(state): State<AppState>) -> Response {
    let (healthy, database) = match state.health.storage.health_check().await {
        Ok(HealthStatus::Healthy) => (true, "ok".to_string()),
        Ok(HealthStatus::Degraded(reason)) => (true, format!("degraded: {reason}")),
        Ok(HealthStatus::Unhealthy(reason)) => (false, format!("error: {reason}")),
        Err(e) => (false, format!("error: {e}")),
    };

    let body = json!({
        "status": if healthy { "healthy" } else { "unhealthy" },
        "database": database,
        "instances": state.manager.client_count().await,
        "room_connections": state.rooms.connection_count(None).await,
        "uptime_secs": state.health.start_time.elapsed().as_secs(),
        "version": env!("CARGO_PKG_VERSION"),
    });
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body)).into_response()
}

/// GET /metrics
pub async fn get_metrics(State(state): State<AppState>) -> Response {
    match &state.health.prometheus_render {
        Some(render) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            render(),
        )
            .into_response(),
        None => error_response(StatusCode::NOT_FOUND, "metrics are disabled"),
    }
}

/// POST /instances
pub async fn create_instance(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<CreateInstanceRequest>,
) -> ApiResult<(StatusCode, Json<Instance>)> {
    state
        .manager
        .create(&request.instance_id, request.sync_history)
        .await?;

    let mut instance = state.manager.get(&request.instance_id).await?;
    if request.name.is_some() || request.webhook_url.is_some() {
        let webhook_url = request.webhook_url.clone();
        instance = state
            .manager
            .update(
                &request.instance_id,
                InstanceUpdate {
                    name: request.name,
                    webhook_url: request.webhook_url,
                    sync_history: None,
                },
            )
            .await?;
        install_webhook(&state, &request.instance_id, webhook_url.as_deref()).await?;
    }

    Ok((StatusCode::CREATED, Json(instance)))
}

/// GET /instances
pub async fn list_instances(State(state): State<AppState>) -> ApiResult<Json<Vec<Instance>>> {
    Ok(Json(state.manager.list().await?))
}

/// GET /instances/{id}
pub async fn get_instance(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
) -> ApiResult<Json<Instance>> {
    Ok(Json(state.manager.get(&instance_id).await?))
}

/// PUT /instances/{id}
///
/// A non-empty `webhook_url` also installs a default webhook config.
pub async fn update_instance(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
    ApiJson(update): ApiJson<InstanceUpdate>,
) -> ApiResult<Json<Instance>> {
    let webhook_url = update.webhook_url.clone();
    let instance = state.manager.update(&instance_id, update).await?;
    install_webhook(&state, &instance_id, webhook_url.as_deref()).await?;
    Ok(Json(instance))
}

/// DELETE /instances/{id}
pub async fn delete_instance(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
) -> ApiResult<StatusCode> {
    state.manager.delete(&instance_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /instances/{id}/connect
pub async fn connect_instance(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.manager.connect(&instance_id).await?;
    Ok(Json(json!({"instance_id": instance_id, "status": "connecting"})))
}

/// POST /instances/{id}/disconnect
pub async fn disconnect_instance(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.manager.disconnect(&instance_id).await?;
    Ok(Json(json!({"instance_id": instance_id, "status": "disconnected"})))
}

/// GET /instances/{id}/qr
pub async fn get_qr(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
) -> ApiResult<Json<ProvisioningQr>> {
    Ok(Json(state.manager.qr(&instance_id).await?))
}

/// GET /instances/{id}/status
pub async fn get_status(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
) -> ApiResult<Json<InstanceStatus>> {
    Ok(Json(state.manager.status(&instance_id).await?))
}

/// POST /instances/{id}/messages/{type}
///
/// Sends synchronously, or enqueues with `X-Async: true` and answers `202`.
/// `X-Correlation-ID` is echoed in the eventual ack webhook.
pub async fn send_message(
    State(state): State<AppState>,
    Path((instance_id, kind)): Path<(String, String)>,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<Value>,
) -> ApiResult<Response> {
    let job_type = JobType::from_str(&kind).map_err(|_| {
        SwitchboardError::Validation(format!("unsupported message type: {kind}"))
    })?;

    if header_flag(&headers, "x-async") {
        let correlation_id = headers
            .get("x-correlation-id")
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.trim().is_empty())
            .map(str::to_string);
        let queued = state
            .queue
            .enqueue(&instance_id, job_type, payload, correlation_id)
            .await?;
        return Ok((StatusCode::ACCEPTED, Json(queued)).into_response());
    }

    let receipt: SendReceipt = state.manager.send(&instance_id, job_type, &payload).await?;
    Ok(Json(receipt).into_response())
}

/// GET /instances/{id}/messages/{message_id}/media
pub async fn download_media(
    State(state): State<AppState>,
    Path((instance_id, message_id)): Path<(String, String)>,
) -> ApiResult<Response> {
    let (bytes, mime) = state
        .manager
        .download_media(&instance_id, &message_id)
        .await?;
    Ok(([(header::CONTENT_TYPE, mime)], bytes).into_response())
}

/// POST /instances/{id}/webhook
pub async fn set_webhook(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
    ApiJson(request): ApiJson<SetWebhookRequest>,
) -> ApiResult<Json<WebhookConfig>> {
    state.manager.get(&instance_id).await?;
    let config = state
        .webhooks
        .set_config(WebhookConfig {
            instance_id,
            url: request.url,
            events: request.events,
            secret: request.secret.filter(|s| !s.is_empty()),
            enabled: true,
            created_at: String::new(),
            updated_at: String::new(),
        })
        .await?;
    Ok(Json(config))
}

/// GET /instances/{id}/webhook
pub async fn get_webhook(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
) -> ApiResult<Json<WebhookConfig>> {
    Ok(Json(state.webhooks.get_config(&instance_id).await?))
}

/// DELETE /instances/{id}/webhook
pub async fn delete_webhook(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
) -> ApiResult<StatusCode> {
    state.manager.get(&instance_id).await?;
    state.webhooks.delete_config(&instance_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn header_flag(headers: &HeaderMap, name: &str) -> bool {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
}

/// Points the tenant's webhook at `url` with the default event set.
async fn install_webhook(
    state: &AppState,
    instance_id: &str,
    url: Option<&str>,
) -> Result<(), SwitchboardError> {
    let Some(url) = url.map(str::trim).filter(|u| !u.is_empty()) else {
        return Ok(());
    };
    state
        .webhooks
        .set_config(WebhookConfig {
            instance_id: instance_id.to_string(),
            url: url.to_string(),
            events: Vec::new(),
            secret: None,
            enabled: true,
            created_at: String::new(),
            updated_at: String::new(),
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn create_request_defaults() {
        let req: CreateInstanceRequest = serde_json::from_str(r#"{"instance_id":"t1"}"#).unwrap();
        assert_eq!(req.instance_id, "t1");
        assert!(!req.sync_history);
        assert!(req.name.is_none());
        assert!(req.webhook_url.is_none());
    }

    #[test]
    fn webhook_request_events_default_to_empty() {
        let req: SetWebhookRequest =
            serde_json::from_str(r#"{"url":"https://hooks.example/in"}"#).unwrap();
        assert!(req.events.is_empty());
        assert!(req.secret.is_none());
    }

    #[test]
    fn async_flag_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        assert!(!header_flag(&headers, "x-async"));
        headers.insert("x-async", HeaderValue::from_static("TRUE"));
        assert!(header_flag(&headers, "x-async"));
        headers.insert("x-async", HeaderValue::from_static("1"));
        assert!(!header_flag(&headers, "x-async"));
    }
}
