// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Handlers for tenant automation, call policy and history sync.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Value, json};

use switchboard_core::SwitchboardError;
use switchboard_core::types::{
    AutoReplyConfig, CallSettings, LabelRule, ScheduledMessage, SyncOptions, SyncProgress,
};
use switchboard_session::{BulkJob, BulkRequest};

use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::server::AppState;

type ApiResult<T> = Result<T, ApiError>;

/// When a scheduled message is due: Unix seconds or an RFC 3339 timestamp.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ExecuteAt {
    Unix(i64),
    Timestamp(DateTime<Utc>),
}

impl ExecuteAt {
    pub fn unix_seconds(&self) -> i64 {
        match self {
            Self::Unix(secs) => *secs,
            Self::Timestamp(at) => at.timestamp(),
        }
    }
}

/// Request body for `POST /instances/{id}/automation/schedule-message`.
#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    pub phone: String,
    pub message: String,
    pub execute_at: ExecuteAt,
}

/// Request body for `POST /instances/{id}/calls/reject`.
#[derive(Debug, Deserialize)]
pub struct RejectCallRequest {
    pub call_id: String,
    pub from: String,
}

/// POST /instances/{id}/sync
///
/// The body is optional; an empty one starts a default sync.
pub async fn start_sync(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<SyncProgress>)> {
    let options: SyncOptions = if body.iter().all(u8::is_ascii_whitespace) {
        SyncOptions::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| SwitchboardError::Validation(format!("invalid sync options: {e}")))?
    };
    let progress = state.sync.start(&instance_id, options).await?;
    Ok((StatusCode::ACCEPTED, Json(progress)))
}

/// GET /instances/{id}/sync/progress
pub async fn sync_progress(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
) -> ApiResult<Json<SyncProgress>> {
    Ok(Json(state.sync.progress(&instance_id)?))
}

/// DELETE /instances/{id}/sync
pub async fn cancel_sync(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
) -> ApiResult<Json<SyncProgress>> {
    Ok(Json(state.sync.cancel(&instance_id)?))
}

/// POST /instances/{id}/automation/auto-reply
pub async fn set_auto_reply(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
    ApiJson(config): ApiJson<AutoReplyConfig>,
) -> ApiResult<Json<AutoReplyConfig>> {
    Ok(Json(
        state.automation.set_auto_reply(&instance_id, config).await?,
    ))
}

/// GET /instances/{id}/automation/auto-reply
pub async fn get_auto_reply(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
) -> ApiResult<Json<AutoReplyConfig>> {
    Ok(Json(state.automation.get_auto_reply(&instance_id).await?))
}

/// PUT /instances/{id}/automation/labels
pub async fn set_label_rules(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
    ApiJson(rules): ApiJson<Vec<LabelRule>>,
) -> ApiResult<Json<Vec<LabelRule>>> {
    Ok(Json(
        state.automation.set_label_rules(&instance_id, rules).await?,
    ))
}

/// GET /instances/{id}/automation/labels
pub async fn get_label_rules(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
) -> ApiResult<Json<Vec<LabelRule>>> {
    Ok(Json(state.automation.get_label_rules(&instance_id).await?))
}

/// POST /instances/{id}/automation/schedule-message
pub async fn schedule_message(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
    ApiJson(request): ApiJson<ScheduleRequest>,
) -> ApiResult<(StatusCode, Json<ScheduledMessage>)> {
    let scheduled = state
        .automation
        .schedule_message(
            &instance_id,
            &request.phone,
            &request.message,
            request.execute_at.unix_seconds(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(scheduled)))
}

/// POST /instances/{id}/automation/bulk-message
pub async fn bulk_message(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
    ApiJson(request): ApiJson<BulkRequest>,
) -> ApiResult<(StatusCode, Json<BulkJob>)> {
    let job = state.automation.bulk_send(&instance_id, request).await?;
    Ok((StatusCode::ACCEPTED, Json(job)))
}

/// GET /instances/{id}/calls/settings
pub async fn get_call_settings(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
) -> ApiResult<Json<CallSettings>> {
    Ok(Json(state.calls.get_settings(&instance_id).await?))
}

/// PUT /instances/{id}/calls/settings
pub async fn set_call_settings(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
    ApiJson(settings): ApiJson<CallSettings>,
) -> ApiResult<Json<CallSettings>> {
    Ok(Json(state.calls.set_settings(&instance_id, settings).await?))
}

/// POST /instances/{id}/calls/reject
pub async fn reject_call(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
    ApiJson(request): ApiJson<RejectCallRequest>,
) -> ApiResult<Json<Value>> {
    state
        .calls
        .reject_call(&instance_id, &request.call_id, &request.from)
        .await?;
    Ok(Json(json!({"call_id": request.call_id, "status": "rejected"})))
}
