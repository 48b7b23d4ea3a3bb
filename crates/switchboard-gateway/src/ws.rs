// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dashboard WebSocket: joins the tenant's room.
//!
//! Server -> Client (JSON):
//! ```json
//! {"type": "status", "payload": {"instance_id": "t1", "status": "connected"}}
//! {"type": "message", "payload": {"instance_id": "t1", "data": {...}}}
//! ```
//!
//! Inbound frames are ignored; any of them (pongs included) counts as a sign
//! of life. A connection silent for the idle timeout is closed.

use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tracing::debug;

use crate::rooms::Subscription;
use crate::server::AppState;

/// WebSocket upgrade handler for `GET /instances/{id}/ws`.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(instance_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    let limit = state.rooms_config.read_limit_bytes;
    ws.max_message_size(limit)
        .max_frame_size(limit)
        .on_upgrade(move |socket| handle_socket(socket, instance_id, state))
}

async fn handle_socket(socket: WebSocket, instance_id: String, state: AppState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let Subscription {
        conn_id,
        instance_id: _,
        mut rx,
    } = state.rooms.join(&instance_id);
    debug!(instance_id = %instance_id, conn_id = %conn_id, "dashboard connected");

    let ping_interval = Duration::from_secs(state.rooms_config.ping_interval_secs.max(1));
    let idle_timeout = Duration::from_secs(state.rooms_config.idle_timeout_secs.max(1));

    // Writer: room frames plus periodic pings. Ends when the room drops us.
    let mut sender_task = tokio::spawn(async move {
        let mut ping = tokio::time::interval(ping_interval);
        ping.tick().await;
        loop {
            let message = tokio::select! {
                frame = rx.recv() => match frame {
                    Some(frame) => Message::Text(frame.into()),
                    None => break,
                },
                _ = ping.tick() => Message::Ping(Bytes::new()),
            };
            if ws_sender.send(message).await.is_err() {
                break;
            }
        }
        let _ = ws_sender.send(Message::Close(None)).await;
    });

    // Reader: only liveness matters.
    loop {
        tokio::select! {
            next = tokio::time::timeout(idle_timeout, ws_receiver.next()) => match next {
                Ok(Some(Ok(Message::Close(_)))) | Ok(Some(Err(_))) | Ok(None) => break,
                Ok(Some(Ok(_))) => {}
                Err(_) => {
                    debug!(instance_id = %instance_id, conn_id = %conn_id, "dashboard idle, closing");
                    break;
                }
            },
            _ = &mut sender_task => break,
        }
    }

    state.rooms.leave(&instance_id, &conn_id);
    sender_task.abort();
    debug!(instance_id = %instance_id, conn_id = %conn_id, "dashboard disconnected");
}
