// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session client backed by one sidecar WebSocket per tenant.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use switchboard_config::model::BridgeConfig;
use switchboard_core::events::{InboundMessage, MediaAttachment};
use switchboard_core::types::SendReceipt;
use switchboard_core::{
    EventStream, OutgoingMessage, SessionClient, SessionEvent, SwitchboardError,
};

use crate::protocol::{self, Incoming, Request};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Reply slot of an in-flight request.
type PendingTx = oneshot::Sender<Result<Value, String>>;

struct Call {
    op: &'static str,
    args: Value,
    reply: PendingTx,
}

struct Link {
    calls: mpsc::Sender<Call>,
    cancel: CancellationToken,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Session flags mirrored from the sidecar's events.
struct Shared {
    instance_id: String,
    connected: AtomicBool,
    logged_in: AtomicBool,
    jid: Mutex<Option<String>>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
}

impl Shared {
    fn observe(&self, event: SessionEvent) {
        match &event {
            SessionEvent::Connected => {
                self.connected.store(true, Ordering::SeqCst);
                if lock(&self.jid).is_some() {
                    self.logged_in.store(true, Ordering::SeqCst);
                }
            }
            SessionEvent::Disconnected => self.connected.store(false, Ordering::SeqCst),
            SessionEvent::PairSuccess { jid } => {
                *lock(&self.jid) = Some(jid.clone());
                self.logged_in.store(true, Ordering::SeqCst);
            }
            SessionEvent::LoggedOut { .. } => {
                *lock(&self.jid) = None;
                self.logged_in.store(false, Ordering::SeqCst);
            }
            _ => {}
        }

        if self.events_tx.send(event).is_err() {
            debug!(instance_id = %self.instance_id, "event stream dropped, discarding event");
        }
    }
}

#[derive(Deserialize)]
struct Chats {
    #[serde(default)]
    chats: Vec<String>,
}

#[derive(Deserialize)]
struct History {
    #[serde(default)]
    messages: Vec<InboundMessage>,
}

#[derive(Deserialize)]
struct Media {
    data: String,
}

#[derive(Deserialize)]
struct Identity {
    jid: String,
}

#[derive(Deserialize)]
struct ContactName {
    #[serde(default)]
    name: Option<String>,
}

/// One tenant's client. The sidecar owns the protocol state; this side
/// forwards requests and mirrors the connection flags from events.
pub struct BridgeClient {
    shared: Arc<Shared>,
    config: BridgeConfig,
    link: tokio::sync::Mutex<Option<Link>>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<SessionEvent>>>,
}

impl BridgeClient {
    pub fn new(instance_id: impl Into<String>, config: BridgeConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(Shared {
                instance_id: instance_id.into(),
                connected: AtomicBool::new(false),
                logged_in: AtomicBool::new(false),
                jid: Mutex::new(None),
                events_tx,
            }),
            config,
            link: tokio::sync::Mutex::new(None),
            events_rx: Mutex::new(Some(events_rx)),
        }
    }

    /// A client for a previously paired device.
    pub fn with_identity(self, jid: impl Into<String>) -> Self {
        *lock(&self.shared.jid) = Some(jid.into());
        self
    }

    fn session_url(&self) -> String {
        format!(
            "{}/sessions/{}",
            self.config.url.trim_end_matches('/'),
            self.shared.instance_id
        )
    }

    /// The request channel of the live link, dialing the sidecar if needed.
    async fn open(&self) -> Result<mpsc::Sender<Call>, SwitchboardError> {
        let mut link = self.link.lock().await;
        if let Some(existing) = link.as_ref()
            && !existing.calls.is_closed()
        {
            return Ok(existing.calls.clone());
        }

        let url = self.session_url();
        let timeout = Duration::from_secs(self.config.connect_timeout_secs);
        let (ws, _) = tokio::time::timeout(timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| SwitchboardError::Timeout { duration: timeout })?
            .map_err(|e| {
                SwitchboardError::transient(format!("bridge connect to {url} failed: {e}"))
            })?;

        let (calls, calls_rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();
        tokio::spawn(run_link(ws, calls_rx, self.shared.clone(), cancel.clone()));
        debug!(instance_id = %self.shared.instance_id, url = %url, "bridge link open");

        *link = Some(Link {
            calls: calls.clone(),
            cancel,
        });
        Ok(calls)
    }

    /// Sends one request and waits for its reply.
    pub(crate) async fn request(
        &self,
        op: &'static str,
        args: Value,
    ) -> Result<Value, SwitchboardError> {
        let calls = self.open().await?;
        let (reply, rx) = oneshot::channel();
        calls
            .send(Call { op, args, reply })
            .await
            .map_err(|_| SwitchboardError::transient("bridge link closed"))?;

        let timeout = Duration::from_secs(self.config.request_timeout_secs);
        match tokio::time::timeout(timeout, rx).await {
            Err(_) => Err(SwitchboardError::Timeout { duration: timeout }),
            Ok(Err(_)) => Err(SwitchboardError::transient(format!(
                "bridge link closed during {op}"
            ))),
            Ok(Ok(Err(message))) => Err(SwitchboardError::transient(format!("{op}: {message}"))),
            Ok(Ok(Ok(value))) => Ok(value),
        }
    }

    async fn request_as<T: DeserializeOwned>(
        &self,
        op: &'static str,
        args: Value,
    ) -> Result<T, SwitchboardError> {
        let value = self.request(op, args).await?;
        serde_json::from_value(value)
            .map_err(|e| SwitchboardError::Internal(format!("malformed {op} reply: {e}")))
    }

    /// Tears the link down without telling the sidecar.
    pub(crate) async fn close_link(&self) {
        if let Some(link) = self.link.lock().await.take() {
            link.cancel.cancel();
        }
        self.shared.connected.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl SessionClient for BridgeClient {
    fn instance_id(&self) -> &str {
        &self.shared.instance_id
    }

    async fn connect(&self) -> Result<(), SwitchboardError> {
        let jid = lock(&self.shared.jid).clone();
        self.request("connect", json!({ "jid": jid })).await?;
        info!(instance_id = %self.shared.instance_id, "bridge session connecting");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), SwitchboardError> {
        let linked = self.link.lock().await.is_some();
        if linked && let Err(e) = self.request("disconnect", json!({})).await {
            warn!(instance_id = %self.shared.instance_id, error = %e, "sidecar disconnect failed");
        }
        self.close_link().await;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    fn is_logged_in(&self) -> bool {
        self.shared.logged_in.load(Ordering::SeqCst)
    }

    fn jid(&self) -> Option<String> {
        lock(&self.shared.jid).clone()
    }

    async fn send_message(
        &self,
        recipient: &str,
        message: OutgoingMessage,
    ) -> Result<SendReceipt, SwitchboardError> {
        self.request_as("send_message", json!({ "to": recipient, "message": message }))
            .await
    }

    fn take_events(&self) -> Option<EventStream> {
        let rx = lock(&self.events_rx).take()?;
        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });
        Some(Box::pin(stream))
    }

    async fn download_media(&self, media: &MediaAttachment) -> Result<Vec<u8>, SwitchboardError> {
        let Media { data } = self
            .request_as("download_media", json!({ "media": media }))
            .await?;
        base64::engine::general_purpose::STANDARD
            .decode(data.as_bytes())
            .map_err(|e| SwitchboardError::Internal(format!("undecodable media payload: {e}")))
    }

    async fn reject_call(&self, from: &str, call_id: &str) -> Result<(), SwitchboardError> {
        self.request("reject_call", json!({ "from": from, "call_id": call_id }))
            .await?;
        Ok(())
    }

    async fn label_chat(&self, chat: &str, label_id: &str) -> Result<(), SwitchboardError> {
        self.request("label_chat", json!({ "chat": chat, "label_id": label_id }))
            .await?;
        Ok(())
    }

    async fn list_chats(&self) -> Result<Vec<String>, SwitchboardError> {
        let Chats { chats } = self.request_as("list_chats", json!({})).await?;
        Ok(chats)
    }

    async fn chat_history(
        &self,
        chat: &str,
        limit: usize,
    ) -> Result<Vec<InboundMessage>, SwitchboardError> {
        let History { messages } = self
            .request_as("chat_history", json!({ "chat": chat, "limit": limit }))
            .await?;
        Ok(messages)
    }

    async fn resolve_identity(&self, jid: &str) -> String {
        match self
            .request_as::<Identity>("resolve_identity", json!({ "jid": jid }))
            .await
        {
            Ok(identity) => identity.jid,
            Err(e) => {
                debug!(jid, error = %e, "identity lookup failed, keeping alias");
                jid.to_string()
            }
        }
    }

    async fn contact_name(&self, jid: &str) -> Option<String> {
        self.request_as::<ContactName>("contact_name", json!({ "jid": jid }))
            .await
            .ok()
            .and_then(|c| c.name)
    }
}

/// Pumps requests out and replies/events in until the socket or `cancel` ends.
/// Replies still owed by the sidecar, keyed by request id.
#[derive(Default)]
struct Pending {
    last_id: u64,
    waiting: HashMap<u64, PendingTx>,
}

impl Pending {
    fn next_id(&mut self) -> u64 {
        self.last_id += 1;
        self.last_id
    }

    /// Registers `reply`, dropping entries whose caller already gave up.
    fn insert(&mut self, id: u64, reply: PendingTx) {
        self.waiting.retain(|_, tx| !tx.is_closed());
        self.waiting.insert(id, reply);
    }

    fn resolve(&mut self, id: u64, result: Result<Value, String>) {
        if let Some(tx) = self.waiting.remove(&id) {
            let _ = tx.send(result);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.waiting.len()
    }
}

async fn run_link(
    ws: WsStream,
    mut calls: mpsc::Receiver<Call>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let mut pending = Pending::default();
    let mut deliberate = false;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                deliberate = true;
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }
            call = calls.recv() => {
                let Some(call) = call else { break };
                let id = pending.next_id();
                let request = Request { id, op: call.op, args: call.args };
                let frame = match serde_json::to_string(&request) {
                    Ok(frame) => frame,
                    Err(e) => {
                        let _ = call.reply.send(Err(format!("unencodable request: {e}")));
                        continue;
                    }
                };
                pending.insert(id, call.reply);
                if ws_tx.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }
            frame = ws_rx.next() => {
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => continue,
                };
                match protocol::decode(&text) {
                    Some(Incoming::Reply(reply)) => {
                        pending.resolve(reply.id, reply.into_result());
                    }
                    Some(Incoming::Event { event }) => shared.observe(event),
                    None => {}
                }
            }
        }
    }

    // Fail in-flight requests and make the link look closed to `open`.
    drop(pending);
    drop(calls);
    let was_connected = shared.connected.swap(false, Ordering::SeqCst);
    if was_connected && !deliberate {
        warn!(instance_id = %shared.instance_id, "bridge link lost");
        let _ = shared.events_tx.send(SessionEvent::Disconnected);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abandoned_requests_are_pruned() {
        let mut pending = Pending::default();
        let (gone_tx, gone_rx) = oneshot::channel();
        let first = pending.next_id();
        pending.insert(first, gone_tx);
        drop(gone_rx);

        let (live_tx, mut live_rx) = oneshot::channel();
        let second = pending.next_id();
        pending.insert(second, live_tx);
        assert_eq!(pending.len(), 1);

        pending.resolve(second, Ok(json!({"ok": 1})));
        assert_eq!(live_rx.try_recv().unwrap().unwrap()["ok"], 1);
        assert_eq!(pending.len(), 0);
    }
}
