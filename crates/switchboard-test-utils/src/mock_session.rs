// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock session client and factory for deterministic testing.
//!
//! `MockSessionClient` implements `SessionClient` with injectable protocol
//! events, scripted send outcomes and captured outbound messages.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use switchboard_core::events::{InboundMessage, MediaAttachment};
use switchboard_core::types::SendReceipt;
use switchboard_core::{
    AdapterType, EventStream, HealthStatus, MessageId, OutgoingMessage, PluginAdapter,
    SessionClient, SessionEvent, SessionFactory, SwitchboardError,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A mock protocol session for one tenant.
///
/// - **events**: anything passed to `inject_event()` comes out of the stream
///   returned by `take_events()`
/// - **sends**: outcomes queued with `script_send_failure()` are consumed in
///   order; once the script is empty every send succeeds unless
///   `fail_all_sends()` was called
pub struct MockSessionClient {
    instance_id: String,
    connected: AtomicBool,
    logged_in: AtomicBool,
    jid: Mutex<Option<String>>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<SessionEvent>>>,
    send_script: Mutex<VecDeque<String>>,
    fail_sends: Mutex<Option<String>>,
    connect_error: Mutex<Option<String>>,
    send_attempts: AtomicUsize,
    connect_calls: AtomicUsize,
    sent: Mutex<Vec<(String, OutgoingMessage)>>,
    rejected_calls: Mutex<Vec<(String, String)>>,
    labels: Mutex<Vec<(String, String)>>,
    media: Mutex<Option<Vec<u8>>>,
    media_delay: Mutex<Duration>,
    connect_delay: Mutex<Duration>,
    chats: Mutex<Vec<String>>,
    history: Mutex<HashMap<String, Vec<InboundMessage>>>,
    history_delay: Mutex<Duration>,
    contact_names: Mutex<HashMap<String, String>>,
    aliases: Mutex<HashMap<String, String>>,
}

impl MockSessionClient {
    /// Create a disconnected, unpaired client.
    pub fn new(instance_id: impl Into<String>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            instance_id: instance_id.into(),
            connected: AtomicBool::new(false),
            logged_in: AtomicBool::new(false),
            jid: Mutex::new(None),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            send_script: Mutex::new(VecDeque::new()),
            fail_sends: Mutex::new(None),
            connect_error: Mutex::new(None),
            send_attempts: AtomicUsize::new(0),
            connect_calls: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
            rejected_calls: Mutex::new(Vec::new()),
            labels: Mutex::new(Vec::new()),
            media: Mutex::new(None),
            media_delay: Mutex::new(Duration::ZERO),
            connect_delay: Mutex::new(Duration::ZERO),
            chats: Mutex::new(Vec::new()),
            history: Mutex::new(HashMap::new()),
            history_delay: Mutex::new(Duration::ZERO),
            contact_names: Mutex::new(HashMap::new()),
            aliases: Mutex::new(HashMap::new()),
        }
    }

    /// Create a client that is already paired to `jid` and online.
    pub fn paired(instance_id: impl Into<String>, jid: impl Into<String>) -> Self {
        let client = Self::new(instance_id);
        client.set_logged_in(Some(jid.into()));
        client.connected.store(true, Ordering::SeqCst);
        client
    }

    /// Push an event into the client's stream.
    pub fn inject_event(&self, event: SessionEvent) {
        let _ = self.events_tx.send(event);
    }

    /// Mark the client logged in under `jid` and emit `PairSuccess`.
    pub fn pair(&self, jid: impl Into<String>) {
        let jid = jid.into();
        self.set_logged_in(Some(jid.clone()));
        self.inject_event(SessionEvent::PairSuccess { jid });
    }

    /// Set or clear the logged-in identity without emitting anything.
    pub fn set_logged_in(&self, jid: Option<String>) {
        self.logged_in.store(jid.is_some(), Ordering::SeqCst);
        *lock(&self.jid) = jid;
    }

    /// The next send fails with a transient `reason`.
    pub fn script_send_failure(&self, reason: impl Into<String>) {
        lock(&self.send_script).push_back(reason.into());
    }

    /// Every send fails with `reason` once the script is exhausted.
    pub fn fail_all_sends(&self, reason: impl Into<String>) {
        *lock(&self.fail_sends) = Some(reason.into());
    }

    /// The next connects fail with `reason`.
    pub fn fail_connect(&self, reason: impl Into<String>) {
        *lock(&self.connect_error) = Some(reason.into());
    }

    /// Connects take `delay` before succeeding.
    pub fn set_connect_delay(&self, delay: Duration) {
        *lock(&self.connect_delay) = delay;
    }

    pub fn set_media(&self, bytes: Vec<u8>) {
        *lock(&self.media) = Some(bytes);
    }

    /// Media downloads take `delay` before answering.
    pub fn set_media_delay(&self, delay: Duration) {
        *lock(&self.media_delay) = delay;
    }

    /// Seed one chat's history for `list_chats` and `chat_history`.
    pub fn add_chat(&self, chat: impl Into<String>, messages: Vec<InboundMessage>) {
        let chat = chat.into();
        lock(&self.chats).push(chat.clone());
        lock(&self.history).insert(chat, messages);
    }

    /// Delay applied to `list_chats`, to keep a sync observable as running.
    pub fn set_history_delay(&self, delay: Duration) {
        *lock(&self.history_delay) = delay;
    }

    pub fn set_contact_name(&self, jid: impl Into<String>, name: impl Into<String>) {
        lock(&self.contact_names).insert(jid.into(), name.into());
    }

    /// Make `resolve_identity(alias)` return `stable`.
    pub fn set_alias(&self, alias: impl Into<String>, stable: impl Into<String>) {
        lock(&self.aliases).insert(alias.into(), stable.into());
    }

    /// Messages that were sent successfully, with their recipient.
    pub fn sent_messages(&self) -> Vec<(String, OutgoingMessage)> {
        lock(&self.sent).clone()
    }

    /// Every send call, successful or not.
    pub fn send_attempts(&self) -> usize {
        self.send_attempts.load(Ordering::SeqCst)
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    /// `(from, call_id)` pairs passed to `reject_call`.
    pub fn rejected_calls(&self) -> Vec<(String, String)> {
        lock(&self.rejected_calls).clone()
    }

    /// `(chat, label_id)` pairs passed to `label_chat`.
    pub fn applied_labels(&self) -> Vec<(String, String)> {
        lock(&self.labels).clone()
    }
}

#[async_trait]
impl SessionClient for MockSessionClient {
    fn instance_id(&self) -> &str {
        &self.instance_id
    }

    async fn connect(&self) -> Result<(), SwitchboardError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = lock(&self.connect_error).clone() {
            return Err(SwitchboardError::transient(reason));
        }
        let delay = *lock(&self.connect_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), SwitchboardError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::SeqCst)
    }

    fn jid(&self) -> Option<String> {
        lock(&self.jid).clone()
    }

    async fn send_message(
        &self,
        recipient: &str,
        message: OutgoingMessage,
    ) -> Result<SendReceipt, SwitchboardError> {
        let attempt = self.send_attempts.fetch_add(1, Ordering::SeqCst) + 1;

        let scripted = lock(&self.send_script).pop_front();
        if let Some(reason) = scripted.or_else(|| lock(&self.fail_sends).clone()) {
            return Err(SwitchboardError::transient(reason));
        }

        lock(&self.sent).push((recipient.to_string(), message));
        Ok(SendReceipt {
            message_id: MessageId(format!("mock-msg-{attempt}")),
            timestamp: chrono::Utc::now().timestamp(),
        })
    }

    fn take_events(&self) -> Option<EventStream> {
        let rx = lock(&self.events_rx).take()?;
        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });
        Some(Box::pin(stream))
    }

    async fn download_media(&self, media: &MediaAttachment) -> Result<Vec<u8>, SwitchboardError> {
        let delay = *lock(&self.media_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        lock(&self.media).clone().ok_or_else(|| {
            SwitchboardError::transient(format!("no media available for {}", media.kind))
        })
    }

    async fn reject_call(&self, from: &str, call_id: &str) -> Result<(), SwitchboardError> {
        lock(&self.rejected_calls).push((from.to_string(), call_id.to_string()));
        Ok(())
    }

    async fn label_chat(&self, chat: &str, label_id: &str) -> Result<(), SwitchboardError> {
        lock(&self.labels).push((chat.to_string(), label_id.to_string()));
        Ok(())
    }

    async fn list_chats(&self) -> Result<Vec<String>, SwitchboardError> {
        let delay = *lock(&self.history_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(lock(&self.chats).clone())
    }

    async fn chat_history(
        &self,
        chat: &str,
        limit: usize,
    ) -> Result<Vec<InboundMessage>, SwitchboardError> {
        let history = lock(&self.history);
        let messages = history.get(chat).cloned().unwrap_or_default();
        Ok(messages.into_iter().take(limit).collect())
    }

    async fn resolve_identity(&self, jid: &str) -> String {
        lock(&self.aliases)
            .get(jid)
            .cloned()
            .unwrap_or_else(|| jid.to_string())
    }

    async fn contact_name(&self, jid: &str) -> Option<String> {
        lock(&self.contact_names).get(jid).cloned()
    }
}

/// A session factory handing out [`MockSessionClient`]s.
///
/// Every client it creates or restores stays reachable through `client()`
/// so tests can drive it after the manager took ownership.
#[derive(Default)]
pub struct MockSessionFactory {
    clients: Mutex<HashMap<String, Arc<MockSessionClient>>>,
    devices: Mutex<HashSet<String>>,
    created: AtomicUsize,
}

impl MockSessionFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device record so `restore` finds it.
    pub fn add_device(&self, jid: impl Into<String>) {
        lock(&self.devices).insert(jid.into());
    }

    /// The most recent client handed out for `instance_id`.
    pub fn client(&self, instance_id: &str) -> Option<Arc<MockSessionClient>> {
        lock(&self.clients).get(instance_id).cloned()
    }

    /// How many fresh clients `create` allocated.
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PluginAdapter for MockSessionFactory {
    fn name(&self) -> &str {
        "mock-session"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Session
    }

    async fn health_check(&self) -> Result<HealthStatus, SwitchboardError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), SwitchboardError> {
        Ok(())
    }
}

#[async_trait]
impl SessionFactory for MockSessionFactory {
    async fn create(&self, instance_id: &str) -> Result<Arc<dyn SessionClient>, SwitchboardError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        let client = Arc::new(MockSessionClient::new(instance_id));
        lock(&self.clients).insert(instance_id.to_string(), client.clone());
        Ok(client)
    }

    async fn restore(
        &self,
        instance_id: &str,
        jid: &str,
    ) -> Result<Option<Arc<dyn SessionClient>>, SwitchboardError> {
        if !lock(&self.devices).contains(jid) {
            return Ok(None);
        }
        let client = Arc::new(MockSessionClient::new(instance_id));
        client.set_logged_in(Some(jid.to_string()));
        lock(&self.clients).insert(instance_id.to_string(), client.clone());
        Ok(Some(client))
    }
}
