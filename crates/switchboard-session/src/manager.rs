// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The tenant registry and its lifecycle operations.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashSet;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use switchboard_config::model::SessionConfig;
use switchboard_core::events::MediaAttachment;
use switchboard_core::phone::normalize_phone;
use switchboard_core::types::{
    InstanceStatus, JobType, SendMediaRequest, SendReceipt, SendTextRequest, SettingKind,
    StoredMessage, WebhookEvent,
};
use switchboard_core::{
    Broadcaster, EventSink, Instance, LifecycleState, MediaKind, OutgoingMessage, SessionClient,
    SessionFactory, SessionRegistry, Store, SwitchboardError,
};

use crate::qr;
use crate::router;
use crate::tasks::TaskRunner;

/// How long `close` waits for detached tasks.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Cache key holding a tenant's current provisioning code.
pub fn qr_cache_key(instance_id: &str) -> String {
    format!("qr:{instance_id}")
}

fn session_cache_key(instance_id: &str) -> String {
    format!("session:{instance_id}")
}

/// Collaborators injected into the manager at construction.
pub struct ManagerDeps {
    pub store: Arc<dyn Store>,
    pub factory: Arc<dyn SessionFactory>,
    pub sink: Arc<dyn EventSink>,
    pub broadcaster: Arc<dyn Broadcaster>,
}

/// Mutable fields of an instance row. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InstanceUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub sync_history: Option<bool>,
}

/// A cached provisioning code with its terminal rendering.
#[derive(Debug, Clone, Serialize)]
pub struct ProvisioningQr {
    pub instance_id: String,
    pub code: String,
    pub terminal: String,
}

struct Entry {
    client: Arc<dyn SessionClient>,
    router: CancellationToken,
}

/// State shared by the manager handle, its event routers and the services.
pub(crate) struct ManagerState {
    clients: RwLock<HashMap<String, Entry>>,
    /// Tenants with a dial in flight.
    dialing: DashSet<String>,
    pub(crate) store: Arc<dyn Store>,
    pub(crate) factory: Arc<dyn SessionFactory>,
    pub(crate) sink: Arc<dyn EventSink>,
    pub(crate) broadcaster: Arc<dyn Broadcaster>,
    pub(crate) config: SessionConfig,
    /// Prefix for deferred media URLs; empty for relative links.
    pub(crate) public_url: String,
    pub(crate) tasks: TaskRunner,
}

impl ManagerState {
    pub(crate) async fn client(&self, instance_id: &str) -> Option<Arc<dyn SessionClient>> {
        self.clients
            .read()
            .await
            .get(instance_id)
            .map(|entry| entry.client.clone())
    }

    /// Best-effort status write; failures are logged and swallowed.
    pub(crate) async fn persist_status(&self, instance_id: &str, status: LifecycleState) {
        if let Err(e) = self.store.update_status(instance_id, status).await {
            warn!(instance_id, status = %status, error = %e, "failed to persist status");
        }
    }

    /// Queues a webhook event on the task runner.
    pub(crate) fn emit(&self, instance_id: &str, event: &'static str, data: serde_json::Value) {
        let sink = self.sink.clone();
        let instance_id = instance_id.to_string();
        self.tasks.spawn("webhook", async move {
            sink.send(&instance_id, WebhookEvent::new(event, data)).await
        });
    }

    /// A tenant's settings document, or its default when none is stored.
    pub(crate) async fn setting<T>(
        &self,
        instance_id: &str,
        kind: SettingKind,
    ) -> Result<T, SwitchboardError>
    where
        T: DeserializeOwned + Default,
    {
        match self.store.get_setting(instance_id, kind).await? {
            Some(raw) => serde_json::from_str(&raw).map_err(|e| {
                SwitchboardError::Internal(format!("corrupt {kind} setting for {instance_id}: {e}"))
            }),
            None => Ok(T::default()),
        }
    }

    pub(crate) async fn put_setting<T: Serialize>(
        &self,
        instance_id: &str,
        kind: SettingKind,
        value: &T,
    ) -> Result<(), SwitchboardError> {
        let raw = serde_json::to_string(value)
            .map_err(|e| SwitchboardError::Internal(format!("failed to encode {kind}: {e}")))?;
        self.store.put_setting(instance_id, kind, &raw).await
    }
}

/// Owns every tenant's session client.
///
/// Registry reads take a shared lock; creation and removal take the
/// exclusive lock and re-check before allocating, so a tenant never has two
/// live clients. Cheap to clone.
#[derive(Clone)]
pub struct InstanceManager {
    state: Arc<ManagerState>,
}

impl InstanceManager {
    pub fn new(deps: ManagerDeps, config: SessionConfig, public_url: Option<String>) -> Self {
        let tasks = TaskRunner::new(Duration::from_secs(config.task_timeout_secs));
        let public_url = public_url
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_default();

        Self {
            state: Arc::new(ManagerState {
                clients: RwLock::new(HashMap::new()),
                dialing: DashSet::new(),
                store: deps.store,
                factory: deps.factory,
                sink: deps.sink,
                broadcaster: deps.broadcaster,
                config,
                public_url,
                tasks,
            }),
        }
    }

    pub(crate) fn state(&self) -> &Arc<ManagerState> {
        &self.state
    }

    /// The runner carrying this manager's detached work.
    pub fn tasks(&self) -> &TaskRunner {
        &self.state.tasks
    }

    /// Persists a new tenant and registers a fresh, unconnected client.
    pub async fn create(
        &self,
        instance_id: &str,
        sync_history: bool,
    ) -> Result<Arc<dyn SessionClient>, SwitchboardError> {
        validate_instance_id(instance_id)?;

        let mut clients = self.state.clients.write().await;
        if clients.contains_key(instance_id)
            || self.state.store.get_instance(instance_id).await?.is_some()
        {
            return Err(SwitchboardError::Conflict(format!(
                "instance {instance_id} already exists"
            )));
        }

        self.state
            .store
            .upsert_instance(&Instance::new(instance_id, sync_history))
            .await?;

        let client = match self.state.factory.create(instance_id).await {
            Ok(client) => client,
            Err(e) => {
                if let Err(cleanup) = self.state.store.delete_instance(instance_id).await {
                    warn!(instance_id, error = %cleanup, "failed to roll back instance row");
                }
                return Err(e);
            }
        };

        self.register_locked(&mut clients, client.clone());
        info!(instance_id, sync_history, "instance created");
        Ok(client)
    }

    /// Returns the tenant's client, allocating one if none is registered.
    ///
    /// A paired tenant gets its device record restored; otherwise a fresh
    /// identity is allocated.
    pub async fn get_or_create(
        &self,
        instance_id: &str,
    ) -> Result<Arc<dyn SessionClient>, SwitchboardError> {
        if let Some(client) = self.state.client(instance_id).await {
            return Ok(client);
        }

        let mut clients = self.state.clients.write().await;
        if let Some(entry) = clients.get(instance_id) {
            return Ok(entry.client.clone());
        }

        let restored = match self.state.store.get_instance(instance_id).await? {
            Some(Instance { jid: Some(jid), .. }) => {
                self.state.factory.restore(instance_id, &jid).await?
            }
            _ => None,
        };
        let client = match restored {
            Some(client) => client,
            None => self.state.factory.create(instance_id).await?,
        };

        self.register_locked(&mut clients, client.clone());
        Ok(client)
    }

    /// Starts connecting in the background.
    ///
    /// Failures surface only through the persisted state (`failed`).
    /// A call while a dial for the same tenant is still running is a no-op.
    pub async fn connect(&self, instance_id: &str) -> Result<(), SwitchboardError> {
        self.require_instance(instance_id).await?;
        let client = self.get_or_create(instance_id).await?;
        if client.is_connected() {
            debug!(instance_id, "already connected");
            return Ok(());
        }

        self.start_connect(instance_id, client).await;
        Ok(())
    }

    /// Closes the network connection and records `disconnected`, live client or not.
    pub async fn disconnect(&self, instance_id: &str) -> Result<(), SwitchboardError> {
        self.require_instance(instance_id).await?;

        if let Some(client) = self.state.client(instance_id).await
            && let Err(e) = client.disconnect().await
        {
            warn!(instance_id, error = %e, "disconnect failed");
        }

        self.state
            .store
            .update_status(instance_id, LifecycleState::Disconnected)
            .await?;
        info!(instance_id, "instance disconnected");
        Ok(())
    }

    /// Tears the tenant down: client, registry entry, row and cache keys.
    pub async fn delete(&self, instance_id: &str) -> Result<(), SwitchboardError> {
        // Read first: a failed lookup must leave the live entry registered.
        let persisted = self.state.store.get_instance(instance_id).await?.is_some();
        let entry = {
            let mut clients = self.state.clients.write().await;
            let entry = clients.remove(instance_id);
            switchboard_prometheus::set_instances(clients.len());
            entry
        };
        if entry.is_none() && !persisted {
            return Err(SwitchboardError::NotFound(format!("instance {instance_id}")));
        }

        if let Some(entry) = entry {
            entry.router.cancel();
            if entry.client.is_connected()
                && let Err(e) = entry.client.disconnect().await
            {
                warn!(instance_id, error = %e, "disconnect during delete failed");
            }
        }

        if persisted {
            self.state.store.delete_instance(instance_id).await?;
        }
        for key in [qr_cache_key(instance_id), session_cache_key(instance_id)] {
            if let Err(e) = self.state.store.delete(&key).await {
                warn!(instance_id, key = %key, error = %e, "failed to purge cache key");
            }
        }

        info!(instance_id, "instance deleted");
        Ok(())
    }

    /// Rehydrates every paired tenant. Returns how many clients were restored.
    ///
    /// A tenant whose device record is gone is reset to `disconnected` with
    /// its identity cleared so it can pair again.
    pub async fn load_all(&self) -> Result<usize, SwitchboardError> {
        let instances = self.state.store.list_instances().await?;
        let mut restored = 0;

        for instance in instances {
            let instance_id = instance.instance_id.as_str();
            let Some(jid) = instance.jid.as_deref() else {
                debug!(instance_id, "never paired, skipping");
                continue;
            };

            match self.state.factory.restore(instance_id, jid).await {
                Ok(Some(client)) => {
                    {
                        let mut clients = self.state.clients.write().await;
                        self.register_locked(&mut clients, client.clone());
                    }
                    restored += 1;
                    if instance.status.was_online() {
                        self.start_connect(instance_id, client).await;
                    }
                }
                Ok(None) => {
                    warn!(instance_id, jid, "device record missing, resetting instance");
                    if let Err(e) = self.state.store.update_jid(instance_id, None).await {
                        warn!(instance_id, error = %e, "failed to clear identity");
                    }
                    self.state
                        .persist_status(instance_id, LifecycleState::Disconnected)
                        .await;
                }
                Err(e) => warn!(instance_id, error = %e, "failed to restore session"),
            }
        }

        info!(restored, "instances loaded");
        Ok(restored)
    }

    /// Disconnects every client and drains detached tasks.
    pub async fn close(&self) {
        let entries: Vec<(String, Entry)> = self.state.clients.write().await.drain().collect();
        for (instance_id, entry) in entries {
            entry.router.cancel();
            if entry.client.is_connected()
                && let Err(e) = entry.client.disconnect().await
            {
                warn!(instance_id, error = %e, "disconnect during shutdown failed");
            }
        }
        switchboard_prometheus::set_instances(0);
        self.state.tasks.shutdown(SHUTDOWN_GRACE).await;
    }

    pub async fn list(&self) -> Result<Vec<Instance>, SwitchboardError> {
        self.state.store.list_instances().await
    }

    pub async fn get(&self, instance_id: &str) -> Result<Instance, SwitchboardError> {
        self.require_instance(instance_id).await
    }

    /// Applies the set fields of `update` to the instance row.
    pub async fn update(
        &self,
        instance_id: &str,
        update: InstanceUpdate,
    ) -> Result<Instance, SwitchboardError> {
        let mut instance = self.require_instance(instance_id).await?;
        if let Some(name) = update.name {
            instance.name = Some(name);
        }
        if let Some(url) = update.webhook_url {
            instance.webhook_url = Some(url).filter(|u| !u.trim().is_empty());
        }
        if let Some(sync_history) = update.sync_history {
            instance.sync_history = sync_history;
        }

        self.state.store.upsert_instance(&instance).await?;
        self.require_instance(instance_id).await
    }

    /// Live status, reconciling the persisted state when it disagrees.
    pub async fn status(&self, instance_id: &str) -> Result<InstanceStatus, SwitchboardError> {
        let client = self.require_client(instance_id).await?;
        let connected = client.is_connected();
        let logged_in = client.is_logged_in();
        let status = match (connected, logged_in) {
            (true, true) => LifecycleState::Authenticated,
            (true, false) => LifecycleState::Connected,
            _ => LifecycleState::Disconnected,
        };

        match self.state.store.get_instance(instance_id).await {
            Ok(Some(row)) if row.status != status => {
                debug!(instance_id, from = %row.status, to = %status, "reconciling status");
                self.state.persist_status(instance_id, status).await;
            }
            Ok(_) => {}
            Err(e) => warn!(instance_id, error = %e, "failed to read instance row"),
        }

        Ok(InstanceStatus {
            instance_id: instance_id.to_string(),
            status,
            connected,
            logged_in,
            jid: client.jid(),
        })
    }

    /// Polls the cache for a provisioning code.
    pub async fn qr(&self, instance_id: &str) -> Result<ProvisioningQr, SwitchboardError> {
        let client = self.require_client(instance_id).await?;
        if client.is_logged_in() {
            return Err(SwitchboardError::Validation(format!(
                "instance {instance_id} is already authenticated"
            )));
        }

        let key = qr_cache_key(instance_id);
        let attempts = self.state.config.qr_poll_attempts.max(1);
        let interval = Duration::from_millis(self.state.config.qr_poll_interval_ms);
        for attempt in 1..=attempts {
            if let Some(code) = self.state.store.get(&key).await? {
                let terminal = qr::render_terminal(&code)?;
                return Ok(ProvisioningQr {
                    instance_id: instance_id.to_string(),
                    code,
                    terminal,
                });
            }
            if attempt < attempts {
                tokio::time::sleep(interval).await;
            }
        }

        Err(SwitchboardError::NotFound(format!(
            "no QR code available for {instance_id}; connect the instance first"
        )))
    }

    /// Sends one message synchronously through the tenant's client.
    pub async fn send(
        &self,
        instance_id: &str,
        job_type: JobType,
        payload: &serde_json::Value,
    ) -> Result<SendReceipt, SwitchboardError> {
        let client = self.require_client(instance_id).await?;
        if !client.is_logged_in() {
            return Err(SwitchboardError::Unauthenticated(format!(
                "instance {instance_id} is not logged in"
            )));
        }

        let (recipient, message) = outgoing_from_payload(job_type, payload)?;
        let receipt = client.send_message(&recipient, message.clone()).await?;

        let record = StoredMessage {
            id: receipt.message_id.0.clone(),
            instance_id: instance_id.to_string(),
            chat: recipient.clone(),
            sender: client.jid().unwrap_or_default(),
            from_me: true,
            message_type: job_type.to_string(),
            content: match &message {
                OutgoingMessage::Text { body } => body.clone(),
                OutgoingMessage::Media { caption, .. } => caption.clone().unwrap_or_default(),
            },
            push_name: None,
            timestamp: receipt.timestamp,
            status: "sent".to_string(),
            media: None,
        };
        if let Err(e) = self.state.store.insert_message(&record).await {
            warn!(instance_id, error = %e, "failed to persist outbound message");
        }

        debug!(instance_id, recipient = %recipient, message_id = %receipt.message_id.0, "message sent");
        Ok(receipt)
    }

    /// Re-downloads a stored message's media. Returns the bytes and MIME type.
    pub async fn download_media(
        &self,
        instance_id: &str,
        message_id: &str,
    ) -> Result<(Vec<u8>, String), SwitchboardError> {
        let client = self.require_client(instance_id).await?;
        let message = self
            .state
            .store
            .get_message(instance_id, message_id)
            .await?
            .ok_or_else(|| SwitchboardError::NotFound(format!("message {message_id}")))?;
        let raw = message.media.ok_or_else(|| {
            SwitchboardError::NotFound(format!("message {message_id} has no media"))
        })?;
        let media: MediaAttachment = serde_json::from_str(&raw)
            .map_err(|e| SwitchboardError::Internal(format!("corrupt media handle: {e}")))?;

        let bytes = client.download_media(&media).await?;
        let mime = media
            .mime_type
            .unwrap_or_else(|| "application/octet-stream".to_string());
        Ok((bytes, mime))
    }

    /// The tenant's live client, if registered.
    pub async fn client(&self, instance_id: &str) -> Option<Arc<dyn SessionClient>> {
        self.state.client(instance_id).await
    }

    pub async fn client_count(&self) -> usize {
        self.state.clients.read().await.len()
    }

    pub(crate) async fn require_client(
        &self,
        instance_id: &str,
    ) -> Result<Arc<dyn SessionClient>, SwitchboardError> {
        self.state.client(instance_id).await.ok_or_else(|| {
            SwitchboardError::NotFound(format!("no session for instance {instance_id}"))
        })
    }

    pub(crate) async fn require_instance(
        &self,
        instance_id: &str,
    ) -> Result<Instance, SwitchboardError> {
        self.state
            .store
            .get_instance(instance_id)
            .await?
            .ok_or_else(|| SwitchboardError::NotFound(format!("instance {instance_id}")))
    }

    /// Records `connecting` and connects on the task runner.
    async fn start_connect(&self, instance_id: &str, client: Arc<dyn SessionClient>) {
        if !self.state.dialing.insert(instance_id.to_string()) {
            debug!(instance_id, "connect already in flight");
            return;
        }
        self.state
            .persist_status(instance_id, LifecycleState::Connecting)
            .await;

        let state = self.state.clone();
        let instance_id = instance_id.to_string();
        self.state.tasks.spawn_steps("connect", async move {
            let dialed = state.tasks.bounded("dial", client.connect()).await;
            state.dialing.remove(&instance_id);
            if let Err(e) = dialed {
                warn!(instance_id = %instance_id, error = %e, "connect failed");
                state
                    .persist_status(&instance_id, LifecycleState::Failed)
                    .await;
            }
            Ok(())
        });
    }

    /// Inserts `client` and starts its event router. Caller holds the write lock.
    fn register_locked(&self, clients: &mut HashMap<String, Entry>, client: Arc<dyn SessionClient>) {
        let instance_id = client.instance_id().to_string();
        let router = CancellationToken::new();

        match client.take_events() {
            Some(events) => {
                tokio::spawn(router::route_events(
                    self.state.clone(),
                    instance_id.clone(),
                    events,
                    router.clone(),
                ));
            }
            None => warn!(instance_id = %instance_id, "event stream already taken, events will not be routed"),
        }

        if let Some(previous) = clients.insert(instance_id, Entry { client, router }) {
            previous.router.cancel();
        }
        switchboard_prometheus::set_instances(clients.len());
    }
}

#[async_trait]
impl SessionRegistry for InstanceManager {
    async fn client(&self, instance_id: &str) -> Option<Arc<dyn SessionClient>> {
        self.state.client(instance_id).await
    }
}

fn validate_instance_id(instance_id: &str) -> Result<(), SwitchboardError> {
    let valid = !instance_id.is_empty()
        && instance_id.len() <= 64
        && instance_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(SwitchboardError::Validation(
            "instance_id must be 1-64 characters of letters, digits, '-' or '_'".to_string(),
        ))
    }
}

/// Decodes a send request body for `job_type` into a recipient and message.
pub fn outgoing_from_payload(
    job_type: JobType,
    payload: &serde_json::Value,
) -> Result<(String, OutgoingMessage), SwitchboardError> {
    let invalid = |e: serde_json::Error| SwitchboardError::Validation(format!("invalid {job_type} request: {e}"));

    let media = match job_type {
        JobType::Text => {
            let request: SendTextRequest =
                serde_json::from_value(payload.clone()).map_err(invalid)?;
            if request.message.trim().is_empty() {
                return Err(SwitchboardError::Validation("message is required".to_string()));
            }
            let phone = normalize_phone(&request.phone)?;
            return Ok((phone, OutgoingMessage::Text { body: request.message }));
        }
        JobType::Image => MediaKind::Image,
        JobType::Video => MediaKind::Video,
        JobType::Audio => MediaKind::Audio,
        JobType::Document => MediaKind::Document,
    };

    let request: SendMediaRequest = serde_json::from_value(payload.clone()).map_err(invalid)?;
    if request.media_url.trim().is_empty() {
        return Err(SwitchboardError::Validation("media_url is required".to_string()));
    }
    let phone = normalize_phone(&request.phone)?;
    Ok((
        phone,
        OutgoingMessage::Media {
            media,
            source: request.media_url,
            caption: request.caption,
            file_name: request.file_name,
        },
    ))
}
