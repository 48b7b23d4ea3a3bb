// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence traits: storage lifecycle plus the narrow stores each
//! component depends on.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::SwitchboardError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    Instance, LifecycleState, ScheduledMessage, SettingKind, StoredMessage, WebhookConfig,
};

/// Adapter for storage and persistence backends.
#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Initializes the storage backend (migrations, connection, etc.).
    async fn initialize(&self) -> Result<(), SwitchboardError>;

    /// Closes the storage backend, flushing pending writes.
    async fn close(&self) -> Result<(), SwitchboardError>;
}

#[async_trait]
pub trait InstanceStore: Send + Sync {
    async fn get_instance(&self, instance_id: &str) -> Result<Option<Instance>, SwitchboardError>;

    async fn list_instances(&self) -> Result<Vec<Instance>, SwitchboardError>;

    /// Inserts the row, or replaces every mutable column if it exists.
    async fn upsert_instance(&self, instance: &Instance) -> Result<(), SwitchboardError>;

    async fn delete_instance(&self, instance_id: &str) -> Result<(), SwitchboardError>;

    async fn update_status(
        &self,
        instance_id: &str,
        status: LifecycleState,
    ) -> Result<(), SwitchboardError>;

    async fn update_jid(&self, instance_id: &str, jid: Option<&str>)
        -> Result<(), SwitchboardError>;

    async fn touch_last_connected(&self, instance_id: &str) -> Result<(), SwitchboardError>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Duplicate-safe insert. Returns `false` when the message already existed.
    async fn insert_message(&self, message: &StoredMessage) -> Result<bool, SwitchboardError>;

    async fn get_message(
        &self,
        instance_id: &str,
        message_id: &str,
    ) -> Result<Option<StoredMessage>, SwitchboardError>;
}

/// Simple key-value cache with optional expiry.
#[async_trait]
pub trait KeyValueCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, SwitchboardError>;

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), SwitchboardError>;

    async fn delete(&self, key: &str) -> Result<(), SwitchboardError>;

    /// Atomically increments a counter, setting `ttl` when the key is created.
    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> Result<i64, SwitchboardError>;
}

/// Durable named FIFO queues with atomic push and pop.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Pushes onto the head of `queue`.
    async fn push(&self, queue: &str, payload: &str) -> Result<(), SwitchboardError>;

    /// Pops the oldest entry, waiting indefinitely while the queue is empty.
    async fn pop(&self, queue: &str) -> Result<String, SwitchboardError>;

    /// Pops the oldest entry without waiting.
    async fn try_pop(&self, queue: &str) -> Result<Option<String>, SwitchboardError>;

    async fn len(&self, queue: &str) -> Result<u64, SwitchboardError>;

    /// Entries oldest first, without removing them.
    async fn peek_all(&self, queue: &str) -> Result<Vec<String>, SwitchboardError>;
}

#[async_trait]
pub trait WebhookStore: Send + Sync {
    async fn get_webhook(&self, instance_id: &str)
        -> Result<Option<WebhookConfig>, SwitchboardError>;

    async fn upsert_webhook(&self, config: &WebhookConfig) -> Result<(), SwitchboardError>;

    async fn delete_webhook(&self, instance_id: &str) -> Result<(), SwitchboardError>;
}

/// Per-tenant JSON settings documents.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get_setting(
        &self,
        instance_id: &str,
        kind: SettingKind,
    ) -> Result<Option<String>, SwitchboardError>;

    async fn put_setting(
        &self,
        instance_id: &str,
        kind: SettingKind,
        value: &str,
    ) -> Result<(), SwitchboardError>;

    async fn delete_settings(&self, instance_id: &str) -> Result<(), SwitchboardError>;
}

#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn add_scheduled(&self, message: &ScheduledMessage) -> Result<(), SwitchboardError>;

    /// Entries with `execute_at <= now`, oldest first.
    async fn due_scheduled(&self, now: i64) -> Result<Vec<ScheduledMessage>, SwitchboardError>;

    async fn remove_scheduled(&self, id: &str) -> Result<(), SwitchboardError>;
}

/// Everything the instance manager persists through.
pub trait Store:
    InstanceStore + MessageStore + KeyValueCache + SettingsStore + ScheduleStore
{
}

impl<T> Store for T where
    T: InstanceStore + MessageStore + KeyValueCache + SettingsStore + ScheduleStore
{
}
