// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the storage traits.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use switchboard_config::model::StorageConfig;
use switchboard_core::types::{
    Instance, LifecycleState, ScheduledMessage, SettingKind, StoredMessage, WebhookConfig,
};
use switchboard_core::{
    AdapterType, HealthStatus, InstanceStore, JobQueue, KeyValueCache, MessageStore,
    PluginAdapter, ScheduleStore, SettingsStore, StorageAdapter, SwitchboardError, WebhookStore,
};

use crate::database::Database;
use crate::queries;

/// How often a blocked queue pop re-checks the table without a wake-up.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// SQLite-backed storage adapter.
///
/// Wraps a [`Database`] handle and delegates to the typed query modules.
/// The database is opened by [`StorageAdapter::initialize`].
pub struct SqliteStorage {
    config: StorageConfig,
    poll_interval: Duration,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    /// The database connection is not opened until [`StorageAdapter::initialize`].
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            poll_interval: DEFAULT_POLL_INTERVAL,
            db: OnceCell::new(),
        }
    }

    /// Overrides the blocked-pop re-check interval.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Returns the underlying Database, or an error if not initialized.
    pub fn database(&self) -> Result<&Database, SwitchboardError> {
        self.db.get().ok_or_else(|| SwitchboardError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, SwitchboardError> {
        let db = self.database()?;
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), SwitchboardError> {
        if let Some(db) = self.db.get() {
            db.close().await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), SwitchboardError> {
        let db = Database::open(&self.config.database_path).await?;
        self.db.set(db).map_err(|_| SwitchboardError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), SwitchboardError> {
        self.database()?.close().await
    }
}

#[async_trait]
impl InstanceStore for SqliteStorage {
    async fn get_instance(&self, instance_id: &str) -> Result<Option<Instance>, SwitchboardError> {
        queries::instances::get_instance(self.database()?, instance_id).await
    }

    async fn list_instances(&self) -> Result<Vec<Instance>, SwitchboardError> {
        queries::instances::list_instances(self.database()?).await
    }

    async fn upsert_instance(&self, instance: &Instance) -> Result<(), SwitchboardError> {
        queries::instances::upsert_instance(self.database()?, instance).await
    }

    async fn delete_instance(&self, instance_id: &str) -> Result<(), SwitchboardError> {
        queries::instances::delete_instance(self.database()?, instance_id).await
    }

    async fn update_status(
        &self,
        instance_id: &str,
        status: LifecycleState,
    ) -> Result<(), SwitchboardError> {
        queries::instances::update_status(self.database()?, instance_id, status).await
    }

    async fn update_jid(
        &self,
        instance_id: &str,
        jid: Option<&str>,
    ) -> Result<(), SwitchboardError> {
        queries::instances::update_jid(self.database()?, instance_id, jid).await
    }

    async fn touch_last_connected(&self, instance_id: &str) -> Result<(), SwitchboardError> {
        queries::instances::touch_last_connected(self.database()?, instance_id).await
    }
}

#[async_trait]
impl MessageStore for SqliteStorage {
    async fn insert_message(&self, message: &StoredMessage) -> Result<bool, SwitchboardError> {
        queries::messages::insert_message(self.database()?, message).await
    }

    async fn get_message(
        &self,
        instance_id: &str,
        message_id: &str,
    ) -> Result<Option<StoredMessage>, SwitchboardError> {
        queries::messages::get_message(self.database()?, instance_id, message_id).await
    }
}

#[async_trait]
impl KeyValueCache for SqliteStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, SwitchboardError> {
        queries::cache::get(self.database()?, key).await
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), SwitchboardError> {
        queries::cache::set(self.database()?, key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<(), SwitchboardError> {
        queries::cache::delete(self.database()?, key).await
    }

    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> Result<i64, SwitchboardError> {
        queries::cache::incr_with_expiry(self.database()?, key, ttl).await
    }
}

#[async_trait]
impl JobQueue for SqliteStorage {
    async fn push(&self, queue: &str, payload: &str) -> Result<(), SwitchboardError> {
        queries::queue::push(self.database()?, queue, payload).await
    }

    async fn pop(&self, queue: &str) -> Result<String, SwitchboardError> {
        queries::queue::pop(self.database()?, queue, self.poll_interval).await
    }

    async fn try_pop(&self, queue: &str) -> Result<Option<String>, SwitchboardError> {
        queries::queue::try_pop(self.database()?, queue).await
    }

    async fn len(&self, queue: &str) -> Result<u64, SwitchboardError> {
        queries::queue::len(self.database()?, queue).await
    }

    async fn peek_all(&self, queue: &str) -> Result<Vec<String>, SwitchboardError> {
        queries::queue::peek_all(self.database()?, queue).await
    }
}

#[async_trait]
impl WebhookStore for SqliteStorage {
    async fn get_webhook(
        &self,
        instance_id: &str,
    ) -> Result<Option<WebhookConfig>, SwitchboardError> {
        queries::webhooks::get_webhook(self.database()?, instance_id).await
    }

    async fn upsert_webhook(&self, config: &WebhookConfig) -> Result<(), SwitchboardError> {
        queries::webhooks::upsert_webhook(self.database()?, config).await
    }

    async fn delete_webhook(&self, instance_id: &str) -> Result<(), SwitchboardError> {
        queries::webhooks::delete_webhook(self.database()?, instance_id).await
    }
}

#[async_trait]
impl SettingsStore for SqliteStorage {
    async fn get_setting(
        &self,
        instance_id: &str,
        kind: SettingKind,
    ) -> Result<Option<String>, SwitchboardError> {
        queries::settings::get_setting(self.database()?, instance_id, kind).await
    }

    async fn put_setting(
        &self,
        instance_id: &str,
        kind: SettingKind,
        value: &str,
    ) -> Result<(), SwitchboardError> {
        queries::settings::put_setting(self.database()?, instance_id, kind, value).await
    }

    async fn delete_settings(&self, instance_id: &str) -> Result<(), SwitchboardError> {
        queries::settings::delete_settings(self.database()?, instance_id).await
    }
}

#[async_trait]
impl ScheduleStore for SqliteStorage {
    async fn add_scheduled(&self, message: &ScheduledMessage) -> Result<(), SwitchboardError> {
        queries::scheduled::add_scheduled(self.database()?, message).await
    }

    async fn due_scheduled(&self, now: i64) -> Result<Vec<ScheduledMessage>, SwitchboardError> {
        queries::scheduled::due_scheduled(self.database()?, now).await
    }

    async fn remove_scheduled(&self, id: &str) -> Result<(), SwitchboardError> {
        queries::scheduled::remove_scheduled(self.database()?, id).await
    }
}
