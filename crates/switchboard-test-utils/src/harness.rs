// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for cross-crate integration testing.
//!
//! `TestHarness` owns a temp SQLite database plus the mock capabilities the
//! instance manager, queue worker and gateway are built from. The consuming
//! test assembles those components itself so this crate stays below them in
//! the dependency graph.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use switchboard_config::SwitchboardConfig;
use switchboard_core::{StorageAdapter, SwitchboardError};
use switchboard_storage::SqliteStorage;

use crate::mock_session::MockSessionFactory;
use crate::recording::{RecordingBroadcaster, RecordingSink};

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    config: SwitchboardConfig,
    poll_interval: Duration,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        let mut config = SwitchboardConfig::default();
        // No real waiting in tests unless a test asks for it.
        config.queue.backoff_secs = 0;
        config.session.auto_reply_delay_ms = 0;
        config.session.call_reply_delay_ms = 0;
        config.session.qr_poll_interval_ms = 20;
        config.server.api_key = Some("test-key".to_string());
        Self {
            config,
            poll_interval: Duration::from_millis(20),
        }
    }

    /// Replace the whole configuration.
    pub fn with_config(mut self, config: SwitchboardConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the queue retry limit.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.config.queue.max_retries = max_retries;
        self
    }

    /// Set the rate limit to `requests` per `window_secs`.
    pub fn with_rate_limit(mut self, requests: u32, window_secs: u64) -> Self {
        self.config.rate_limit.requests = requests;
        self.config.rate_limit.window_secs = window_secs;
        self
    }

    /// Build the harness, creating and migrating the temp database.
    pub async fn build(self) -> Result<TestHarness, SwitchboardError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| SwitchboardError::Storage { source: e.into() })?;
        let db_path = temp_dir.path().join("test.db");

        let mut config = self.config;
        config.storage.database_path = db_path.to_string_lossy().to_string();

        let storage =
            SqliteStorage::new(config.storage.clone()).with_poll_interval(self.poll_interval);
        storage.initialize().await?;

        Ok(TestHarness {
            storage: Arc::new(storage),
            factory: Arc::new(MockSessionFactory::new()),
            sink: Arc::new(RecordingSink::new()),
            broadcaster: RecordingBroadcaster::new(),
            config,
            _temp_dir: temp_dir,
        })
    }
}

/// Temp storage and mock capabilities for one test.
pub struct TestHarness {
    /// Initialized storage over a fresh database file.
    pub storage: Arc<SqliteStorage>,
    pub factory: Arc<MockSessionFactory>,
    /// Records webhook events instead of POSTing them.
    pub sink: Arc<RecordingSink>,
    pub broadcaster: RecordingBroadcaster,
    /// Defaults tuned for tests (zero backoff and delays, an API key set).
    pub config: SwitchboardConfig,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Renames `table` away so every later query against it fails.
    pub async fn break_table(&self, table: &str) -> Result<(), SwitchboardError> {
        let sql = format!("ALTER TABLE {table} RENAME TO {table}_broken");
        self.storage
            .database()?
            .connection()
            .call(move |conn| conn.execute_batch(&sql))
            .await
            .map_err(switchboard_storage::database::map_tr_err)
    }
}

/// Polls `condition` every 10ms until it returns true or `timeout` elapses.
///
/// Returns whether the condition was met.
pub async fn wait_until<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
