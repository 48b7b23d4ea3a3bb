// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background thread.
//! Do NOT create additional Connection instances for writes.

use std::path::Path;
use std::sync::Arc;

use switchboard_core::SwitchboardError;
use tokio::sync::Notify;
use tracing::debug;

/// Per-connection settings. `journal_mode` persists in the file, the rest do not.
const CONNECTION_PRAGMAS: &str = "
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = NORMAL;
    PRAGMA foreign_keys = ON;
    PRAGMA busy_timeout = 5000;
";

/// Handle to the gateway database.
///
/// Cloning is cheap; clones share the background connection thread and the
/// queue wake-up signal.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
    queue_signal: Arc<Notify>,
}

impl Database {
    /// Opens (creating if needed) the database at `path` and applies migrations.
    pub async fn open(path: &str) -> Result<Self, SwitchboardError> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| SwitchboardError::Storage {
                source: Box::new(e),
            })?;
        }

        // Migrations need an owned `&mut Connection`, so they run on a plain
        // connection before the async handle is opened.
        let migrate_path = path.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), SwitchboardError> {
            let mut conn =
                rusqlite::Connection::open(&migrate_path).map_err(|e| SwitchboardError::Storage {
                    source: Box::new(e),
                })?;
            conn.execute_batch(CONNECTION_PRAGMAS)
                .map_err(|e| SwitchboardError::Storage {
                    source: Box::new(e),
                })?;
            crate::migrations::run_migrations(&mut conn)
        })
        .await
        .map_err(|e| SwitchboardError::Internal(format!("migration task failed: {e}")))??;

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| SwitchboardError::Storage {
                source: Box::new(e),
            })?;
        conn.call(|conn| -> Result<(), rusqlite::Error> {
            conn.execute_batch(CONNECTION_PRAGMAS)?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        debug!(path, "database opened");
        Ok(Self {
            conn,
            queue_signal: Arc::new(Notify::new()),
        })
    }

    /// The async connection all queries go through.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Wakes blocked queue consumers after a push.
    pub(crate) fn queue_signal(&self) -> &Notify {
        &self.queue_signal
    }

    /// Checkpoints the WAL so the main file is self-contained.
    pub async fn close(&self) -> Result<(), SwitchboardError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}

/// Maps a tokio-rusqlite error into the gateway error type.
///
/// Lock contention is surfaced as transient so callers may retry.
pub fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> SwitchboardError {
    let message = e.to_string();
    if message.contains("database is locked") || message.contains("database is busy") {
        return SwitchboardError::Transient {
            message,
            source: Some(Box::new(e)),
        };
    }
    SwitchboardError::Storage {
        source: Box::new(e),
    }
}

/// Current unix time in milliseconds, the unit cache expiries are stored in.
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
