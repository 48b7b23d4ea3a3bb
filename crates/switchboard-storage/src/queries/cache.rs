// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Key-value cache with optional expiry.
//!
//! Expired rows are treated as absent on read and replaced on write; they are
//! not swept in the background.

use std::time::Duration;

use rusqlite::{OptionalExtension, params};
use switchboard_core::SwitchboardError;

use crate::database::{Database, now_millis};

fn expiry(ttl: Option<Duration>) -> Option<i64> {
    ttl.map(|ttl| now_millis() + ttl.as_millis() as i64)
}

pub async fn get(db: &Database, key: &str) -> Result<Option<String>, SwitchboardError> {
    let key = key.to_string();
    let now = now_millis();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT value FROM cache
                 WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
                params![key, now],
                |row| row.get(0),
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn set(
    db: &Database,
    key: &str,
    value: &str,
    ttl: Option<Duration>,
) -> Result<(), SwitchboardError> {
    let key = key.to_string();
    let value = value.to_string();
    let expires_at = expiry(ttl);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO cache (key, value, expires_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    expires_at = excluded.expires_at",
                params![key, value, expires_at],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn delete(db: &Database, key: &str) -> Result<(), SwitchboardError> {
    let key = key.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute("DELETE FROM cache WHERE key = ?1", params![key])?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Increments the counter at `key`. A missing or expired key restarts at 1
/// with a fresh `ttl`; later increments keep the original expiry.
pub async fn incr_with_expiry(
    db: &Database,
    key: &str,
    ttl: Duration,
) -> Result<i64, SwitchboardError> {
    let key = key.to_string();
    let now = now_millis();
    let expires_at = now + ttl.as_millis() as i64;
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM cache WHERE key = ?1 AND expires_at IS NOT NULL AND expires_at <= ?2",
                params![key, now],
            )?;
            tx.execute(
                "INSERT OR IGNORE INTO cache (key, value, expires_at) VALUES (?1, '0', ?2)",
                params![key, expires_at],
            )?;
            tx.execute(
                "UPDATE cache SET value = CAST(CAST(value AS INTEGER) + 1 AS TEXT) WHERE key = ?1",
                params![key],
            )?;
            let value: String =
                tx.query_row("SELECT value FROM cache WHERE key = ?1", params![key], |row| {
                    row.get(0)
                })?;
            tx.commit()?;
            Ok(value.parse::<i64>().unwrap_or(0))
        })
        .await
        .map_err(crate::database::map_tr_err)
}
