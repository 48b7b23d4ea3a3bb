// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Named FIFO lists backing the outbound job queue and its dead-letter list.
//!
//! Rows are ordered by their autoincrement id: every push lands at the head
//! (highest id) and pops take the tail (lowest id). A job pushed back for a
//! retry therefore waits behind everything already queued.

use std::time::Duration;

use rusqlite::params;
use switchboard_core::SwitchboardError;

use crate::database::Database;

/// Pushes `payload` onto the head of `queue_name` and wakes blocked consumers.
pub async fn push(db: &Database, queue_name: &str, payload: &str) -> Result<(), SwitchboardError> {
    let queue_name = queue_name.to_string();
    let payload = payload.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO queue_items (queue_name, payload) VALUES (?1, ?2)",
                params![queue_name, payload],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)?;
    db.queue_signal().notify_waiters();
    Ok(())
}

/// Removes and returns the oldest entry, or `None` if the list is empty.
///
/// Select and delete share a transaction so two consumers never receive the
/// same entry.
pub async fn try_pop(db: &Database, queue_name: &str) -> Result<Option<String>, SwitchboardError> {
    let queue_name = queue_name.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let result = tx.query_row(
                "SELECT id, payload FROM queue_items
                 WHERE queue_name = ?1
                 ORDER BY id ASC
                 LIMIT 1",
                params![queue_name],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            );
            match result {
                Ok((id, payload)) => {
                    tx.execute("DELETE FROM queue_items WHERE id = ?1", params![id])?;
                    tx.commit()?;
                    Ok(Some(payload))
                }
                Err(rusqlite::Error::QueryReturnedNoRows) => {
                    tx.commit()?;
                    Ok(None)
                }
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Pops the oldest entry, waiting while the list is empty.
///
/// Wakes on every push and also re-checks every `poll_interval`, which
/// covers pushes made by another process sharing the file.
pub async fn pop(
    db: &Database,
    queue_name: &str,
    poll_interval: Duration,
) -> Result<String, SwitchboardError> {
    loop {
        let notified = db.queue_signal().notified();
        tokio::pin!(notified);
        // Register before checking so a push between the check and the wait
        // is not missed.
        notified.as_mut().enable();

        if let Some(payload) = try_pop(db, queue_name).await? {
            return Ok(payload);
        }

        tokio::select! {
            _ = &mut notified => {}
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }
}

pub async fn len(db: &Database, queue_name: &str) -> Result<u64, SwitchboardError> {
    let queue_name = queue_name.to_string();
    db.connection()
        .call(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM queue_items WHERE queue_name = ?1",
                params![queue_name],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Entries oldest first, without removing them.
pub async fn peek_all(db: &Database, queue_name: &str) -> Result<Vec<String>, SwitchboardError> {
    let queue_name = queue_name.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT payload FROM queue_items WHERE queue_name = ?1 ORDER BY id ASC",
            )?;
            let rows = stmt
                .query_map(params![queue_name], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(crate::database::map_tr_err)
}
