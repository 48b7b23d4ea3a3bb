// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scheduled text sends, polled by the scheduler.

use rusqlite::params;
use switchboard_core::SwitchboardError;
use switchboard_core::types::ScheduledMessage;

use crate::database::Database;

pub async fn add_scheduled(
    db: &Database,
    message: &ScheduledMessage,
) -> Result<(), SwitchboardError> {
    let m = message.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO scheduled_messages (id, instance_id, phone, message, execute_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![m.id, m.instance_id, m.phone, m.message, m.execute_at],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Entries due at or before `now` (unix seconds), oldest first.
pub async fn due_scheduled(
    db: &Database,
    now: i64,
) -> Result<Vec<ScheduledMessage>, SwitchboardError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, instance_id, phone, message, execute_at
                 FROM scheduled_messages
                 WHERE execute_at <= ?1
                 ORDER BY execute_at ASC, created_at ASC",
            )?;
            let rows = stmt
                .query_map(params![now], |row| {
                    Ok(ScheduledMessage {
                        id: row.get(0)?,
                        instance_id: row.get(1)?,
                        phone: row.get(2)?,
                        message: row.get(3)?,
                        execute_at: row.get(4)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn remove_scheduled(db: &Database, id: &str) -> Result<(), SwitchboardError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "DELETE FROM scheduled_messages WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}
