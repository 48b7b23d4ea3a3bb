// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message persistence. Inserts are idempotent on `(instance_id, id)`.

use rusqlite::params;
use switchboard_core::SwitchboardError;
use switchboard_core::types::StoredMessage;

use crate::database::Database;

/// Inserts a message unless one with the same id already exists for the tenant.
///
/// Returns `true` when a row was written.
pub async fn insert_message(
    db: &Database,
    message: &StoredMessage,
) -> Result<bool, SwitchboardError> {
    let m = message.clone();
    db.connection()
        .call(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO messages
                    (instance_id, id, chat, sender, from_me, message_type, content,
                     push_name, timestamp, status, media)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    m.instance_id,
                    m.id,
                    m.chat,
                    m.sender,
                    m.from_me,
                    m.message_type,
                    m.content,
                    m.push_name,
                    m.timestamp,
                    m.status,
                    m.media,
                ],
            )?;
            Ok(inserted > 0)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn get_message(
    db: &Database,
    instance_id: &str,
    message_id: &str,
) -> Result<Option<StoredMessage>, SwitchboardError> {
    let instance_id = instance_id.to_string();
    let message_id = message_id.to_string();
    db.connection()
        .call(move |conn| {
            let result = conn.query_row(
                "SELECT id, instance_id, chat, sender, from_me, message_type, content,
                        push_name, timestamp, status, media
                 FROM messages WHERE instance_id = ?1 AND id = ?2",
                params![instance_id, message_id],
                |row| {
                    Ok(StoredMessage {
                        id: row.get(0)?,
                        instance_id: row.get(1)?,
                        chat: row.get(2)?,
                        sender: row.get(3)?,
                        from_me: row.get(4)?,
                        message_type: row.get(5)?,
                        content: row.get(6)?,
                        push_name: row.get(7)?,
                        timestamp: row.get(8)?,
                        status: row.get(9)?,
                        media: row.get(10)?,
                    })
                },
            );
            match result {
                Ok(message) => Ok(Some(message)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}
