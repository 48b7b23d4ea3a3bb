// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-tenant settings documents (auto-reply, call policy, label rules).

use rusqlite::{OptionalExtension, params};
use switchboard_core::SwitchboardError;
use switchboard_core::types::SettingKind;

use crate::database::Database;

pub async fn get_setting(
    db: &Database,
    instance_id: &str,
    kind: SettingKind,
) -> Result<Option<String>, SwitchboardError> {
    let instance_id = instance_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT value FROM settings WHERE instance_id = ?1 AND kind = ?2",
                params![instance_id, kind.to_string()],
                |row| row.get(0),
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn put_setting(
    db: &Database,
    instance_id: &str,
    kind: SettingKind,
    value: &str,
) -> Result<(), SwitchboardError> {
    let instance_id = instance_id.to_string();
    let value = value.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO settings (instance_id, kind, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT(instance_id, kind) DO UPDATE SET
                    value = excluded.value,
                    updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![instance_id, kind.to_string(), value],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn delete_settings(db: &Database, instance_id: &str) -> Result<(), SwitchboardError> {
    let instance_id = instance_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "DELETE FROM settings WHERE instance_id = ?1",
                params![instance_id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}
