// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tenant rows and their lifecycle columns.

use rusqlite::params;
use rusqlite::types::Type;
use switchboard_core::SwitchboardError;
use switchboard_core::types::{Instance, LifecycleState};

use crate::database::Database;

const SELECT_COLUMNS: &str = "SELECT instance_id, jid, name, webhook_url, status, sync_history,
        last_connected_at, created_at, updated_at
 FROM instances";

fn row_to_instance(row: &rusqlite::Row<'_>) -> rusqlite::Result<Instance> {
    let status: String = row.get(4)?;
    let status = status
        .parse::<LifecycleState>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;
    Ok(Instance {
        instance_id: row.get(0)?,
        jid: row.get(1)?,
        name: row.get(2)?,
        webhook_url: row.get(3)?,
        status,
        sync_history: row.get(5)?,
        last_connected_at: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

pub async fn get_instance(
    db: &Database,
    instance_id: &str,
) -> Result<Option<Instance>, SwitchboardError> {
    let instance_id = instance_id.to_string();
    db.connection()
        .call(move |conn| {
            let sql = format!("{SELECT_COLUMNS} WHERE instance_id = ?1");
            match conn.query_row(&sql, params![instance_id], row_to_instance) {
                Ok(instance) => Ok(Some(instance)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// All tenants, oldest first.
pub async fn list_instances(db: &Database) -> Result<Vec<Instance>, SwitchboardError> {
    db.connection()
        .call(|conn| {
            let sql = format!("{SELECT_COLUMNS} ORDER BY created_at ASC, instance_id ASC");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], row_to_instance)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn upsert_instance(db: &Database, instance: &Instance) -> Result<(), SwitchboardError> {
    let instance = instance.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO instances
                    (instance_id, jid, name, webhook_url, status, sync_history, last_connected_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(instance_id) DO UPDATE SET
                    jid = excluded.jid,
                    name = excluded.name,
                    webhook_url = excluded.webhook_url,
                    status = excluded.status,
                    sync_history = excluded.sync_history,
                    last_connected_at = excluded.last_connected_at,
                    updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![
                    instance.instance_id,
                    instance.jid,
                    instance.name,
                    instance.webhook_url,
                    instance.status.to_string(),
                    instance.sync_history,
                    instance.last_connected_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Removes the tenant and every row scoped to it.
pub async fn delete_instance(db: &Database, instance_id: &str) -> Result<(), SwitchboardError> {
    let instance_id = instance_id.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            for table in [
                "messages",
                "webhooks",
                "settings",
                "scheduled_messages",
                "instances",
            ] {
                tx.execute(
                    &format!("DELETE FROM {table} WHERE instance_id = ?1"),
                    params![instance_id],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn update_status(
    db: &Database,
    instance_id: &str,
    status: LifecycleState,
) -> Result<(), SwitchboardError> {
    let instance_id = instance_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE instances SET status = ?1,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE instance_id = ?2",
                params![status.to_string(), instance_id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn update_jid(
    db: &Database,
    instance_id: &str,
    jid: Option<&str>,
) -> Result<(), SwitchboardError> {
    let instance_id = instance_id.to_string();
    let jid = jid.map(str::to_string);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE instances SET jid = ?1,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE instance_id = ?2",
                params![jid, instance_id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn touch_last_connected(
    db: &Database,
    instance_id: &str,
) -> Result<(), SwitchboardError> {
    let instance_id = instance_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE instances SET
                 last_connected_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE instance_id = ?1",
                params![instance_id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}
