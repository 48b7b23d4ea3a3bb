// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-tenant webhook configuration rows.

use rusqlite::params;
use rusqlite::types::Type;
use switchboard_core::SwitchboardError;
use switchboard_core::types::WebhookConfig;

use crate::database::Database;

pub async fn get_webhook(
    db: &Database,
    instance_id: &str,
) -> Result<Option<WebhookConfig>, SwitchboardError> {
    let instance_id = instance_id.to_string();
    db.connection()
        .call(move |conn| {
            let result = conn.query_row(
                "SELECT instance_id, url, events, secret, enabled, created_at, updated_at
                 FROM webhooks WHERE instance_id = ?1",
                params![instance_id],
                |row| {
                    let events: String = row.get(2)?;
                    let events: Vec<String> = serde_json::from_str(&events).map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e))
                    })?;
                    Ok(WebhookConfig {
                        instance_id: row.get(0)?,
                        url: row.get(1)?,
                        events,
                        secret: row.get(3)?,
                        enabled: row.get(4)?,
                        created_at: row.get(5)?,
                        updated_at: row.get(6)?,
                    })
                },
            );
            match result {
                Ok(config) => Ok(Some(config)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Replaces the tenant's configuration wholesale, keeping `created_at`.
pub async fn upsert_webhook(db: &Database, config: &WebhookConfig) -> Result<(), SwitchboardError> {
    let config = config.clone();
    let events = serde_json::to_string(&config.events)
        .map_err(|e| SwitchboardError::Internal(format!("encode webhook events: {e}")))?;
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO webhooks (instance_id, url, events, secret, enabled)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(instance_id) DO UPDATE SET
                    url = excluded.url,
                    events = excluded.events,
                    secret = excluded.secret,
                    enabled = excluded.enabled,
                    updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![
                    config.instance_id,
                    config.url,
                    events,
                    config.secret,
                    config.enabled
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn delete_webhook(db: &Database, instance_id: &str) -> Result<(), SwitchboardError> {
    let instance_id = instance_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "DELETE FROM webhooks WHERE instance_id = ?1",
                params![instance_id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}
