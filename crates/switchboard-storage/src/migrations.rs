// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Schema migrations embedded from `migrations/` at build time.

use switchboard_core::SwitchboardError;

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

/// Applies pending migrations. Already-applied versions are skipped, so this
/// runs on every open.
pub fn run_migrations(conn: &mut rusqlite::Connection) -> Result<(), SwitchboardError> {
    let report = embedded::migrations::runner()
        .run(conn)
        .map_err(|e| SwitchboardError::Storage {
            source: Box::new(e),
        })?;

    let applied = report.applied_migrations();
    for migration in applied {
        tracing::info!(
            version = migration.version(),
            name = migration.name(),
            "applied migration"
        );
    }
    if applied.is_empty() {
        tracing::debug!("schema up to date");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rerun_is_a_no_op() {
        let mut conn = rusqlite::Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();
        run_migrations(&mut conn).unwrap();

        let queues: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'queue_items'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(queues, 1);
    }
}
