//! Versioned schema for the indexed backend.
//!
//! # Invariants
//! - Versions are strictly increasing and never edited once released.
//! - Migrations only add tables and indexes; existing rows are kept.
//! - Pending migrations run in one transaction.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::Connection;

/// `(version, script)` pairs in apply order.
const SCHEMA_STEPS: &[(u32, &str)] = &[
    (1, include_str!("0001_collections.sql")),
    (2, include_str!("0002_secondary_indexes.sql")),
];

/// Latest schema version this build understands.
pub fn latest_version() -> u32 {
    SCHEMA_STEPS.last().map_or(0, |(version, _)| *version)
}

/// Brings the store to [`latest_version`].
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    migrate_to(conn, latest_version())
}

/// Applies pending steps up to and including `target`.
///
/// Public so an upgrade can be exercised from an older schema.
pub fn migrate_to(conn: &mut Connection, target: u32) -> DbResult<()> {
    let found = current_version(conn)?;
    let supported = latest_version();
    if found > supported {
        return Err(DbError::UnsupportedSchemaVersion { found, supported });
    }

    let pending: Vec<_> = SCHEMA_STEPS
        .iter()
        .filter(|(version, _)| *version > found && *version <= target)
        .collect();
    if pending.is_empty() {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for (version, script) in &pending {
        tx.execute_batch(script)
            .and_then(|()| tx.pragma_update(None, "user_version", *version))
            .map_err(|source| DbError::Migration {
                version: *version,
                source,
            })?;
    }
    tx.commit()?;

    info!(
        "event=schema_migrate module=db status=ok from={} to={} steps={}",
        found,
        target.min(supported),
        pending.len()
    );
    Ok(())
}

/// Reads `PRAGMA user_version`.
pub fn current_version(conn: &Connection) -> DbResult<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}
