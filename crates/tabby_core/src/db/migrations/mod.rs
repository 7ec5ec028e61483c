//! Ordered schema steps for the store file.
//!
//! Pending steps run inside one transaction, so an upgrade lands completely
//! or not at all. Step versions must stay strictly increasing.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::Connection;

const SCHEMA_STEPS: &[(u32, &str)] = &[(1, include_str!("0001_blobs.sql"))];

/// Schema version produced by the last known step.
pub fn latest_version() -> u32 {
    SCHEMA_STEPS.last().map_or(0, |(version, _)| *version)
}

/// Schema version recorded in the database.
pub fn schema_version(conn: &Connection) -> DbResult<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

/// Applies every step newer than the recorded version.
///
/// Returns the number of steps applied.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<usize> {
    let found = schema_version(conn)?;
    let supported = latest_version();
    if found > supported {
        return Err(DbError::UnsupportedSchemaVersion { found, supported });
    }

    let pending: Vec<(u32, &str)> = SCHEMA_STEPS
        .iter()
        .copied()
        .filter(|(version, _)| *version > found)
        .collect();
    if pending.is_empty() {
        return Ok(0);
    }

    let tx = conn.transaction()?;
    for &(version, sql) in &pending {
        tx.execute_batch(sql)
            .map_err(|source| DbError::Migration { version, source })?;
        tx.pragma_update(None, "user_version", version)?;
        info!("event=schema_migrate module=db status=ok from={found} version={version}");
    }
    tx.commit()?;
    Ok(pending.len())
}
