//! Schema versioning for the hearth database.
//!
//! `PRAGMA user_version` holds the number of the last applied step.  Opening a
//! store applies every step above it, in order, and refuses a file written by
//! a newer build.

pub mod v001_initial;

use rusqlite::Connection;

use crate::error::{Result, StorageError};

type Step = fn(&Connection) -> rusqlite::Result<()>;

/// Ordered schema steps.  Append only; the version of a step is its position.
const STEPS: &[(&str, Step)] = &[("v001_initial", v001_initial::up)];

/// Schema version a fully migrated database reports.
pub const CURRENT_VERSION: u32 = STEPS.len() as u32;

pub fn run_migrations(conn: &Connection) -> Result<()> {
    let found: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if found > CURRENT_VERSION {
        return Err(StorageError::Migration(format!(
            "database schema v{found} is newer than supported v{CURRENT_VERSION}"
        )));
    }
    if found == CURRENT_VERSION {
        tracing::debug!(version = found, "schema up to date");
        return Ok(());
    }

    for (index, (name, up)) in STEPS.iter().enumerate().skip(found as usize) {
        let version = index as u32 + 1;
        tracing::info!(version, step = name, "migrating schema");
        up(conn).map_err(|e| StorageError::Migration(format!("{name}: {e}")))?;
        conn.pragma_update(None, "user_version", version)?;
    }

    Ok(())
}
