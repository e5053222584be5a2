//! Versioned schema migrations.
//!
//! Each entry of [`MIGRATIONS`] upgrades the schema by one version and runs
//! inside the same transaction as the version bump.

use rusqlite::{Connection, Transaction};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::schema::{DEFAULT_DATA, SCHEMA_V1};

/// Migration scripts; index 0 produces version 1.
const MIGRATIONS: &[&[&str]] = &[&[SCHEMA_V1, DEFAULT_DATA]];

#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
const CURRENT_VERSION: i32 = MIGRATIONS.len() as i32;

/// Bring the schema up to [`CURRENT_VERSION`].
pub fn run(conn: &mut Connection) -> DbResult<()> {
    let current = schema_version(conn)?;
    if current > CURRENT_VERSION {
        return Err(DbError::MigrationFailed(format!(
            "database schema v{current} is newer than supported v{CURRENT_VERSION}"
        )));
    }
    if current == CURRENT_VERSION {
        debug!(version = current, "Schema up to date");
        return Ok(());
    }

    info!(from = current, to = CURRENT_VERSION, "Migrating database schema");
    let tx = conn.transaction()?;
    for version in (current + 1)..=CURRENT_VERSION {
        apply(&tx, version)?;
    }
    tx.commit()?;
    Ok(())
}

/// Version recorded in `schema_version`, 0 for a fresh database.
fn schema_version(conn: &Connection) -> DbResult<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_version')",
        [],
        |row| row.get(0),
    )?;
    if !exists {
        return Ok(0);
    }
    Ok(conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| row.get(0))?)
}

fn apply(tx: &Transaction<'_>, version: i32) -> DbResult<()> {
    let scripts = usize::try_from(version - 1)
        .ok()
        .and_then(|i| MIGRATIONS.get(i))
        .ok_or_else(|| DbError::MigrationFailed(format!("Unknown migration version: {version}")))?;
    debug!(version, "Applying migration");
    for script in *scripts {
        tx.execute_batch(script)?;
    }
    tx.execute("INSERT INTO schema_version (version) VALUES (?)", [version])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations() {
        let mut conn = Connection::open_in_memory().expect("Failed to open database");

        run(&mut conn).expect("Migrations failed");

        let version = schema_version(&conn).expect("Failed to read version");
        assert_eq!(version, CURRENT_VERSION);

        // The mute row is seeded
        let count: i32 = conn
            .query_row("SELECT COUNT(*) FROM mute_settings", [], |row| row.get(0))
            .expect("Failed to count mute rows");
        assert_eq!(count, 1);
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let mut conn = Connection::open_in_memory().expect("Failed to open database");
        run(&mut conn).expect("First run failed");
        run(&mut conn).expect("Second run failed");

        let rows: i32 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .expect("Failed to count versions");
        assert_eq!(rows, 1);
    }

    #[test]
    fn test_newer_schema_is_rejected() {
        let mut conn = Connection::open_in_memory().expect("Failed to open database");
        run(&mut conn).expect("Migrations failed");
        conn.execute("INSERT INTO schema_version (version) VALUES (?)", [CURRENT_VERSION + 1])
            .expect("Failed to bump version");

        assert!(matches!(run(&mut conn), Err(DbError::MigrationFailed(_))));
    }
}
