//! Database schema migrations.
//!
//! Migrations are versioned and applied automatically when the store is opened.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, OptionalExtension, Result as SqliteResult};
use tracing::info;

/// Current schema version. Increment when adding a migration.
pub const SCHEMA_VERSION: i32 = 1;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if any migration statement fails; the failing migration is
/// rolled back and the recorded version is left unchanged.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )?;

    let current_version = schema_version(conn)?;

    if current_version < 1 {
        migrate_v1(conn)?;
    }

    Ok(())
}

/// Read the recorded schema version; 0 for a fresh database.
pub fn schema_version(conn: &Connection) -> SqliteResult<i32> {
    Ok(conn
        .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
            row.get::<_, Option<i32>>(0)
        })
        .optional()?
        .flatten()
        .unwrap_or(0))
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Migration v1: users, rules and materialized instances.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL,
            email       TEXT NOT NULL UNIQUE,
            department  TEXT,
            role        TEXT NOT NULL DEFAULT 'USER',
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS availability_rules (
            id          TEXT PRIMARY KEY,
            user_id     TEXT NOT NULL,
            start_date  TEXT NOT NULL,
            end_date    TEXT,
            time_start  TEXT NOT NULL,
            time_end    TEXT NOT NULL,
            status      TEXT NOT NULL,
            description TEXT,
            freq        TEXT NOT NULL,
            interval    INTEGER NOT NULL DEFAULT 1 CHECK (interval >= 1),
            by_day      TEXT NOT NULL DEFAULT '',
            -- end_date is rewritten by range repair; until keeps the requested end.
            until       TEXT,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS availability_instances (
            id             TEXT PRIMARY KEY,
            rule_id        TEXT REFERENCES availability_rules(id) ON DELETE CASCADE,
            user_id        TEXT NOT NULL,
            instance_date  TEXT NOT NULL,
            time_start     TEXT NOT NULL,
            time_end       TEXT NOT NULL,
            status         TEXT NOT NULL,
            description    TEXT,
            exception_type TEXT CHECK (exception_type IN ('modified', 'deleted')),
            created_at     TEXT NOT NULL,
            updated_at     TEXT NOT NULL
        );

        -- NULL rule_id values are distinct, so standalone rows never collide.
        CREATE UNIQUE INDEX IF NOT EXISTS idx_instances_rule_date
            ON availability_instances(rule_id, instance_date);
        CREATE INDEX IF NOT EXISTS idx_instances_user_date
            ON availability_instances(user_id, instance_date);
        CREATE INDEX IF NOT EXISTS idx_rules_user
            ON availability_rules(user_id);",
    )?;

    set_schema_version(&tx, 1)?;
    tx.commit()?;
    info!(version = 1, "applied schema migration");
    Ok(())
}
