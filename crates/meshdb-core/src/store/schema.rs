//! Schema management and migrations.
//!
//! Migrations are versioned and applied idempotently when a store is opened.
//! A migration failure is surfaced to the caller and must be treated as fatal:
//! the store never serves requests on a half-migrated database.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::Result;

/// Schema version - increment when making schema changes.
const SCHEMA_VERSION: i64 = 1;

/// Apply all pending migrations.
pub fn apply_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current = current_version(conn)?;
    debug!(current, latest = SCHEMA_VERSION, "checking migrations");

    if current < 1 {
        apply_migration_v1(conn)?;
    }

    Ok(())
}

fn current_version(conn: &Connection) -> Result<i64> {
    let version: Option<i64> =
        conn.query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
            row.get(0)
        })?;
    Ok(version.unwrap_or(0))
}

fn record_migration(conn: &Connection, version: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO schema_migrations (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

/// Migration v1: base node and edge tables.
///
/// Identity columns use AUTOINCREMENT so ids are monotonic and never reused,
/// even after deletes. The lexical index is a derived structure and is owned
/// by [`crate::store::fts`], not by a migration.
fn apply_migration_v1(conn: &Connection) -> Result<()> {
    debug!("applying migration v1: base graph schema");

    conn.execute_batch(SCHEMA_V1)?;
    record_migration(conn, 1)?;

    info!("migration v1 applied");
    Ok(())
}

const SCHEMA_V1: &str = "
CREATE TABLE IF NOT EXISTS nodes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    label TEXT NOT NULL DEFAULT '',
    properties TEXT NOT NULL DEFAULT '{}',
    created_at INTEGER NOT NULL DEFAULT (unixepoch()),
    updated_at INTEGER NOT NULL DEFAULT (unixepoch())
);

CREATE TABLE IF NOT EXISTS edges (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    label TEXT NOT NULL DEFAULT '',
    properties TEXT NOT NULL DEFAULT '{}',
    weight INTEGER NOT NULL DEFAULT 0,
    from_id INTEGER NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
    to_id INTEGER NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
    created_at INTEGER NOT NULL DEFAULT (unixepoch()),
    updated_at INTEGER NOT NULL DEFAULT (unixepoch())
);

CREATE INDEX IF NOT EXISTS idx_edges_from ON edges(from_id);
CREATE INDEX IF NOT EXISTS idx_edges_to ON edges(to_id);
";
