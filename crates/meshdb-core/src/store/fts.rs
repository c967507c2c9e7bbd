//! Lexical index setup and synchronization.
//!
//! One FTS5 table covers both record kinds, discriminated by a `kind` column.
//! Entries are derived wholesale from the base tables: AFTER INSERT/UPDATE/
//! DELETE triggers recompute the entry for a record whenever the record
//! changes, inside the caller's transaction, so the index is never observably
//! stale relative to a committed record. The flatten helpers the triggers
//! call are registered on the connection at open — explicit injection at
//! engine-initialization time, nothing process-global.

use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::Result;
use crate::models::Properties;

/// Configuration for the lexical index table.
#[derive(Debug, Clone)]
pub struct FtsConfig {
    /// Name of the FTS5 virtual table.
    pub table_name: String,
    /// Tokenizer configuration. The default lowercases and stems words.
    pub tokenizer: String,
}

impl Default for FtsConfig {
    fn default() -> Self {
        Self {
            table_name: "fts".to_string(),
            tokenizer: "porter unicode61".to_string(),
        }
    }
}

/// The two base tables mirrored into the index.
const SOURCES: &[(&str, &str)] = &[("nodes", "node"), ("edges", "edge")];

/// Register the deterministic scalar functions the sync triggers call.
///
/// `flatten_keys(json)` / `flatten_values(json)` decode a property bag and
/// return its sorted, space-joined key-tokens / value-tokens.
pub fn register_functions(conn: &Connection) -> Result<()> {
    debug!("registering flatten scalar functions");

    conn.create_scalar_function(
        "flatten_keys",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| flatten_argument(ctx).map(|(keys, _)| keys),
    )?;

    conn.create_scalar_function(
        "flatten_values",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| flatten_argument(ctx).map(|(_, values)| values),
    )?;

    Ok(())
}

fn flatten_argument(ctx: &rusqlite::functions::Context<'_>) -> rusqlite::Result<(String, String)> {
    let text: String = ctx.get(0)?;
    let props = Properties::from_json(&text)
        .map_err(|e| rusqlite::Error::UserFunctionError(Box::new(e)))?;
    Ok(props.flatten())
}

/// Manager for index setup, synchronization triggers, and recovery.
pub struct FtsManager<'a> {
    config: &'a FtsConfig,
}

impl<'a> FtsManager<'a> {
    pub fn new(config: &'a FtsConfig) -> Self {
        Self { config }
    }

    /// Check if the index table exists.
    pub fn table_exists(&self, conn: &Connection) -> Result<bool> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [&self.config.table_name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Check if the synchronization triggers exist.
    pub fn triggers_exist(&self, conn: &Connection) -> Result<bool> {
        let trigger_name = format!("{}_nodes_ai", self.config.table_name);
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'trigger' AND name = ?1",
            [&trigger_name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Ensure the index and its triggers are fully set up.
    pub fn ensure_setup(&self, conn: &Connection) -> Result<()> {
        if !self.table_exists(conn)? {
            self.create_table(conn)?;
            self.populate(conn)?;
        } else if !self.triggers_exist(conn)? {
            // Table exists but triggers are missing - the index may have
            // drifted, so repopulate before re-arming the triggers.
            self.populate(conn)?;
        }

        self.create_triggers(conn)?;
        Ok(())
    }

    /// Create the FTS5 virtual table.
    ///
    /// `id` and `kind` are join/filter columns, not searchable text, so they
    /// stay out of the token index (UNINDEXED) and cannot pollute ranking.
    pub fn create_table(&self, conn: &Connection) -> Result<()> {
        let sql = format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS {} USING fts5(
                id UNINDEXED,
                kind UNINDEXED,
                label,
                keys,
                vals,
                tokenize='{}'
            )",
            self.config.table_name, self.config.tokenizer
        );

        conn.execute(&sql, [])?;
        info!(table = %self.config.table_name, "created lexical index table");
        Ok(())
    }

    /// Create the synchronization triggers for both base tables.
    ///
    /// An update is delete-then-insert of the index row; entries are never
    /// edited in place. The delete side is a plain `DELETE ... WHERE`, which
    /// is a no-op when no entry exists.
    pub fn create_triggers(&self, conn: &Connection) -> Result<()> {
        let fts = &self.config.table_name;

        for (table, kind) in SOURCES {
            let insert_entry = format!(
                "INSERT INTO {fts} (id, kind, label, keys, vals)
                 VALUES (NEW.id, '{kind}', NEW.label,
                         flatten_keys(NEW.properties), flatten_values(NEW.properties));"
            );

            conn.execute(
                &format!(
                    "CREATE TRIGGER IF NOT EXISTS {fts}_{table}_ai AFTER INSERT ON {table} BEGIN
                        {insert_entry}
                    END"
                ),
                [],
            )?;

            conn.execute(
                &format!(
                    "CREATE TRIGGER IF NOT EXISTS {fts}_{table}_au AFTER UPDATE ON {table} BEGIN
                        DELETE FROM {fts} WHERE id = OLD.id AND kind = '{kind}';
                        {insert_entry}
                    END"
                ),
                [],
            )?;

            conn.execute(
                &format!(
                    "CREATE TRIGGER IF NOT EXISTS {fts}_{table}_ad AFTER DELETE ON {table} BEGIN
                        DELETE FROM {fts} WHERE id = OLD.id AND kind = '{kind}';
                    END"
                ),
                [],
            )?;
        }

        debug!(table = %fts, "created index sync triggers");
        Ok(())
    }

    /// Repopulate the index from the base tables.
    pub fn populate(&self, conn: &Connection) -> Result<()> {
        let fts = &self.config.table_name;

        conn.execute_batch(&format!("DELETE FROM {fts};"))?;

        for (table, kind) in SOURCES {
            conn.execute(
                &format!(
                    "INSERT INTO {fts} (id, kind, label, keys, vals)
                     SELECT id, '{kind}', label, flatten_keys(properties), flatten_values(properties)
                     FROM {table}"
                ),
                [],
            )?;
        }

        info!(table = %fts, "populated lexical index from base tables");
        Ok(())
    }

    /// Rebuild the index completely: drop, recreate, repopulate.
    ///
    /// This is the recovery procedure for a corrupt or inconsistent index;
    /// the index is derived state and can be rebuilt from the base tables at
    /// any time.
    pub fn rebuild(&self, conn: &Connection) -> Result<()> {
        let fts = &self.config.table_name;

        for (table, _) in SOURCES {
            for suffix in ["ai", "au", "ad"] {
                conn.execute(
                    &format!("DROP TRIGGER IF EXISTS {fts}_{table}_{suffix}"),
                    [],
                )?;
            }
        }
        conn.execute(&format!("DROP TABLE IF EXISTS {fts}"), [])?;

        self.create_table(conn)?;
        self.create_triggers(conn)?;
        self.populate(conn)?;

        info!(table = %fts, "rebuilt lexical index");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::schema;

    fn create_test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        schema::apply_migrations(&conn).unwrap();
        register_functions(&conn).unwrap();
        conn
    }

    #[test]
    fn setup_creates_table_and_triggers() {
        let conn = create_test_conn();
        let config = FtsConfig::default();
        let manager = FtsManager::new(&config);

        assert!(!manager.table_exists(&conn).unwrap());

        manager.ensure_setup(&conn).unwrap();

        assert!(manager.table_exists(&conn).unwrap());
        assert!(manager.triggers_exist(&conn).unwrap());
    }

    #[test]
    fn triggers_mirror_node_writes() {
        let conn = create_test_conn();
        let config = FtsConfig::default();
        FtsManager::new(&config).ensure_setup(&conn).unwrap();

        conn.execute(
            "INSERT INTO nodes (label, properties) VALUES (?1, ?2)",
            ["person", r#"{"name": "foo", "meta": {"age": 21}}"#],
        )
        .unwrap();

        let (kind, label, keys, vals): (String, String, String, String) = conn
            .query_row(
                "SELECT kind, label, keys, vals FROM fts WHERE id = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .unwrap();
        assert_eq!(kind, "node");
        assert_eq!(label, "person");
        assert_eq!(keys, "meta meta.age name");
        assert_eq!(vals, "21 foo");

        // Replace rewrites the entry wholesale.
        conn.execute(
            "UPDATE nodes SET properties = ?1 WHERE id = 1",
            [r#"{"name": "bar"}"#],
        )
        .unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM fts WHERE id = 1", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);

        let vals: String = conn
            .query_row("SELECT vals FROM fts WHERE id = 1", [], |row| row.get(0))
            .unwrap();
        assert_eq!(vals, "bar");

        // Delete removes the entry.
        conn.execute("DELETE FROM nodes WHERE id = 1", []).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM fts", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn rebuild_rederives_entries_from_base_tables() {
        let conn = create_test_conn();
        let config = FtsConfig::default();
        let manager = FtsManager::new(&config);
        manager.ensure_setup(&conn).unwrap();

        conn.execute(
            "INSERT INTO nodes (label, properties) VALUES ('person', '{\"name\": \"foo\"}')",
            [],
        )
        .unwrap();

        // Corrupt the derived state, then rebuild from scratch.
        conn.execute_batch("DELETE FROM fts;").unwrap();
        manager.rebuild(&conn).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM fts WHERE kind = 'node'", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(count, 1);
    }
}
