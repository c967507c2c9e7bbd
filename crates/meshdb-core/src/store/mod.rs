//! The graph repository: SQLite-backed nodes and edges with a synchronized
//! FTS5 lexical index.
//!
//! A [`Store`] wraps a single connection behind a mutex, so write
//! transactions are serialized — the deliberate "at most one writer" policy
//! for a single-file embedded engine. All operations are synchronous and
//! complete (or fail) before returning; there is no background work and no
//! in-process cache.

pub mod fts;
pub mod schema;
mod search;

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use tracing::{debug, info};

use crate::cancel::CancellationToken;
use crate::error::{Result, StoreError};
use crate::models::{Edge, Node, Properties};

use fts::{FtsConfig, FtsManager};
pub use search::{SnippetOptions, DEFAULT_LIMIT, MAX_LIMIT};

/// SQLite-backed graph store.
///
/// Cloning is cheap and shares the underlying connection.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
    fts_config: FtsConfig,
}

impl Store {
    /// Open (or create) a store at the given DSN.
    ///
    /// `":memory:"` opens an in-memory database. Migrations are applied and
    /// the lexical index is set up before the store is returned; a failure
    /// here is fatal and the store never serves requests on it.
    pub fn open(dsn: &str) -> Result<Self> {
        info!(dsn, "opening store");

        let conn = if dsn == ":memory:" {
            Connection::open_in_memory()?
        } else {
            if let Some(parent) = Path::new(dsn).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        StoreError::storage(format!(
                            "failed to create {}: {e}",
                            parent.display()
                        ))
                    })?;
                }
            }
            Connection::open(dsn)?
        };

        Self::from_connection(conn)
    }

    /// Open an in-memory store. Handy for tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA foreign_keys=ON;
            PRAGMA busy_timeout=30000;
            PRAGMA temp_store=MEMORY;
            ",
        )?;

        schema::apply_migrations(&conn)?;
        fts::register_functions(&conn)?;

        let fts_config = FtsConfig::default();
        FtsManager::new(&fts_config).ensure_setup(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            fts_config,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::storage("connection lock poisoned"))
    }

    /// Insert or replace a batch of nodes in one transaction.
    ///
    /// Records with `id == 0` get a server-assigned identity; records with an
    /// existing id have their label and properties replaced, id preserved.
    /// The whole batch succeeds or rolls back, lexical-index updates
    /// included. Returned nodes are read back from the write itself, so the
    /// caller observes the canonicized stored form and final ids.
    pub fn upsert_nodes(&self, token: &CancellationToken, nodes: Vec<Node>) -> Result<Vec<Node>> {
        token.check()?;
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let mut stored = Vec::with_capacity(nodes.len());
        for node in &nodes {
            token.check()?;
            stored.push(upsert_node_tx(&tx, node)?);
        }

        tx.commit()?;
        debug!(count = stored.len(), "upserted nodes");
        Ok(stored)
    }

    /// Insert or replace a batch of edges in one transaction.
    ///
    /// Same contract as [`Store::upsert_nodes`]; additionally both endpoint
    /// nodes must exist or the batch fails with an integrity error. On
    /// replace, the mutable fields are label, properties, and weight — the
    /// endpoints are fixed at creation.
    pub fn upsert_edges(&self, token: &CancellationToken, edges: Vec<Edge>) -> Result<Vec<Edge>> {
        token.check()?;
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let mut stored = Vec::with_capacity(edges.len());
        for edge in &edges {
            token.check()?;
            stored.push(upsert_edge_tx(&tx, edge)?);
        }

        tx.commit()?;
        debug!(count = stored.len(), "upserted edges");
        Ok(stored)
    }

    /// List nodes ordered by id. A zero limit defaults to [`DEFAULT_LIMIT`];
    /// all limits are capped at [`MAX_LIMIT`].
    pub fn nodes(&self, token: &CancellationToken, limit: usize) -> Result<Vec<Node>> {
        token.check()?;
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT id, label, properties, created_at, updated_at
             FROM nodes ORDER BY id LIMIT ?1",
        )?;

        let raw: Vec<NodeRow> = stmt
            .query_map([search::clamp_limit(limit) as i64], read_node_row)?
            .collect::<rusqlite::Result<_>>()?;
        raw.into_iter().map(node_from_row).collect()
    }

    /// List edges ordered by id, with the same limit handling as
    /// [`Store::nodes`].
    pub fn edges(&self, token: &CancellationToken, limit: usize) -> Result<Vec<Edge>> {
        token.check()?;
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT id, label, properties, weight, from_id, to_id, created_at, updated_at
             FROM edges ORDER BY id LIMIT ?1",
        )?;

        let raw: Vec<EdgeRow> = stmt
            .query_map([search::clamp_limit(limit) as i64], read_edge_row)?
            .collect::<rusqlite::Result<_>>()?;
        raw.into_iter().map(edge_from_row).collect()
    }

    /// Fetch a single node by id.
    pub fn node_by_id(&self, token: &CancellationToken, id: u64) -> Result<Node> {
        token.check()?;
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                "SELECT id, label, properties, created_at, updated_at
                 FROM nodes WHERE id = ?1",
                [id],
                read_node_row,
            )
            .optional()?
            .ok_or(StoreError::not_found("node", id))?;
        node_from_row(raw)
    }

    /// Fetch a single edge by id.
    pub fn edge_by_id(&self, token: &CancellationToken, id: u64) -> Result<Edge> {
        token.check()?;
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                "SELECT id, label, properties, weight, from_id, to_id, created_at, updated_at
                 FROM edges WHERE id = ?1",
                [id],
                read_edge_row,
            )
            .optional()?
            .ok_or(StoreError::not_found("edge", id))?;
        edge_from_row(raw)
    }

    /// Delete a node by id, cascading to its edges and all related
    /// lexical-index entries.
    pub fn delete_node(&self, token: &CancellationToken, id: u64) -> Result<()> {
        token.check()?;
        let conn = self.lock()?;
        let affected = conn.execute("DELETE FROM nodes WHERE id = ?1", [id])?;
        if affected == 0 {
            return Err(StoreError::not_found("node", id));
        }
        debug!(id, "deleted node");
        Ok(())
    }

    /// Delete an edge by id, removing its lexical-index entry.
    pub fn delete_edge(&self, token: &CancellationToken, id: u64) -> Result<()> {
        token.check()?;
        let conn = self.lock()?;
        let affected = conn.execute("DELETE FROM edges WHERE id = ?1", [id])?;
        if affected == 0 {
            return Err(StoreError::not_found("edge", id));
        }
        debug!(id, "deleted edge");
        Ok(())
    }

    /// Term-search nodes via the lexical index, best match first.
    ///
    /// `term` uses FTS5 query syntax (free tokens, field-qualified tokens
    /// such as `label:`, boolean `AND`/`OR`). A malformed term surfaces as
    /// [`StoreError::QuerySyntax`], not an empty result set. Each hit carries
    /// an ephemeral highlighted snippet.
    pub fn search_nodes(
        &self,
        token: &CancellationToken,
        term: &str,
        limit: usize,
        snippet: &SnippetOptions,
    ) -> Result<Vec<Node>> {
        token.check()?;
        let conn = self.lock()?;
        let sql = format!(
            "SELECT n.id, n.label, n.properties, n.created_at, n.updated_at,
                    snippet({fts}, -1, ?1, ?2, ' ... ', ?3)
             FROM {fts}
             JOIN nodes n ON n.id = {fts}.id
             WHERE {fts}.kind = 'node' AND {fts} MATCH ?4
             ORDER BY bm25({fts})
             LIMIT ?5",
            fts = self.fts_config.table_name
        );

        let mut stmt = conn.prepare_cached(&sql)?;
        let raw: Vec<NodeRow> = stmt
            .query_map(
                params![
                    snippet.start,
                    snippet.end,
                    snippet.clamped_tokens(),
                    term,
                    search::clamp_limit(limit) as i64,
                ],
                read_node_hit,
            )?
            .collect::<rusqlite::Result<_>>()?;
        raw.into_iter().map(node_from_row).collect()
    }

    /// Term-search edges. Same contract as [`Store::search_nodes`].
    pub fn search_edges(
        &self,
        token: &CancellationToken,
        term: &str,
        limit: usize,
        snippet: &SnippetOptions,
    ) -> Result<Vec<Edge>> {
        token.check()?;
        let conn = self.lock()?;
        let sql = format!(
            "SELECT e.id, e.label, e.properties, e.weight, e.from_id, e.to_id,
                    e.created_at, e.updated_at,
                    snippet({fts}, -1, ?1, ?2, ' ... ', ?3)
             FROM {fts}
             JOIN edges e ON e.id = {fts}.id
             WHERE {fts}.kind = 'edge' AND {fts} MATCH ?4
             ORDER BY bm25({fts})
             LIMIT ?5",
            fts = self.fts_config.table_name
        );

        let mut stmt = conn.prepare_cached(&sql)?;
        let raw: Vec<EdgeRow> = stmt
            .query_map(
                params![
                    snippet.start,
                    snippet.end,
                    snippet.clamped_tokens(),
                    term,
                    search::clamp_limit(limit) as i64,
                ],
                read_edge_hit,
            )?
            .collect::<rusqlite::Result<_>>()?;
        raw.into_iter().map(edge_from_row).collect()
    }

    /// Rebuild the lexical index from the base tables. Recovery procedure
    /// for an inconsistent index.
    pub fn rebuild_index(&self, token: &CancellationToken) -> Result<()> {
        token.check()?;
        let conn = self.lock()?;
        FtsManager::new(&self.fts_config).rebuild(&conn)
    }

    /// Number of stored nodes.
    pub fn count_nodes(&self, token: &CancellationToken) -> Result<u64> {
        token.check()?;
        let conn = self.lock()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get(0))?)
    }

    /// Number of stored edges.
    pub fn count_edges(&self, token: &CancellationToken) -> Result<u64> {
        token.check()?;
        let conn = self.lock()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM edges", [], |row| row.get(0))?)
    }
}

fn upsert_node_tx(tx: &Transaction<'_>, node: &Node) -> Result<Node> {
    let props = node.properties.to_json()?;
    // NULL lets the database assign a fresh identity; a concrete id either
    // inserts at that identity or replaces the existing row in one atomic
    // statement - no read-then-decide window.
    let id = if node.id == 0 { None } else { Some(node.id) };

    let mut stmt = tx.prepare_cached(
        "INSERT INTO nodes (id, label, properties)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(id) DO UPDATE SET
             label = excluded.label,
             properties = excluded.properties,
             updated_at = unixepoch()
         RETURNING id, label, properties, created_at, updated_at",
    )?;

    let raw = stmt.query_row(params![id, node.label, props], read_node_row)?;
    node_from_row(raw)
}

fn upsert_edge_tx(tx: &Transaction<'_>, edge: &Edge) -> Result<Edge> {
    let props = edge.properties.to_json()?;
    let id = if edge.id == 0 { None } else { Some(edge.id) };

    let mut stmt = tx.prepare_cached(
        "INSERT INTO edges (id, label, properties, weight, from_id, to_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(id) DO UPDATE SET
             label = excluded.label,
             properties = excluded.properties,
             weight = excluded.weight,
             updated_at = unixepoch()
         RETURNING id, label, properties, weight, from_id, to_id, created_at, updated_at",
    )?;

    let raw = stmt.query_row(
        params![id, edge.label, props, edge.weight, edge.from_id, edge.to_id],
        read_edge_row,
    )?;
    edge_from_row(raw)
}

type NodeRow = (u64, String, String, i64, i64, Option<String>);
type EdgeRow = (u64, String, String, i64, u64, u64, i64, i64, Option<String>);

fn read_node_row(row: &Row<'_>) -> rusqlite::Result<NodeRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        None,
    ))
}

fn read_node_hit(row: &Row<'_>) -> rusqlite::Result<NodeRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn read_edge_row(row: &Row<'_>) -> rusqlite::Result<EdgeRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        None,
    ))
}

fn read_edge_hit(row: &Row<'_>) -> rusqlite::Result<EdgeRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
    ))
}

fn node_from_row(raw: NodeRow) -> Result<Node> {
    let (id, label, properties, created_at, updated_at, snippet) = raw;
    Ok(Node {
        id,
        label,
        properties: Properties::from_json(&properties)?,
        created_at: timestamp(created_at),
        updated_at: timestamp(updated_at),
        snippet,
    })
}

fn edge_from_row(raw: EdgeRow) -> Result<Edge> {
    let (id, label, properties, weight, from_id, to_id, created_at, updated_at, snippet) = raw;
    Ok(Edge {
        id,
        label,
        properties: Properties::from_json(&properties)?,
        weight,
        from_id,
        to_id,
        created_at: timestamp(created_at),
        updated_at: timestamp(updated_at),
        snippet,
    })
}

fn timestamp(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PropertyValue;

    fn store() -> Store {
        Store::open_in_memory().unwrap()
    }

    fn token() -> CancellationToken {
        CancellationToken::new()
    }

    fn person(name: &str) -> Node {
        Node::new("person", Properties::from([("name", name.into())]))
    }

    #[test]
    fn unassigned_ids_are_distinct_and_increasing() {
        let store = store();

        // Scenario A: two unassigned nodes in one call.
        let mut second = person("bar");
        second.properties.insert("age", 21);
        let stored = store
            .upsert_nodes(&token(), vec![person("foo"), second])
            .unwrap();

        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].id, 1);
        assert_eq!(stored[1].id, 2);
        // Numeric round-trip normalizes to floating form.
        assert_eq!(
            stored[1].properties.get("age"),
            Some(&PropertyValue::Number(21.0))
        );
    }

    #[test]
    fn upsert_with_existing_id_replaces_in_place() {
        let store = store();

        // Scenario B: preload then replace at the same id.
        let mut preload = person("bar");
        preload.properties.insert("age", 4);
        store.upsert_nodes(&token(), vec![preload]).unwrap();

        let mut replacement = person("bar");
        replacement.id = 1;
        replacement.properties.insert("age", 21);
        let stored = store.upsert_nodes(&token(), vec![replacement]).unwrap();
        assert_eq!(stored[0].id, 1);

        let listed = store.nodes(&token(), 0).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, 1);
        assert_eq!(
            listed[0].properties.get("age"),
            Some(&PropertyValue::Number(21.0))
        );
    }

    #[test]
    fn deleted_ids_are_never_reused() {
        let store = store();

        store.upsert_nodes(&token(), vec![person("foo")]).unwrap();
        store.delete_node(&token(), 1).unwrap();

        let stored = store.upsert_nodes(&token(), vec![person("bar")]).unwrap();
        assert_eq!(stored[0].id, 2);
    }

    #[test]
    fn batch_rolls_back_as_a_whole() {
        let store = store();

        // Second record references a missing node, so the first must not
        // survive either.
        let good = Edge::new("knows", 1, 1, Properties::new());
        let bad = Edge::new("knows", 1, 99, Properties::new());

        store.upsert_nodes(&token(), vec![person("foo")]).unwrap();
        let err = store.upsert_edges(&token(), vec![good, bad]).unwrap_err();
        assert!(matches!(err, StoreError::Integrity { .. }));

        assert_eq!(store.count_edges(&token()).unwrap(), 0);
        assert!(store.search_edges(&token(), "knows", 0, &SnippetOptions::default()).unwrap().is_empty());
    }

    #[test]
    fn edge_upsert_preserves_endpoints_on_replace() {
        let store = store();
        store
            .upsert_nodes(&token(), vec![person("foo"), person("bar")])
            .unwrap();

        let stored = store
            .upsert_edges(&token(), vec![Edge::new("knows", 1, 2, Properties::new())])
            .unwrap();
        assert_eq!(stored[0].id, 1);

        let mut replacement = Edge::new("likes", 2, 1, Properties::new());
        replacement.id = 1;
        replacement.weight = 5;
        let stored = store.upsert_edges(&token(), vec![replacement]).unwrap();

        assert_eq!(stored[0].label, "likes");
        assert_eq!(stored[0].weight, 5);
        // Endpoints are fixed at creation.
        assert_eq!(stored[0].from_id, 1);
        assert_eq!(stored[0].to_id, 2);
    }

    #[test]
    fn edges_are_listed_and_searchable() {
        let store = store();
        store
            .upsert_nodes(&token(), vec![person("foo"), person("bar")])
            .unwrap();

        let mut edge = Edge::new("knows", 1, 2, Properties::new());
        edge.properties.insert("since", "2019");
        store.upsert_edges(&token(), vec![edge]).unwrap();

        let listed = store.edges(&token(), 0).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].from_id, 1);
        assert_eq!(listed[0].to_id, 2);

        let hits = store
            .search_edges(&token(), "knows", 0, &SnippetOptions::default())
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].label, "knows");
        assert!(hits[0].snippet.is_some());
    }

    #[test]
    fn deleting_a_node_cascades_to_edges_and_index() {
        let store = store();
        store
            .upsert_nodes(&token(), vec![person("foo"), person("bar")])
            .unwrap();
        store
            .upsert_edges(&token(), vec![Edge::new("knows", 1, 2, Properties::new())])
            .unwrap();

        store.delete_node(&token(), 1).unwrap();

        assert_eq!(store.count_nodes(&token()).unwrap(), 1);
        assert_eq!(store.count_edges(&token()).unwrap(), 0);
        assert!(store
            .search_edges(&token(), "knows", 0, &SnippetOptions::default())
            .unwrap()
            .is_empty());
        assert!(store
            .search_nodes(&token(), "foo", 0, &SnippetOptions::default())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn lookup_of_missing_record_is_not_found() {
        let store = store();
        assert!(matches!(
            store.node_by_id(&token(), 42),
            Err(StoreError::NotFound { kind: "node", id: 42 })
        ));
        assert!(matches!(
            store.delete_edge(&token(), 7),
            Err(StoreError::NotFound { kind: "edge", id: 7 })
        ));
    }

    #[test]
    fn field_qualified_search_matches_by_label() {
        let store = store();

        // Scenario C: person, person, dog.
        store
            .upsert_nodes(
                &token(),
                vec![person("foo"), person("bar"), Node::new("dog", Properties::new())],
            )
            .unwrap();

        let hits = store
            .search_nodes(&token(), "label:dog", 0, &SnippetOptions::default())
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].label, "dog");
        assert!(hits[0].snippet.as_deref().unwrap_or("").contains("text-red-500"));
    }

    #[test]
    fn search_respects_limit_and_ranks_best_match_first() {
        let store = store();

        // Scenario D: three matching nodes, limit 2. The node with the most
        // occurrences of the term must rank first.
        let mut heavy = Node::new("dog", Properties::new());
        heavy.properties.insert("breed", "dog");
        heavy
            .properties
            .insert("notes", "dog dog dog");

        store
            .upsert_nodes(
                &token(),
                vec![
                    Node::new("dog", Properties::new()),
                    heavy,
                    Node::new("dog", Properties::new()),
                ],
            )
            .unwrap();

        let hits = store
            .search_nodes(&token(), "dog", 2, &SnippetOptions::default())
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, 2);
    }

    #[test]
    fn searching_properties_finds_flattened_tokens() {
        let store = store();
        let mut node = person("foo");
        node.properties.insert(
            "meta",
            Properties::from([("hair", Properties::from([("colour", "brown".into())]).into())]),
        );
        store.upsert_nodes(&token(), vec![node]).unwrap();

        // Value token.
        let hits = store
            .search_nodes(&token(), "brown", 0, &SnippetOptions::default())
            .unwrap();
        assert_eq!(hits.len(), 1);

        // Dotted-path key token.
        let hits = store
            .search_nodes(&token(), r#"keys:"meta.hair.colour""#, 0, &SnippetOptions::default())
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn malformed_term_is_a_query_syntax_error() {
        let store = store();
        store.upsert_nodes(&token(), vec![person("foo")]).unwrap();

        let err = store
            .search_nodes(&token(), "dog AND", 0, &SnippetOptions::default())
            .unwrap_err();
        assert!(matches!(err, StoreError::QuerySyntax { .. }));
    }

    #[test]
    fn cancelled_token_aborts_before_any_write() {
        let store = store();
        let cancelled = CancellationToken::new();
        cancelled.cancel();

        let err = store
            .upsert_nodes(&cancelled, vec![person("foo")])
            .unwrap_err();
        assert!(matches!(err, StoreError::Cancelled));
        assert_eq!(store.count_nodes(&token()).unwrap(), 0);
    }

    #[test]
    fn rebuild_restores_search_after_index_loss() {
        let store = store();
        store.upsert_nodes(&token(), vec![person("foo")]).unwrap();

        {
            let conn = store.lock().unwrap();
            conn.execute_batch("DELETE FROM fts;").unwrap();
        }
        assert!(store
            .search_nodes(&token(), "foo", 0, &SnippetOptions::default())
            .unwrap()
            .is_empty());

        store.rebuild_index(&token()).unwrap();

        let hits = store
            .search_nodes(&token(), "foo", 0, &SnippetOptions::default())
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn reopening_an_on_disk_store_keeps_data_and_index() {
        let dir = tempfile::TempDir::new().unwrap();
        let dsn = dir.path().join("graph.db");
        let dsn = dsn.to_str().unwrap();

        {
            let store = Store::open(dsn).unwrap();
            store.upsert_nodes(&token(), vec![person("foo")]).unwrap();
        }

        let store = Store::open(dsn).unwrap();
        assert_eq!(store.count_nodes(&token()).unwrap(), 1);
        let hits = store
            .search_nodes(&token(), "foo", 0, &SnippetOptions::default())
            .unwrap();
        assert_eq!(hits.len(), 1);
    }
}
