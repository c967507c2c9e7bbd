//! meshdb core - a lightweight graph-shaped data store.
//!
//! Typed nodes and edges carrying arbitrary nested properties, persisted in
//! SQLite and made searchable through a synchronized FTS5 lexical index. This
//! crate is the engine only; transport layers (HTTP, CLI) sit on top and call
//! plain methods on [`Store`].
//!
//! # Example
//!
//! ```rust,ignore
//! use meshdb_core::{CancellationToken, Node, Properties, SnippetOptions, Store};
//!
//! fn main() -> meshdb_core::Result<()> {
//!     let store = Store::open("graph.db")?;
//!     let token = CancellationToken::new();
//!
//!     let mut props = Properties::new();
//!     props.insert("name", "foo");
//!     store.upsert_nodes(&token, vec![Node::new("person", props)])?;
//!
//!     let hits = store.search_nodes(&token, "label:person", 0, &SnippetOptions::default())?;
//!     println!("found {} nodes", hits.len());
//!     Ok(())
//! }
//! ```

pub mod cancel;
pub mod error;
pub mod models;
pub mod store;

pub use cancel::{CancellationToken, CancelledError};
pub use error::{Result, StoreError};
pub use models::{Edge, Node, Properties, PropertyValue};
pub use store::{SnippetOptions, Store, DEFAULT_LIMIT, MAX_LIMIT};
