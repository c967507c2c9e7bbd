//! Error types for the meshdb core.
//!
//! Every failure is classified into one of the variants below and returned to
//! the immediate caller. The core never retries and never logs an error as a
//! substitute for propagating it; retry and user messaging belong to the
//! transport layer.

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Main error type for the graph store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A property bag failed to serialize or deserialize.
    #[error("property encoding error: {message}")]
    Encoding {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// Foreign-key violation or an unresolvable duplicate-key conflict.
    #[error("integrity violation: {message}")]
    Integrity { message: String },

    /// Malformed full-text search term.
    #[error("query syntax error: {message}")]
    QuerySyntax { message: String },

    /// Lookup by id with no matching record.
    #[error("{kind} not found: id {id}")]
    NotFound { kind: &'static str, id: u64 },

    /// The operation observed a tripped cancellation token. The enclosing
    /// transaction has been rolled back.
    #[error("operation cancelled")]
    Cancelled,

    /// Underlying engine failure (lock timeout, I/O error, closed
    /// connection). The original error is preserved in `source`.
    #[error("storage error: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },
}

impl StoreError {
    pub(crate) fn not_found(kind: &'static str, id: u64) -> Self {
        StoreError::NotFound { kind, id }
    }

    pub(crate) fn storage(message: impl Into<String>) -> Self {
        StoreError::Storage {
            message: message.into(),
            source: None,
        }
    }
}

/// Message fragments SQLite emits for malformed FTS5 MATCH expressions.
const FTS_SYNTAX_MARKERS: &[&str] = &[
    "fts5: syntax error",
    "malformed MATCH expression",
    "unknown special query",
    "unterminated string",
];

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(code, message) => {
                let text = message.unwrap_or_else(|| code.to_string());
                if code.code == rusqlite::ErrorCode::ConstraintViolation {
                    StoreError::Integrity { message: text }
                } else if FTS_SYNTAX_MARKERS.iter().any(|m| text.contains(m)) {
                    StoreError::QuerySyntax { message: text }
                } else {
                    StoreError::Storage {
                        message: text.clone(),
                        source: Some(rusqlite::Error::SqliteFailure(code, Some(text))),
                    }
                }
            }
            other => StoreError::Storage {
                message: other.to_string(),
                source: Some(other),
            },
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Encoding {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constraint_violation_maps_to_integrity() {
        let ffi = rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY);
        let err = rusqlite::Error::SqliteFailure(ffi, Some("FOREIGN KEY constraint failed".into()));
        assert!(matches!(StoreError::from(err), StoreError::Integrity { .. }));
    }

    #[test]
    fn fts_syntax_error_maps_to_query_syntax() {
        let ffi = rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR);
        let err = rusqlite::Error::SqliteFailure(ffi, Some("fts5: syntax error near \"AND\"".into()));
        assert!(matches!(StoreError::from(err), StoreError::QuerySyntax { .. }));
    }

    #[test]
    fn other_engine_errors_map_to_storage() {
        let ffi = rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY);
        let err = rusqlite::Error::SqliteFailure(ffi, Some("database is locked".into()));
        let mapped = StoreError::from(err);
        assert!(matches!(mapped, StoreError::Storage { source: Some(_), .. }));
    }
}
