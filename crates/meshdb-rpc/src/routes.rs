//! HTTP request handlers.
//!
//! Thin translation between JSON payloads and the core store. The store's
//! blocking SQLite calls run under `spawn_blocking` so they never stall the
//! async runtime.

use crate::server::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use meshdb_core::{CancellationToken, Edge, Node, SnippetOptions, StoreError};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

/// Error wrapper mapping the store taxonomy onto HTTP status codes.
pub struct ApiError(StoreError);

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            StoreError::Encoding { .. } | StoreError::QuerySyntax { .. } | StoreError::Cancelled => {
                StatusCode::BAD_REQUEST
            }
            StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
            StoreError::Integrity { .. } => StatusCode::CONFLICT,
            StoreError::Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            warn!("request failed: {}", self.0);
        }

        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

/// Run a blocking store call on the blocking thread pool.
async fn run_blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> meshdb_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            ApiError(StoreError::Storage {
                message: format!("blocking task failed: {e}"),
                source: None,
            })
        })?
        .map_err(ApiError)
}

/// Listing/search query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    /// Term-search query in FTS5 syntax. Absent means plain listing.
    pub q: Option<String>,
    #[serde(default)]
    pub limit: usize,
    pub snippet_start: Option<String>,
    pub snippet_end: Option<String>,
    pub snippet_tokens: Option<u32>,
}

impl ListParams {
    fn snippet_options(&self) -> SnippetOptions {
        let mut opts = SnippetOptions::default();
        if let Some(start) = &self.snippet_start {
            opts.start = start.clone();
        }
        if let Some(end) = &self.snippet_end {
            opts.end = end.clone();
        }
        if let Some(tokens) = self.snippet_tokens {
            opts.tokens = tokens;
        }
        opts
    }
}

pub async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

pub async fn status(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let store = state.store.clone();
    let counts = run_blocking(move || {
        let token = CancellationToken::new();
        Ok((store.count_nodes(&token)?, store.count_edges(&token)?))
    })
    .await?;

    Ok(Json(json!({"nodes": counts.0, "edges": counts.1})))
}

pub async fn upsert_nodes(
    State(state): State<Arc<AppState>>,
    Json(nodes): Json<Vec<Node>>,
) -> Result<Json<Vec<Node>>, ApiError> {
    let store = state.store.clone();
    let stored =
        run_blocking(move || store.upsert_nodes(&CancellationToken::new(), nodes)).await?;
    Ok(Json(stored))
}

pub async fn upsert_edges(
    State(state): State<Arc<AppState>>,
    Json(edges): Json<Vec<Edge>>,
) -> Result<Json<Vec<Edge>>, ApiError> {
    let store = state.store.clone();
    let stored =
        run_blocking(move || store.upsert_edges(&CancellationToken::new(), edges)).await?;
    Ok(Json(stored))
}

pub async fn list_nodes(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Node>>, ApiError> {
    let store = state.store.clone();
    let nodes = run_blocking(move || {
        let token = CancellationToken::new();
        match &params.q {
            Some(term) => store.search_nodes(&token, term, params.limit, &params.snippet_options()),
            None => store.nodes(&token, params.limit),
        }
    })
    .await?;
    Ok(Json(nodes))
}

pub async fn list_edges(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Edge>>, ApiError> {
    let store = state.store.clone();
    let edges = run_blocking(move || {
        let token = CancellationToken::new();
        match &params.q {
            Some(term) => store.search_edges(&token, term, params.limit, &params.snippet_options()),
            None => store.edges(&token, params.limit),
        }
    })
    .await?;
    Ok(Json(edges))
}

pub async fn get_node(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<Node>, ApiError> {
    let store = state.store.clone();
    let node = run_blocking(move || store.node_by_id(&CancellationToken::new(), id)).await?;
    Ok(Json(node))
}

pub async fn get_edge(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<Edge>, ApiError> {
    let store = state.store.clone();
    let edge = run_blocking(move || store.edge_by_id(&CancellationToken::new(), id)).await?;
    Ok(Json(edge))
}

pub async fn delete_node(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<StatusCode, ApiError> {
    let store = state.store.clone();
    run_blocking(move || store.delete_node(&CancellationToken::new(), id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_edge(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<StatusCode, ApiError> {
    let store = state.store.clone();
    run_blocking(move || store.delete_edge(&CancellationToken::new(), id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn rebuild_index(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let store = state.store.clone();
    run_blocking(move || store.rebuild_index(&CancellationToken::new())).await?;
    Ok(Json(json!({"status": "ok"})))
}
