//! HTTP server implementation using Axum.

use crate::routes;
use axum::{
    routing::{get, post},
    Router,
};
use meshdb_core::Store;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

/// Application state shared across handlers.
pub struct AppState {
    /// The graph store. Cloning shares the underlying connection.
    pub store: Store,
}

/// Build the application router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(routes::health))
        .route("/status", get(routes::status))
        .route("/nodes", get(routes::list_nodes).post(routes::upsert_nodes))
        .route(
            "/nodes/:id",
            get(routes::get_node).delete(routes::delete_node),
        )
        .route("/edges", get(routes::list_edges).post(routes::upsert_edges))
        .route(
            "/edges/:id",
            get(routes::get_edge).delete(routes::delete_edge),
        )
        .route("/rebuild", post(routes::rebuild_index))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server.
///
/// Returns the actual address the server is bound to (useful when port=0).
pub async fn start_server(store: Store, host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    let state = Arc::new(AppState { store });
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("server listening on {}", actual_addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("server error: {e}");
        }
    });

    Ok(actual_addr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_server_starts() {
        let store = Store::open_in_memory().unwrap();
        let addr = start_server(store, "127.0.0.1", 0).await.unwrap();
        assert!(addr.port() > 0);
    }
}
