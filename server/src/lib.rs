//! Reference producer for dynamic data-source lists.
//!
//! Serves initial list payloads and fetch responses over HTTP and
//! WebSocket, applies list operations, and pushes the resulting versioned
//! patch batches to every connection subscribed to the list.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod repository;
pub mod routes;
pub mod websocket;

use crate::config::Config;
use crate::repository::ListRepository;
use crate::websocket::ConnectionManager;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<ListRepository>,
    pub config: Arc<Config>,
    pub conn_manager: Arc<ConnectionManager>,
}

impl AppState {
    pub fn new(repository: ListRepository, config: Config) -> Self {
        Self {
            repository: Arc::new(repository),
            config: Arc::new(config),
            conn_manager: ConnectionManager::new_shared(),
        }
    }
}

/// Build the application router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::create_routes())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
