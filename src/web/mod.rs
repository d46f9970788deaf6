//! Web server module.

mod handlers;
mod render;

pub use handlers::*;

use crate::config::ServerConfig;
use crate::db::Store;
use crate::sessions::Aggregator;

use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub store: Arc<Store>,
    pub aggregator: Arc<Aggregator>,
}

/// Web server for the session dashboard.
pub struct Server {
    state: AppState,
}

impl Server {
    /// Create a new server with the given dependencies.
    pub fn new(config: ServerConfig, store: Arc<Store>, aggregator: Arc<Aggregator>) -> Self {
        Self {
            state: AppState {
                config,
                store,
                aggregator,
            },
        }
    }

    /// Build the router with all routes.
    fn routes(&self) -> Router {
        let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any);

        Router::new()
            // Dashboard
            .route("/", get(handlers::handle_dashboard))
            // Session fragments
            .route("/api/sessions/stats", get(handlers::handle_sessions_stats))
            .route("/api/sessions/general", get(handlers::handle_sessions_general))
            .route("/api/sessions/errors", get(handlers::handle_sessions_errors))
            // JSON
            .route("/api/sessions/summary", get(handlers::handle_sessions_summary))
            .route("/api/sessions/filters", get(handlers::handle_filter_options))
            // Static assets
            .route("/static/{*path}", get(handlers::handle_static))
            .route("/favicon.ico", get(handlers::handle_favicon))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Start the server on the configured port.
    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.state.config.http_port));
        let router = self.routes();

        tracing::info!("Web server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router).await?;

        Ok(())
    }
}
