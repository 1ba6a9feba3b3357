//! Web server module.

mod handlers;

pub use handlers::*;

use crate::config::ServerConfig;
use crate::service::QueryService;

use axum::{routing::get, Router};
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub service: QueryService,
}

/// Web server for the report dashboard API.
pub struct Server {
    state: AppState,
}

impl Server {
    /// Create a new server with the given dependencies.
    pub fn new(config: ServerConfig, service: QueryService) -> Self {
        Self {
            state: AppState { config, service },
        }
    }

    /// Build the router with all routes.
    fn routes(&self) -> Router {
        router(self.state.clone())
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

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any);

    Router::new()
        .route("/api/health", get(handlers::handle_health))
        .route("/api/categories", get(handlers::handle_categories))
        .route("/api/reports", get(handlers::handle_recent_reports))
        .route("/api/reports/summary", get(handlers::handle_summary))
        .route("/api/reports/{category}", get(handlers::handle_category_reports))
        .route("/api/reports/{category}/history", get(handlers::handle_history))
        .route("/api/reports/{category}/{id}", get(handlers::handle_report))
        .route("/api/reports/{category}/{id}/html", get(handlers::handle_report_html))
        .route("/api/stats", get(handlers::handle_stats))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
