//! Web server implementation using Axum

use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::config::WebConfig;
use crate::web::handlers::{
    delete_status, get_entities, get_n, get_news, get_status, purge_entities, purge_news,
    reprocess_news, set_n, update_entity, AppState,
};

/// Web server for the progress and curation API
pub struct WebServer {
    state: AppState,
    host: String,
    port: u16,
    cors_enabled: bool,
}

impl WebServer {
    pub fn new(state: AppState, config: &WebConfig) -> Self {
        Self {
            state,
            host: config.host.clone(),
            port: config.port,
            cors_enabled: config.cors.enabled,
        }
    }

    /// Build the router with all routes and middleware
    pub fn build_router(&self) -> Router {
        let mut router = Router::new()
            .route("/status", get(get_status).delete(delete_status))
            .route(
                "/entities",
                get(get_entities).post(update_entity).delete(purge_entities),
            )
            .route("/news", get(get_news).delete(purge_news))
            .route("/n", get(get_n).post(set_n))
            .route("/reprocess-news", post(reprocess_news))
            .with_state(self.state.clone());

        if self.cors_enabled {
            router = router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
                    .allow_headers(Any),
            );
        }
        router
    }

    /// Start the web server
    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error>> {
        let app = self.build_router();
        let addr: SocketAddr = format!("{}:{}", self.host, self.port).parse()?;

        info!("Starting web server on {}", addr);
        info!("  GET    /status - Processing status");
        info!("  DELETE /status - Clear processing status");
        info!("  GET    /entities - List graph entities");
        info!("  POST   /entities - Update INTERESTED flag");
        info!("  DELETE /entities - Purge the graph");
        info!("  GET    /news - List news records");
        info!("  DELETE /news - Purge news records");
        info!("  GET    /n - Hop radius setting");
        info!("  POST   /n - Update hop radius");
        info!("  POST   /reprocess-news - Requeue news records");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;
        Ok(())
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}
