//! REST API server for bastion-ops.
//!
//! Exposes task declaration, run submission, job status, run histories,
//! log tailing and the schedule over HTTP. Everything except `/health` and
//! `/api/v1/auth/login` requires a JWT bearer token.
//!
//! # Example
//!
//! ```rust,ignore
//! use bastion_ops::api::ApiServer;
//!
//! let server = ApiServer::new(engine, config.server.clone());
//! server.run().await?;
//! ```

pub mod auth;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;
pub mod types;

use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

pub use auth::{AuthConfig, Claims, JwtAuth};
pub use error::{ApiError, ApiResult};
pub use state::AppState;
pub use types::*;

use crate::config::ServerConfig;
use crate::engine::Engine;

/// The main API server.
pub struct ApiServer {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl ApiServer {
    /// Create a new API server around a running engine.
    pub fn new(engine: Arc<Engine>, config: ServerConfig) -> Self {
        let state = Arc::new(AppState::new(engine, config.clone()));
        Self { config, state }
    }

    /// Build the router with all routes.
    pub fn router(&self) -> Router {
        let mut app = routes::api_routes(self.state.clone());

        if self.config.enable_cors {
            let cors = CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any);
            app = app.layer(cors);
        }

        app.layer(TraceLayer::new_for_http())
    }

    /// Run the server with graceful shutdown support.
    pub async fn run_with_shutdown(
        self,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<(), std::io::Error> {
        let addr = self.config.bind;
        let router = self.router();

        info!("Starting bastion-ops API server on {}", addr);

        let listener = TcpListener::bind(addr).await?;
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
    }

    /// Get a reference to the application state.
    pub fn state(&self) -> Arc<AppState> {
        self.state.clone()
    }
}
