//! API route configuration.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use super::handlers;
use super::state::AppState;

/// Create the main API router with all routes.
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api/v1", public_routes().merge(protected_routes()))
        .with_state(state)
}

/// Public routes that don't require authentication.
fn public_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/auth/login", post(handlers::login))
}

/// Protected routes; each handler takes an auth extractor.
fn protected_routes() -> Router<Arc<AppState>> {
    Router::new()
        // Task endpoints
        .route(
            "/tasks",
            get(handlers::list_tasks).post(handlers::declare_task),
        )
        .route(
            "/tasks/:id",
            get(handlers::get_task).delete(handlers::delete_task),
        )
        .route(
            "/tasks/:id/run",
            get(handlers::run_task).post(handlers::run_task),
        )
        .route("/tasks/:id/contents", get(handlers::list_contents))
        .route("/tasks/:id/history", get(handlers::list_history))
        // Job endpoints
        .route("/jobs/:handle", get(handlers::get_job))
        // History endpoints
        .route("/history/:id", get(handlers::get_history))
        .route("/history/:id/log", get(handlers::tail_log))
        // Schedule endpoints
        .route("/schedule", get(handlers::list_schedule))
}
