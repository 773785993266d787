//! Router configuration for the web server.

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers;
use super::AppState;

/// Create the router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/telegram/webhook", post(handlers::telegram_webhook))
        .with_state(state)
}
