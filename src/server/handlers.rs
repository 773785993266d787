//! Request handlers.

use axum::{body::Bytes, extract::State, http::StatusCode, response::IntoResponse};
use tracing::{debug, warn};

use super::AppState;
use crate::notifications::TelegramUpdate;

/// Health check endpoint.
pub async fn health() -> impl IntoResponse {
    StatusCode::OK
}

/// Telegram bot webhook. Always acknowledges so Telegram does not retry.
pub async fn telegram_webhook(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    match serde_json::from_slice::<TelegramUpdate>(&body) {
        Ok(update) => {
            if let Err(e) = state.notifications.handle_telegram_update(&update).await {
                warn!("Failed to answer Telegram update: {}", e);
            }
        }
        Err(e) => debug!("Ignoring malformed Telegram update: {}", e),
    }
    (StatusCode::OK, "OK")
}
