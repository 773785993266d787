//! HTTP endpoint for the Telegram bot.
//!
//! Telegram delivers bot updates to `POST /telegram/webhook`; a `/start`
//! message is answered with the sender's chat id so they can link their
//! account.

mod handlers;
mod routes;

pub use routes::create_router;

use std::net::SocketAddr;

use crate::notifications::NotificationService;

/// Shared state for the web server.
#[derive(Clone)]
pub struct AppState {
    pub notifications: NotificationService,
}

impl AppState {
    pub fn new(notifications: NotificationService) -> Self {
        Self { notifications }
    }
}

/// Start the web server.
pub async fn serve(state: AppState, host: &str, port: u16) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
