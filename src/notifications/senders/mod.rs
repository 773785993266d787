//! Outbound delivery over HTTP.

mod telegram;
mod webhook;

pub use telegram::{TelegramSender, DEFAULT_TELEGRAM_API_BASE};
pub use webhook::WebhookSender;

use super::NotificationError;

/// Turn a non-success response into [`NotificationError::SendFailed`].
pub(crate) async fn check_response(response: reqwest::Response) -> Result<(), NotificationError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Could not read response body".to_string());
    Err(NotificationError::SendFailed {
        status: status.as_u16(),
        body,
    })
}
