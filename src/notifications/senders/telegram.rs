use std::time::Duration;

use reqwest::Client;
use serde::Serialize;

use super::check_response;
use crate::notifications::NotificationError;

pub const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// A sender for pushing notifications via the Telegram Bot API.
#[derive(Clone)]
pub struct TelegramSender {
    client: Client,
    api_base: String,
}

#[derive(Serialize)]
struct TelegramMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

impl TelegramSender {
    pub fn new(api_base: &str, timeout: Duration) -> Result<Self, NotificationError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    /// Send Markdown `text` to `chat_id` as the bot identified by `bot_token`.
    pub async fn send_message(
        &self,
        bot_token: &str,
        chat_id: &str,
        text: &str,
    ) -> Result<(), NotificationError> {
        let api_url = format!("{}/bot{}/sendMessage", self.api_base, bot_token);
        let payload = TelegramMessage {
            chat_id,
            text,
            parse_mode: "Markdown",
        };

        let response = self.client.post(&api_url).json(&payload).send().await?;
        check_response(response).await
    }
}
