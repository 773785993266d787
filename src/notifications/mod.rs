//! Stock alert delivery.
//!
//! A user receives alerts on exactly one channel: Telegram when linked and
//! active, otherwise a webhook (the agent's own override first, then the
//! user default). Webhook bodies are shaped for Discord, Slack or a generic
//! JSON receiver depending on the URL.

mod payload;
pub mod secrets;
mod senders;

pub use payload::{
    stock_payload, telegram_start_reply, telegram_stock_message, test_payload, WebhookKind,
    TELEGRAM_TEST_MESSAGE,
};
pub use secrets::{
    GcpSecretManagerStore, NoSecretStore, SecretCache, SecretError, SecretResolver, SecretStore,
};
pub use senders::{TelegramSender, WebhookSender, DEFAULT_TELEGRAM_API_BASE};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::crypto::{Cipher, CipherError};
use crate::models::{Agent, TelegramLink};
use crate::repository::{RepositoryError, Store, UserRepository};

/// Name of the secret holding the Telegram bot token.
pub const TELEGRAM_TOKEN_SECRET: &str = "TELEGRAM_BOT_TOKEN";

/// Default timeout for outbound notification requests.
pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("Notification rejected with status {status}: {body}")]
    SendFailed { status: u16, body: String },
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Cipher error: {0}")]
    Cipher(#[from] CipherError),
    #[error("Secret error: {0}")]
    Secret(#[from] SecretError),
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Where an alert went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Webhook(WebhookKind),
    Telegram,
}

impl Delivery {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Webhook(kind) => kind.as_str(),
            Self::Telegram => "telegram",
        }
    }
}

/// Result of one notification attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum NotifyOutcome {
    Sent(Delivery),
    Skipped(&'static str),
    Failed(String),
}

impl NotifyOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent(_))
    }
}

/// Sends stock status changes to a user.
///
/// Implementations never fail the caller; delivery problems are reported
/// through the outcome.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, user_id: &str, agent: &Agent, in_stock: bool) -> NotifyOutcome;
}

/// Subset of a Telegram Bot API update we react to.
#[derive(Debug, Deserialize)]
pub struct TelegramUpdate {
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramMessage {
    pub chat: TelegramChat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
}

/// Channel resolution and delivery backed by the store.
#[derive(Clone)]
pub struct NotificationService {
    store: Arc<dyn Store>,
    cipher: Arc<dyn Cipher>,
    webhook: WebhookSender,
    telegram: TelegramSender,
    secrets: SecretResolver,
}

impl NotificationService {
    pub fn new(
        store: Arc<dyn Store>,
        cipher: Arc<dyn Cipher>,
        webhook: WebhookSender,
        telegram: TelegramSender,
        secrets: SecretResolver,
    ) -> Self {
        Self {
            store,
            cipher,
            webhook,
            telegram,
            secrets,
        }
    }

    async fn deliver(
        &self,
        user_id: &str,
        agent: &Agent,
        in_stock: bool,
    ) -> Result<NotifyOutcome, NotificationError> {
        let Some(preference) = self.store.get_notification_preference(user_id).await? else {
            return Ok(NotifyOutcome::Skipped("user not found"));
        };

        let now = Utc::now();

        if let Some(chat_id) = preference.telegram_chat() {
            let token = self.secrets.resolve(TELEGRAM_TOKEN_SECRET).await?;
            let text = telegram_stock_message(agent, in_stock, now);
            self.telegram.send_message(&token, chat_id, &text).await?;
            info!("Telegram notification sent for agent {}", agent.id);
            return Ok(NotifyOutcome::Sent(Delivery::Telegram));
        }

        let encrypted = agent
            .webhook_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .or(preference.webhook.as_deref().filter(|url| !url.is_empty()));
        let Some(encrypted) = encrypted else {
            debug!("No webhook configured for user {}", user_id);
            return Ok(NotifyOutcome::Skipped("no webhook configured"));
        };

        let url = self.cipher.decrypt(encrypted)?;
        let kind = WebhookKind::detect(&url);
        let body = stock_payload(kind, agent, in_stock, now);
        self.webhook.send(&url, &body).await?;
        info!(
            "{} webhook notification sent for agent {}",
            kind.as_str(),
            agent.id
        );
        Ok(NotifyOutcome::Sent(Delivery::Webhook(kind)))
    }

    /// Send a test payload to `url`, returning the detected webhook kind.
    pub async fn send_test_webhook(&self, url: &str) -> Result<WebhookKind, NotificationError> {
        if url.trim().is_empty() {
            return Err(NotificationError::InvalidConfiguration(
                "Webhook URL is required".to_string(),
            ));
        }
        let kind = WebhookKind::detect(url);
        self.webhook.send(url, &test_payload(kind, Utc::now())).await?;
        Ok(kind)
    }

    pub async fn send_test_telegram(&self, chat_id: &str) -> Result<(), NotificationError> {
        if chat_id.trim().is_empty() {
            return Err(NotificationError::InvalidConfiguration(
                "Telegram chat ID is required".to_string(),
            ));
        }
        let token = self.secrets.resolve(TELEGRAM_TOKEN_SECRET).await?;
        self.telegram
            .send_message(&token, chat_id.trim(), TELEGRAM_TEST_MESSAGE)
            .await
    }

    /// Encrypt and store the user's default webhook. `None` clears it.
    pub async fn save_webhook(
        &self,
        user_id: &str,
        url: Option<&str>,
    ) -> Result<(), NotificationError> {
        let encrypted = match url.map(str::trim).filter(|u| !u.is_empty()) {
            Some(url) => Some(self.cipher.encrypt(url)?),
            None => None,
        };
        self.store.save_webhook(user_id, encrypted).await?;
        Ok(())
    }

    pub async fn connect_telegram(
        &self,
        user_id: &str,
        chat_id: &str,
    ) -> Result<TelegramLink, NotificationError> {
        let chat_id = chat_id.trim();
        if chat_id.is_empty() {
            return Err(NotificationError::InvalidConfiguration(
                "Telegram chat ID is required".to_string(),
            ));
        }
        let link = TelegramLink {
            chat_id: chat_id.to_string(),
            connected_at: Utc::now(),
        };
        self.store.connect_telegram(user_id, link.clone()).await?;
        info!("Telegram connected for user {}", user_id);
        Ok(link)
    }

    pub async fn disconnect_telegram(&self, user_id: &str) -> Result<(), NotificationError> {
        self.store.disconnect_telegram(user_id).await?;
        info!("Telegram disconnected for user {}", user_id);
        Ok(())
    }

    /// React to an incoming bot update. Returns true when a reply was sent.
    ///
    /// Only `/start` is handled: the bot answers with the chat id the user
    /// needs to link their account.
    pub async fn handle_telegram_update(
        &self,
        update: &TelegramUpdate,
    ) -> Result<bool, NotificationError> {
        let Some(message) = update.message.as_ref() else {
            return Ok(false);
        };
        let is_start = message
            .text
            .as_deref()
            .is_some_and(|text| text.trim_start().starts_with("/start"));
        if !is_start {
            return Ok(false);
        }

        let chat_id = message.chat.id.to_string();
        let token = self.secrets.resolve(TELEGRAM_TOKEN_SECRET).await?;
        self.telegram
            .send_message(&token, &chat_id, &telegram_start_reply(&chat_id))
            .await?;
        debug!("Sent /start reply to chat {}", chat_id);
        Ok(true)
    }
}

#[async_trait]
impl Notifier for NotificationService {
    async fn notify(&self, user_id: &str, agent: &Agent, in_stock: bool) -> NotifyOutcome {
        match self.deliver(user_id, agent, in_stock).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Notification for agent {} failed: {}", agent.id, e);
                NotifyOutcome::Failed(e.to_string())
            }
        }
    }
}
