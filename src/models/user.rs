//! Per-user notification preferences.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Channel used to deliver stock alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    #[default]
    Webhook,
    Telegram,
}

impl NotificationChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Webhook => "webhook",
            Self::Telegram => "telegram",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "webhook" => Some(Self::Webhook),
            "telegram" => Some(Self::Telegram),
            _ => None,
        }
    }
}

/// Link between a user and a Telegram chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramLink {
    pub chat_id: String,
    pub connected_at: DateTime<Utc>,
}

/// Notification settings for one user.
///
/// Only one channel is active at a time. Switching channels keeps the
/// credential of the inactive one so it can be re-enabled later.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPreference {
    #[serde(default)]
    pub channel: NotificationChannel,
    /// Encrypted webhook URL.
    #[serde(default)]
    pub webhook: Option<String>,
    #[serde(default)]
    pub telegram: Option<TelegramLink>,
}

impl NotificationPreference {
    /// Chat id to deliver to, when Telegram is the active channel.
    pub fn telegram_chat(&self) -> Option<&str> {
        match (self.channel, &self.telegram) {
            (NotificationChannel::Telegram, Some(link)) if !link.chat_id.is_empty() => {
                Some(link.chat_id.as_str())
            }
            _ => None,
        }
    }
}
