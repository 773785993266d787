//! Append-only check history entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::CheckResult;

/// Result code stored on a log entry.
///
/// Check outcomes share the codes of [`CheckResult`]; the auto-checkout stub
/// writes its own entries alongside them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogResult {
    InStock,
    OutOfStock,
    BotDetected,
    Error,
    CheckoutAttempted,
    CheckoutFailed,
}

impl LogResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InStock => "IN_STOCK",
            Self::OutOfStock => "OUT_OF_STOCK",
            Self::BotDetected => "BOT_DETECTED",
            Self::Error => "ERROR",
            Self::CheckoutAttempted => "CHECKOUT_ATTEMPTED",
            Self::CheckoutFailed => "CHECKOUT_FAILED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "IN_STOCK" => Some(Self::InStock),
            "OUT_OF_STOCK" => Some(Self::OutOfStock),
            "BOT_DETECTED" => Some(Self::BotDetected),
            "ERROR" => Some(Self::Error),
            "CHECKOUT_ATTEMPTED" => Some(Self::CheckoutAttempted),
            "CHECKOUT_FAILED" => Some(Self::CheckoutFailed),
            _ => None,
        }
    }

    /// Whether this entry records a stock check (as opposed to checkout).
    pub fn is_check(&self) -> bool {
        !matches!(self, Self::CheckoutAttempted | Self::CheckoutFailed)
    }
}

impl From<CheckResult> for LogResult {
    fn from(result: CheckResult) -> Self {
        match result {
            CheckResult::InStock => Self::InStock,
            CheckResult::OutOfStock => Self::OutOfStock,
            CheckResult::BotDetected => Self::BotDetected,
            CheckResult::Error => Self::Error,
        }
    }
}

/// A single immutable history record for an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckLogEntry {
    pub timestamp: DateTime<Utc>,
    pub result: LogResult,
    pub message: String,
    /// HTTP status observed, or 0 when no response was received.
    pub http_status: u16,
}

impl CheckLogEntry {
    pub fn new(result: impl Into<LogResult>, message: impl Into<String>, http_status: u16) -> Self {
        Self {
            timestamp: Utc::now(),
            result: result.into(),
            message: message.into(),
            http_status,
        }
    }
}
