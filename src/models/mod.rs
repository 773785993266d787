//! Data models for Cart Rotom.

mod agent;
mod check_log;
mod payment;
mod user;

pub use agent::{
    host_name, Agent, AgentStatus, CheckResult, CheckStateUpdate, CheckStrategy, Condition,
    DEFAULT_FREQUENCY_MINUTES, DEFAULT_NEGATIVE_KEYWORDS, DEFAULT_POSITIVE_KEYWORDS,
};
pub use check_log::{CheckLogEntry, LogResult};
pub use payment::{last_four, CardData, PaymentMethodRecord};
pub use user::{NotificationChannel, NotificationPreference, TelegramLink};
