//! Persistence for agents, check history, notification preferences and
//! payment methods.
//!
//! The worker only talks to the capability traits below. Two backends ship:
//! an in-memory store for tests and ephemeral runs, and SQLite.

mod memory;
mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{
    Agent, AgentStatus, CheckLogEntry, CheckStateUpdate, NotificationPreference,
    PaymentMethodRecord, TelegramLink,
};

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, RepositoryError>;

/// Errors from the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid record: {0}")]
    Corrupt(String),
    #[error("Storage task failed: {0}")]
    Task(String),
}

impl From<rusqlite::Error> for RepositoryError {
    fn from(e: rusqlite::Error) -> Self {
        RepositoryError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(e: serde_json::Error) -> Self {
        RepositoryError::Serialization(e.to_string())
    }
}

impl From<tokio::task::JoinError> for RepositoryError {
    fn from(e: tokio::task::JoinError) -> Self {
        RepositoryError::Task(e.to_string())
    }
}

/// Agent configuration, check state and history.
#[async_trait]
pub trait AgentRepository: Send + Sync {
    /// All agents with status `ENABLED`, across users.
    async fn list_enabled_agents(&self) -> Result<Vec<Agent>>;

    async fn get_agent(&self, user_id: &str, agent_id: &str) -> Result<Option<Agent>>;

    async fn list_agents(&self, user_id: &str) -> Result<Vec<Agent>>;

    /// Insert or replace an agent's configuration.
    async fn save_agent(&self, agent: &Agent) -> Result<()>;

    /// Returns false when the agent does not exist.
    async fn set_agent_status(
        &self,
        user_id: &str,
        agent_id: &str,
        status: AgentStatus,
    ) -> Result<bool>;

    /// Remove an agent and its history. Returns false when it did not exist.
    async fn delete_agent(&self, user_id: &str, agent_id: &str) -> Result<bool>;

    /// Record the outcome of a check. The thumbnail is only written when the
    /// agent has none yet.
    async fn update_check_state(
        &self,
        user_id: &str,
        agent_id: &str,
        update: &CheckStateUpdate,
    ) -> Result<()>;

    async fn append_log(&self, user_id: &str, agent_id: &str, entry: &CheckLogEntry)
        -> Result<()>;

    /// Most recent entries first.
    async fn list_logs(
        &self,
        user_id: &str,
        agent_id: &str,
        limit: usize,
    ) -> Result<Vec<CheckLogEntry>>;
}

/// Per-user notification settings.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// `None` when the user is unknown.
    async fn get_notification_preference(
        &self,
        user_id: &str,
    ) -> Result<Option<NotificationPreference>>;

    /// Store (or clear) the encrypted default webhook URL.
    async fn save_webhook(&self, user_id: &str, encrypted_url: Option<String>) -> Result<()>;

    /// Link a Telegram chat and make Telegram the active channel.
    async fn connect_telegram(&self, user_id: &str, link: TelegramLink) -> Result<()>;

    /// Drop the Telegram link and fall back to webhooks.
    async fn disconnect_telegram(&self, user_id: &str) -> Result<()>;
}

/// Stored (encrypted) payment methods.
#[async_trait]
pub trait PaymentMethodRepository: Send + Sync {
    async fn get_payment_method(
        &self,
        user_id: &str,
        method_id: &str,
    ) -> Result<Option<PaymentMethodRecord>>;

    async fn add_payment_method(&self, user_id: &str, record: &PaymentMethodRecord)
        -> Result<()>;

    /// Overwrite an existing method. Returns false when `record.id` is unknown.
    async fn update_payment_method(
        &self,
        user_id: &str,
        record: &PaymentMethodRecord,
    ) -> Result<bool>;
}

/// Convenience bound for a backend providing every capability.
pub trait Store: AgentRepository + UserRepository + PaymentMethodRepository {}

impl<T: AgentRepository + UserRepository + PaymentMethodRepository> Store for T {}

/// Parse a datetime string from the database, defaulting to Unix epoch on error.
pub fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Parse an optional datetime string from the database.
pub fn parse_datetime_opt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    })
}

/// Convert a "no rows" query error into `None`.
pub(crate) fn to_option<T>(result: rusqlite::Result<T>) -> Result<Option<T>> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}
