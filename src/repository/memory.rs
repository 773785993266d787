//! In-memory store for tests and single-process ephemeral runs.
//!
//! State is not persisted across restarts.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{
    AgentRepository, PaymentMethodRepository, RepositoryError, Result, UserRepository,
};
use crate::models::{
    Agent, AgentStatus, CheckLogEntry, CheckStateUpdate, NotificationChannel,
    NotificationPreference, PaymentMethodRecord, TelegramLink,
};

type AgentKey = (String, String);

#[derive(Debug, Default)]
struct State {
    agents: HashMap<AgentKey, Agent>,
    logs: HashMap<AgentKey, Vec<CheckLogEntry>>,
    users: HashMap<String, NotificationPreference>,
    payment_methods: HashMap<AgentKey, PaymentMethodRecord>,
}

fn key(user_id: &str, id: &str) -> AgentKey {
    (user_id.to_string(), id.to_string())
}

/// Lock-based store shared by cloning.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user with the given preference.
    pub async fn insert_user(&self, user_id: &str, preference: NotificationPreference) {
        self.state
            .write()
            .await
            .users
            .insert(user_id.to_string(), preference);
    }

    /// Every log entry for an agent, oldest first.
    pub async fn logs(&self, user_id: &str, agent_id: &str) -> Vec<CheckLogEntry> {
        self.state
            .read()
            .await
            .logs
            .get(&key(user_id, agent_id))
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl AgentRepository for InMemoryStore {
    async fn list_enabled_agents(&self) -> Result<Vec<Agent>> {
        let state = self.state.read().await;
        let mut agents: Vec<Agent> = state
            .agents
            .values()
            .filter(|a| a.is_enabled())
            .cloned()
            .collect();
        agents.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(agents)
    }

    async fn get_agent(&self, user_id: &str, agent_id: &str) -> Result<Option<Agent>> {
        Ok(self
            .state
            .read()
            .await
            .agents
            .get(&key(user_id, agent_id))
            .cloned())
    }

    async fn list_agents(&self, user_id: &str) -> Result<Vec<Agent>> {
        let state = self.state.read().await;
        let mut agents: Vec<Agent> = state
            .agents
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        agents.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(agents)
    }

    async fn save_agent(&self, agent: &Agent) -> Result<()> {
        self.state
            .write()
            .await
            .agents
            .insert(key(&agent.user_id, &agent.id), agent.clone());
        Ok(())
    }

    async fn set_agent_status(
        &self,
        user_id: &str,
        agent_id: &str,
        status: AgentStatus,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.agents.get_mut(&key(user_id, agent_id)) {
            Some(agent) => {
                agent.status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_agent(&self, user_id: &str, agent_id: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        let k = key(user_id, agent_id);
        state.logs.remove(&k);
        Ok(state.agents.remove(&k).is_some())
    }

    async fn update_check_state(
        &self,
        user_id: &str,
        agent_id: &str,
        update: &CheckStateUpdate,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let agent = state
            .agents
            .get_mut(&key(user_id, agent_id))
            .ok_or_else(|| RepositoryError::NotFound(format!("agent {}/{}", user_id, agent_id)))?;

        agent.last_checked = Some(update.checked_at);
        agent.last_result = Some(update.result);
        agent.last_http_status = Some(update.http_status);
        if agent.thumbnail.is_none() {
            agent.thumbnail = update.thumbnail.clone();
        }
        if update.checkout_attempted_at.is_some() {
            agent.last_checkout_attempt = update.checkout_attempted_at;
        }
        Ok(())
    }

    async fn append_log(
        &self,
        user_id: &str,
        agent_id: &str,
        entry: &CheckLogEntry,
    ) -> Result<()> {
        self.state
            .write()
            .await
            .logs
            .entry(key(user_id, agent_id))
            .or_default()
            .push(entry.clone());
        Ok(())
    }

    async fn list_logs(
        &self,
        user_id: &str,
        agent_id: &str,
        limit: usize,
    ) -> Result<Vec<CheckLogEntry>> {
        let state = self.state.read().await;
        Ok(state
            .logs
            .get(&key(user_id, agent_id))
            .map(|logs| logs.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl UserRepository for InMemoryStore {
    async fn get_notification_preference(
        &self,
        user_id: &str,
    ) -> Result<Option<NotificationPreference>> {
        Ok(self.state.read().await.users.get(user_id).cloned())
    }

    async fn save_webhook(&self, user_id: &str, encrypted_url: Option<String>) -> Result<()> {
        let mut state = self.state.write().await;
        state.users.entry(user_id.to_string()).or_default().webhook = encrypted_url;
        Ok(())
    }

    async fn connect_telegram(&self, user_id: &str, link: TelegramLink) -> Result<()> {
        let mut state = self.state.write().await;
        let pref = state.users.entry(user_id.to_string()).or_default();
        pref.channel = NotificationChannel::Telegram;
        pref.telegram = Some(link);
        Ok(())
    }

    async fn disconnect_telegram(&self, user_id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let pref = state.users.entry(user_id.to_string()).or_default();
        pref.channel = NotificationChannel::Webhook;
        pref.telegram = None;
        Ok(())
    }
}

#[async_trait]
impl PaymentMethodRepository for InMemoryStore {
    async fn get_payment_method(
        &self,
        user_id: &str,
        method_id: &str,
    ) -> Result<Option<PaymentMethodRecord>> {
        Ok(self
            .state
            .read()
            .await
            .payment_methods
            .get(&key(user_id, method_id))
            .cloned())
    }

    async fn add_payment_method(
        &self,
        user_id: &str,
        record: &PaymentMethodRecord,
    ) -> Result<()> {
        self.state
            .write()
            .await
            .payment_methods
            .insert(key(user_id, &record.id), record.clone());
        Ok(())
    }

    async fn update_payment_method(
        &self,
        user_id: &str,
        record: &PaymentMethodRecord,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.payment_methods.get_mut(&key(user_id, &record.id)) {
            Some(existing) => {
                *existing = record.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CheckResult, CheckStrategy};
    use chrono::Utc;

    #[tokio::test]
    async fn test_list_enabled_agents() {
        let store = InMemoryStore::new();
        let on = Agent::new("u1", "https://a.example.com", CheckStrategy::default());
        let mut off = Agent::new("u2", "https://b.example.com", CheckStrategy::default());
        off.status = AgentStatus::Disabled;
        store.save_agent(&on).await.unwrap();
        store.save_agent(&off).await.unwrap();

        let enabled = store.list_enabled_agents().await.unwrap();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].id, on.id);
    }

    #[tokio::test]
    async fn test_thumbnail_written_once() {
        let store = InMemoryStore::new();
        let agent = Agent::new("u1", "https://a.example.com", CheckStrategy::default());
        store.save_agent(&agent).await.unwrap();

        for thumb in ["https://img/1.jpg", "https://img/2.jpg"] {
            let update = CheckStateUpdate {
                checked_at: Utc::now(),
                result: CheckResult::InStock,
                http_status: 200,
                thumbnail: Some(thumb.to_string()),
                checkout_attempted_at: None,
            };
            store.update_check_state("u1", &agent.id, &update).await.unwrap();
        }

        let stored = store.get_agent("u1", &agent.id).await.unwrap().unwrap();
        assert_eq!(stored.thumbnail.as_deref(), Some("https://img/1.jpg"));
        assert_eq!(stored.last_result, Some(CheckResult::InStock));
    }

    #[tokio::test]
    async fn test_update_missing_agent() {
        let store = InMemoryStore::new();
        let update = CheckStateUpdate {
            checked_at: Utc::now(),
            result: CheckResult::Error,
            http_status: 0,
            thumbnail: None,
            checkout_attempted_at: None,
        };
        let err = store.update_check_state("u1", "nope", &update).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_telegram_connect_keeps_webhook() {
        let store = InMemoryStore::new();
        store.save_webhook("u1", Some("cipher".to_string())).await.unwrap();
        store
            .connect_telegram(
                "u1",
                TelegramLink {
                    chat_id: "42".to_string(),
                    connected_at: Utc::now(),
                },
            )
            .await
            .unwrap();

        let pref = store.get_notification_preference("u1").await.unwrap().unwrap();
        assert_eq!(pref.channel, NotificationChannel::Telegram);
        assert_eq!(pref.webhook.as_deref(), Some("cipher"));
        assert_eq!(pref.telegram_chat(), Some("42"));

        store.disconnect_telegram("u1").await.unwrap();
        let pref = store.get_notification_preference("u1").await.unwrap().unwrap();
        assert_eq!(pref.channel, NotificationChannel::Webhook);
        assert!(pref.telegram.is_none());
        assert_eq!(pref.webhook.as_deref(), Some("cipher"));
    }

    #[tokio::test]
    async fn test_update_payment_method_requires_existing() {
        let store = InMemoryStore::new();
        let record = PaymentMethodRecord {
            id: "pm1".to_string(),
            encrypted_number: "aa".to_string(),
            encrypted_cvc: "bb".to_string(),
            expiry: "01/30".to_string(),
            cardholder_name: "Brock".to_string(),
            last4: "1111".to_string(),
            is_prepaid: false,
            balance: None,
        };
        assert!(!store.update_payment_method("u1", &record).await.unwrap());
        assert!(store.get_payment_method("u1", "pm1").await.unwrap().is_none());

        store.add_payment_method("u1", &record).await.unwrap();
        let renamed = PaymentMethodRecord {
            cardholder_name: "Brock Harrison".to_string(),
            ..record
        };
        assert!(store.update_payment_method("u1", &renamed).await.unwrap());
        let loaded = store.get_payment_method("u1", "pm1").await.unwrap().unwrap();
        assert_eq!(loaded.cardholder_name, "Brock Harrison");
    }
}
