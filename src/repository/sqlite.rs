//! SQLite-backed store.
//!
//! One connection per operation, run on the blocking pool. Check strategies
//! are stored as JSON and decoded on load, so an agent with an unknown check
//! type or condition is rejected here rather than mid-check.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rusqlite::{params, Connection, Row};
use tracing::warn;

use super::{
    parse_datetime, parse_datetime_opt, to_option, AgentRepository, PaymentMethodRepository,
    RepositoryError, Result, UserRepository,
};
use crate::models::{
    Agent, AgentStatus, CheckLogEntry, CheckResult, CheckStateUpdate, CheckStrategy, LogResult,
    NotificationChannel, NotificationPreference, PaymentMethodRecord, TelegramLink,
};

/// Open a database connection with proper concurrency settings.
fn connect(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 30000;
    "#,
    )?;
    Ok(conn)
}

const AGENT_COLUMNS: &str = "id, user_id, url, name, alias, frequency_minutes, check_config, \
     status, auto_checkout, auto_checkout_card_id, webhook_url, last_checked, last_result, \
     last_http_status, last_checkout_attempt, thumbnail, created_at";

/// Raw agent columns, decoded into an [`Agent`] outside the row callback so
/// that malformed records surface as [`RepositoryError::Corrupt`].
struct AgentRow {
    id: String,
    user_id: String,
    url: String,
    name: String,
    alias: Option<String>,
    frequency_minutes: i64,
    check_config: String,
    status: String,
    auto_checkout: bool,
    auto_checkout_card_id: Option<String>,
    webhook_url: Option<String>,
    last_checked: Option<String>,
    last_result: Option<String>,
    last_http_status: Option<i64>,
    last_checkout_attempt: Option<String>,
    thumbnail: Option<String>,
    created_at: String,
}

impl AgentRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            url: row.get("url")?,
            name: row.get("name")?,
            alias: row.get("alias")?,
            frequency_minutes: row.get("frequency_minutes")?,
            check_config: row.get("check_config")?,
            status: row.get("status")?,
            auto_checkout: row.get("auto_checkout")?,
            auto_checkout_card_id: row.get("auto_checkout_card_id")?,
            webhook_url: row.get("webhook_url")?,
            last_checked: row.get("last_checked")?,
            last_result: row.get("last_result")?,
            last_http_status: row.get("last_http_status")?,
            last_checkout_attempt: row.get("last_checkout_attempt")?,
            thumbnail: row.get("thumbnail")?,
            created_at: row.get("created_at")?,
        })
    }

    fn into_agent(self) -> Result<Agent> {
        let corrupt = |what: String| RepositoryError::Corrupt(format!("agent {}: {}", self.id, what));

        let check: CheckStrategy = serde_json::from_str(&self.check_config)
            .map_err(|e| corrupt(format!("check config: {}", e)))?;
        let status = AgentStatus::from_str(&self.status)
            .ok_or_else(|| corrupt(format!("unknown status '{}'", self.status)))?;
        let last_result = match self.last_result.as_deref() {
            Some(s) => Some(
                CheckResult::from_str(s)
                    .ok_or_else(|| corrupt(format!("unknown result '{}'", s)))?,
            ),
            None => None,
        };

        Ok(Agent {
            frequency_minutes: u32::try_from(self.frequency_minutes)
                .unwrap_or(crate::models::DEFAULT_FREQUENCY_MINUTES),
            check,
            status,
            last_result,
            last_checked: parse_datetime_opt(self.last_checked),
            last_http_status: self.last_http_status.and_then(|s| u16::try_from(s).ok()),
            last_checkout_attempt: parse_datetime_opt(self.last_checkout_attempt),
            created_at: parse_datetime(&self.created_at),
            id: self.id,
            user_id: self.user_id,
            url: self.url,
            name: self.name,
            alias: self.alias,
            auto_checkout: self.auto_checkout,
            auto_checkout_card_id: self.auto_checkout_card_id,
            webhook_url: self.webhook_url,
            thumbnail: self.thumbnail,
        })
    }
}

/// SQLite persistence for every repository capability.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db_path: PathBuf,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `db_path`.
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| RepositoryError::Database(e.to_string()))?;
            }
        }
        let store = Self {
            db_path: db_path.to_path_buf(),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn init_schema(&self) -> Result<()> {
        let conn = connect(&self.db_path)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                channel TEXT NOT NULL DEFAULT 'webhook',
                webhook TEXT,
                telegram_chat_id TEXT,
                telegram_connected_at TEXT
            );

            CREATE TABLE IF NOT EXISTS agents (
                id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                url TEXT NOT NULL,
                name TEXT NOT NULL,
                alias TEXT,
                frequency_minutes INTEGER NOT NULL DEFAULT 5,
                check_config TEXT NOT NULL,
                status TEXT NOT NULL,
                auto_checkout INTEGER NOT NULL DEFAULT 0,
                auto_checkout_card_id TEXT,
                webhook_url TEXT,
                last_checked TEXT,
                last_result TEXT,
                last_http_status INTEGER,
                last_checkout_attempt TEXT,
                thumbnail TEXT,
                created_at TEXT NOT NULL,
                PRIMARY KEY (user_id, id)
            );
            CREATE INDEX IF NOT EXISTS idx_agents_status ON agents(status);

            CREATE TABLE IF NOT EXISTS agent_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                agent_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                result TEXT NOT NULL,
                message TEXT NOT NULL,
                http_status INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_agent_logs_agent ON agent_logs(user_id, agent_id);

            CREATE TABLE IF NOT EXISTS payment_methods (
                id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                encrypted_number TEXT NOT NULL,
                encrypted_cvc TEXT NOT NULL,
                expiry TEXT NOT NULL,
                cardholder_name TEXT NOT NULL,
                last4 TEXT NOT NULL,
                is_prepaid INTEGER NOT NULL DEFAULT 0,
                balance REAL,
                PRIMARY KEY (user_id, id)
            );
        "#,
        )?;
        Ok(())
    }

    /// Run `f` against a fresh connection on the blocking pool.
    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = connect(&path)?;
            f(&conn)
        })
        .await?
    }
}

fn ensure_user(conn: &Connection, user_id: &str) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO users (id, channel) VALUES (?1, 'webhook')",
        params![user_id],
    )?;
    Ok(())
}

#[async_trait]
impl AgentRepository for SqliteStore {
    async fn list_enabled_agents(&self) -> Result<Vec<Agent>> {
        self.run(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM agents WHERE status = ?1 ORDER BY created_at",
                AGENT_COLUMNS
            ))?;
            let rows = stmt
                .query_map(params![AgentStatus::Enabled.as_str()], AgentRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows
                .into_iter()
                .filter_map(|row| match row.into_agent() {
                    Ok(agent) => Some(agent),
                    Err(e) => {
                        warn!("Skipping agent: {}", e);
                        None
                    }
                })
                .collect())
        })
        .await
    }

    async fn get_agent(&self, user_id: &str, agent_id: &str) -> Result<Option<Agent>> {
        let (user_id, agent_id) = (user_id.to_string(), agent_id.to_string());
        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM agents WHERE user_id = ?1 AND id = ?2",
                AGENT_COLUMNS
            ))?;
            to_option(stmt.query_row(params![user_id, agent_id], AgentRow::from_row))?
                .map(AgentRow::into_agent)
                .transpose()
        })
        .await
    }

    async fn list_agents(&self, user_id: &str) -> Result<Vec<Agent>> {
        let user_id = user_id.to_string();
        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM agents WHERE user_id = ?1 ORDER BY created_at",
                AGENT_COLUMNS
            ))?;
            let rows = stmt
                .query_map(params![user_id], AgentRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(AgentRow::into_agent).collect()
        })
        .await
    }

    async fn save_agent(&self, agent: &Agent) -> Result<()> {
        let agent = agent.clone();
        self.run(move |conn| {
            ensure_user(conn, &agent.user_id)?;
            conn.execute(
                r#"
                INSERT INTO agents (id, user_id, url, name, alias, frequency_minutes, check_config,
                    status, auto_checkout, auto_checkout_card_id, webhook_url, last_checked,
                    last_result, last_http_status, last_checkout_attempt, thumbnail, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
                ON CONFLICT(user_id, id) DO UPDATE SET
                    url = excluded.url,
                    name = excluded.name,
                    alias = excluded.alias,
                    frequency_minutes = excluded.frequency_minutes,
                    check_config = excluded.check_config,
                    status = excluded.status,
                    auto_checkout = excluded.auto_checkout,
                    auto_checkout_card_id = excluded.auto_checkout_card_id,
                    webhook_url = excluded.webhook_url
                "#,
                params![
                    agent.id,
                    agent.user_id,
                    agent.url,
                    agent.name,
                    agent.alias,
                    agent.frequency_minutes,
                    serde_json::to_string(&agent.check)?,
                    agent.status.as_str(),
                    agent.auto_checkout,
                    agent.auto_checkout_card_id,
                    agent.webhook_url,
                    agent.last_checked.map(|dt| dt.to_rfc3339()),
                    agent.last_result.map(|r| r.as_str()),
                    agent.last_http_status,
                    agent.last_checkout_attempt.map(|dt| dt.to_rfc3339()),
                    agent.thumbnail,
                    agent.created_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn set_agent_status(
        &self,
        user_id: &str,
        agent_id: &str,
        status: AgentStatus,
    ) -> Result<bool> {
        let (user_id, agent_id) = (user_id.to_string(), agent_id.to_string());
        self.run(move |conn| {
            let rows = conn.execute(
                "UPDATE agents SET status = ?1 WHERE user_id = ?2 AND id = ?3",
                params![status.as_str(), user_id, agent_id],
            )?;
            Ok(rows > 0)
        })
        .await
    }

    async fn delete_agent(&self, user_id: &str, agent_id: &str) -> Result<bool> {
        let (user_id, agent_id) = (user_id.to_string(), agent_id.to_string());
        self.run(move |conn| {
            conn.execute(
                "DELETE FROM agent_logs WHERE user_id = ?1 AND agent_id = ?2",
                params![user_id, agent_id],
            )?;
            let rows = conn.execute(
                "DELETE FROM agents WHERE user_id = ?1 AND id = ?2",
                params![user_id, agent_id],
            )?;
            Ok(rows > 0)
        })
        .await
    }

    async fn update_check_state(
        &self,
        user_id: &str,
        agent_id: &str,
        update: &CheckStateUpdate,
    ) -> Result<()> {
        let (user_id, agent_id, update) =
            (user_id.to_string(), agent_id.to_string(), update.clone());
        self.run(move |conn| {
            let rows = conn.execute(
                r#"
                UPDATE agents SET
                    last_checked = ?1,
                    last_result = ?2,
                    last_http_status = ?3,
                    thumbnail = COALESCE(thumbnail, ?4),
                    last_checkout_attempt = COALESCE(?5, last_checkout_attempt)
                WHERE user_id = ?6 AND id = ?7
                "#,
                params![
                    update.checked_at.to_rfc3339(),
                    update.result.as_str(),
                    update.http_status,
                    update.thumbnail,
                    update.checkout_attempted_at.map(|dt| dt.to_rfc3339()),
                    user_id,
                    agent_id,
                ],
            )?;
            if rows == 0 {
                return Err(RepositoryError::NotFound(format!(
                    "agent {}/{}",
                    user_id, agent_id
                )));
            }
            Ok(())
        })
        .await
    }

    async fn append_log(
        &self,
        user_id: &str,
        agent_id: &str,
        entry: &CheckLogEntry,
    ) -> Result<()> {
        let (user_id, agent_id, entry) =
            (user_id.to_string(), agent_id.to_string(), entry.clone());
        self.run(move |conn| {
            conn.execute(
                r#"
                INSERT INTO agent_logs (user_id, agent_id, timestamp, result, message, http_status)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![
                    user_id,
                    agent_id,
                    entry.timestamp.to_rfc3339(),
                    entry.result.as_str(),
                    entry.message,
                    entry.http_status,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn list_logs(
        &self,
        user_id: &str,
        agent_id: &str,
        limit: usize,
    ) -> Result<Vec<CheckLogEntry>> {
        let (user_id, agent_id) = (user_id.to_string(), agent_id.to_string());
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                r#"
                SELECT timestamp, result, message, http_status FROM agent_logs
                WHERE user_id = ?1 AND agent_id = ?2
                ORDER BY id DESC LIMIT ?3
                "#,
            )?;
            let rows = stmt
                .query_map(params![user_id, agent_id, limit as i64], |row| {
                    Ok((
                        row.get::<_, String>("timestamp")?,
                        row.get::<_, String>("result")?,
                        row.get::<_, String>("message")?,
                        row.get::<_, i64>("http_status")?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|(timestamp, result, message, http_status)| {
                    Ok(CheckLogEntry {
                        timestamp: parse_datetime(&timestamp),
                        result: LogResult::from_str(&result).ok_or_else(|| {
                            RepositoryError::Corrupt(format!("unknown log result '{}'", result))
                        })?,
                        message,
                        http_status: u16::try_from(http_status).unwrap_or(0),
                    })
                })
                .collect()
        })
        .await
    }
}

#[async_trait]
impl UserRepository for SqliteStore {
    async fn get_notification_preference(
        &self,
        user_id: &str,
    ) -> Result<Option<NotificationPreference>> {
        let user_id = user_id.to_string();
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT channel, webhook, telegram_chat_id, telegram_connected_at FROM users WHERE id = ?1",
            )?;
            let row = to_option(stmt.query_row(params![user_id], |row| {
                Ok((
                    row.get::<_, String>("channel")?,
                    row.get::<_, Option<String>>("webhook")?,
                    row.get::<_, Option<String>>("telegram_chat_id")?,
                    row.get::<_, Option<String>>("telegram_connected_at")?,
                ))
            }))?;

            Ok(row.map(|(channel, webhook, chat_id, connected_at)| {
                NotificationPreference {
                    channel: NotificationChannel::from_str(&channel).unwrap_or_default(),
                    webhook,
                    telegram: chat_id.map(|chat_id| TelegramLink {
                        chat_id,
                        connected_at: connected_at
                            .as_deref()
                            .map(parse_datetime)
                            .unwrap_or(chrono::DateTime::UNIX_EPOCH),
                    }),
                }
            }))
        })
        .await
    }

    async fn save_webhook(&self, user_id: &str, encrypted_url: Option<String>) -> Result<()> {
        let user_id = user_id.to_string();
        self.run(move |conn| {
            ensure_user(conn, &user_id)?;
            conn.execute(
                "UPDATE users SET webhook = ?1 WHERE id = ?2",
                params![encrypted_url, user_id],
            )?;
            Ok(())
        })
        .await
    }

    async fn connect_telegram(&self, user_id: &str, link: TelegramLink) -> Result<()> {
        let user_id = user_id.to_string();
        self.run(move |conn| {
            ensure_user(conn, &user_id)?;
            conn.execute(
                r#"
                UPDATE users SET channel = ?1, telegram_chat_id = ?2, telegram_connected_at = ?3
                WHERE id = ?4
                "#,
                params![
                    NotificationChannel::Telegram.as_str(),
                    link.chat_id,
                    link.connected_at.to_rfc3339(),
                    user_id,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn disconnect_telegram(&self, user_id: &str) -> Result<()> {
        let user_id = user_id.to_string();
        self.run(move |conn| {
            ensure_user(conn, &user_id)?;
            conn.execute(
                r#"
                UPDATE users SET channel = ?1, telegram_chat_id = NULL, telegram_connected_at = NULL
                WHERE id = ?2
                "#,
                params![NotificationChannel::Webhook.as_str(), user_id],
            )?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl PaymentMethodRepository for SqliteStore {
    async fn get_payment_method(
        &self,
        user_id: &str,
        method_id: &str,
    ) -> Result<Option<PaymentMethodRecord>> {
        let (user_id, method_id) = (user_id.to_string(), method_id.to_string());
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                r#"
                SELECT id, encrypted_number, encrypted_cvc, expiry, cardholder_name, last4,
                    is_prepaid, balance
                FROM payment_methods WHERE user_id = ?1 AND id = ?2
                "#,
            )?;
            to_option(stmt.query_row(params![user_id, method_id], |row| {
                Ok(PaymentMethodRecord {
                    id: row.get("id")?,
                    encrypted_number: row.get("encrypted_number")?,
                    encrypted_cvc: row.get("encrypted_cvc")?,
                    expiry: row.get("expiry")?,
                    cardholder_name: row.get("cardholder_name")?,
                    last4: row.get("last4")?,
                    is_prepaid: row.get("is_prepaid")?,
                    balance: row.get("balance")?,
                })
            }))
        })
        .await
    }

    async fn add_payment_method(
        &self,
        user_id: &str,
        record: &PaymentMethodRecord,
    ) -> Result<()> {
        let (user_id, record) = (user_id.to_string(), record.clone());
        self.run(move |conn| {
            ensure_user(conn, &user_id)?;
            conn.execute(
                r#"
                INSERT OR REPLACE INTO payment_methods (id, user_id, encrypted_number,
                    encrypted_cvc, expiry, cardholder_name, last4, is_prepaid, balance)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
                params![
                    record.id,
                    user_id,
                    record.encrypted_number,
                    record.encrypted_cvc,
                    record.expiry,
                    record.cardholder_name,
                    record.last4,
                    record.is_prepaid,
                    record.balance,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn update_payment_method(
        &self,
        user_id: &str,
        record: &PaymentMethodRecord,
    ) -> Result<bool> {
        let (user_id, record) = (user_id.to_string(), record.clone());
        self.run(move |conn| {
            let changed = conn.execute(
                r#"
                UPDATE payment_methods SET encrypted_number = ?3, encrypted_cvc = ?4,
                    expiry = ?5, cardholder_name = ?6, last4 = ?7, is_prepaid = ?8,
                    balance = ?9
                WHERE user_id = ?2 AND id = ?1
                "#,
                params![
                    record.id,
                    user_id,
                    record.encrypted_number,
                    record.encrypted_cvc,
                    record.expiry,
                    record.cardholder_name,
                    record.last4,
                    record.is_prepaid,
                    record.balance,
                ],
            )?;
            Ok(changed > 0)
        })
        .await
    }
}
