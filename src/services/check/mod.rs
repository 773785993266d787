//! Per-agent stock check pipeline.
//!
//! Fetch (with escalation), evaluate, notify on status change, persist the
//! new state and append one check log entry. Only persistence failures
//! reach the caller; fetch and evaluation failures become `ERROR` results.

mod checkout;
mod types;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use scraper::Html;
use tracing::{error, info, warn};

use crate::crypto::Cipher;
use crate::models::{Agent, CheckLogEntry, CheckResult, CheckStateUpdate};
use crate::notifications::Notifier;
use crate::repository::{AgentRepository, RepositoryError, Store};
use crate::scrapers::{PageRetriever, Retrieval};
use crate::stock::{evaluate, extract_thumbnail, EvaluationError};

pub use types::{CheckReport, CycleSummary, BOT_DETECTED_MESSAGE};

/// Whether a transition from `previous` to `current` should alert the user.
///
/// Alerts fire on the first definitive result and on every change between
/// definitive results. Bot-detection on either side suppresses the alert,
/// and errors never alert.
pub fn should_notify(previous: Option<CheckResult>, current: CheckResult) -> bool {
    if matches!(current, CheckResult::BotDetected | CheckResult::Error) {
        return false;
    }
    match previous {
        None => true,
        Some(CheckResult::BotDetected) => false,
        Some(previous) => previous != current,
    }
}

/// Outcome of looking at one page, before anything is persisted.
enum Observation {
    Stock {
        in_stock: bool,
        message: String,
        status: u16,
        thumbnail: Option<String>,
    },
    Blocked {
        vendor: Option<&'static str>,
        status: u16,
        thumbnail: Option<String>,
    },
    Failed {
        message: String,
        status: u16,
    },
}

/// Thumbnail for an agent that has none yet.
fn missing_thumbnail(document: &Html, agent: &Agent) -> Option<String> {
    if agent.thumbnail.is_none() {
        extract_thumbnail(document, &agent.url)
    } else {
        None
    }
}

/// Evaluate fetched HTML, picking up a thumbnail when the agent lacks one.
fn inspect(
    html: &str,
    agent: &Agent,
) -> Result<(crate::stock::Evaluation, Option<String>), EvaluationError> {
    let document = Html::parse_document(html);
    let evaluation = evaluate(&document, &agent.check)?;
    Ok((evaluation, missing_thumbnail(&document, agent)))
}

/// Runs check cycles for individual agents.
#[derive(Clone)]
pub struct StockChecker {
    store: Arc<dyn Store>,
    retriever: PageRetriever,
    notifier: Arc<dyn Notifier>,
    cipher: Arc<dyn Cipher>,
}

impl StockChecker {
    pub fn new(
        store: Arc<dyn Store>,
        retriever: PageRetriever,
        notifier: Arc<dyn Notifier>,
        cipher: Arc<dyn Cipher>,
    ) -> Self {
        Self {
            store,
            retriever,
            notifier,
            cipher,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    async fn observe(&self, agent: &Agent) -> Observation {
        let retrieval = match self.retriever.retrieve(&agent.url).await {
            Ok(retrieval) => retrieval,
            Err(e) => {
                return Observation::Failed {
                    message: e.to_string(),
                    status: e.http_status().unwrap_or(0),
                }
            }
        };

        match retrieval {
            Retrieval::Blocked {
                vendor,
                status,
                html,
            } => Observation::Blocked {
                vendor,
                status,
                thumbnail: html
                    .and_then(|html| missing_thumbnail(&Html::parse_document(&html), agent)),
            },
            Retrieval::Page { html, status, .. } => match inspect(&html, agent) {
                Ok((evaluation, thumbnail)) => Observation::Stock {
                    in_stock: evaluation.in_stock,
                    message: evaluation.message,
                    status,
                    thumbnail,
                },
                Err(e) => Observation::Failed {
                    message: e.to_string(),
                    status,
                },
            },
        }
    }

    /// Run one full check cycle for `agent`.
    pub async fn check_agent(&self, agent: &Agent) -> Result<CheckReport, RepositoryError> {
        info!("Checking agent {} ({})", agent.id, agent.url);
        let observation = self.observe(agent).await;
        let now = Utc::now();

        let (result, message, status, thumbnail) = match observation {
            Observation::Failed { message, status } => {
                error!("Failed to check url {}: {}", agent.url, message);
                return self.record_error(agent, message, status, now).await;
            }
            Observation::Blocked {
                vendor,
                status,
                thumbnail,
            } => {
                warn!(
                    "Agent {} blocked by {} ⚠️",
                    agent.id,
                    vendor.unwrap_or("unknown protection")
                );
                (
                    CheckResult::BotDetected,
                    BOT_DETECTED_MESSAGE.to_string(),
                    status,
                    thumbnail,
                )
            }
            Observation::Stock {
                in_stock,
                message,
                status,
                thumbnail,
            } => (CheckResult::from_stock(in_stock), message, status, thumbnail),
        };

        if let Some(thumb) = &thumbnail {
            info!("Scraped thumbnail for {}: {}", agent.id, thumb);
        }

        let checkout_attempted_at = if result == CheckResult::InStock && agent.auto_checkout {
            checkout::attempt_checkout(
                self.store.as_ref(),
                self.cipher.as_ref(),
                agent,
                status,
                now,
            )
            .await
        } else {
            None
        };

        let notified = if should_notify(agent.last_result, result) {
            if let Some(previous) = agent.last_result {
                info!("Status changed for {}: {} → {}", agent.id, previous, result);
            }
            Some(
                self.notifier
                    .notify(&agent.user_id, agent, result == CheckResult::InStock)
                    .await,
            )
        } else {
            None
        };

        let update = CheckStateUpdate {
            checked_at: now,
            result,
            http_status: status,
            thumbnail: thumbnail.clone(),
            checkout_attempted_at,
        };
        self.store
            .update_check_state(&agent.user_id, &agent.id, &update)
            .await?;
        self.store
            .append_log(
                &agent.user_id,
                &agent.id,
                &CheckLogEntry {
                    timestamp: now,
                    result: result.into(),
                    message: message.clone(),
                    http_status: status,
                },
            )
            .await?;

        info!("Check complete for {}: {}", agent.id, result);
        Ok(CheckReport {
            agent_id: agent.id.clone(),
            result,
            message,
            http_status: status,
            notified,
            thumbnail,
        })
    }

    async fn record_error(
        &self,
        agent: &Agent,
        message: String,
        status: u16,
        now: DateTime<Utc>,
    ) -> Result<CheckReport, RepositoryError> {
        let update = CheckStateUpdate {
            checked_at: now,
            result: CheckResult::Error,
            http_status: status,
            thumbnail: None,
            checkout_attempted_at: None,
        };
        self.store
            .update_check_state(&agent.user_id, &agent.id, &update)
            .await?;
        self.store
            .append_log(
                &agent.user_id,
                &agent.id,
                &CheckLogEntry {
                    timestamp: now,
                    result: CheckResult::Error.into(),
                    message: message.clone(),
                    http_status: status,
                },
            )
            .await?;

        Ok(CheckReport {
            agent_id: agent.id.clone(),
            result: CheckResult::Error,
            message,
            http_status: status,
            notified: None,
            thumbnail: None,
        })
    }
}
