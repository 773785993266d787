//! Periodic due-agent scheduling.

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::{debug, error, info};

use super::check::{CycleSummary, StockChecker};
use crate::repository::{AgentRepository, RepositoryError};

/// Drives [`StockChecker`] over every due agent.
#[derive(Clone)]
pub struct Scheduler {
    checker: StockChecker,
}

impl Scheduler {
    pub fn new(checker: StockChecker) -> Self {
        Self { checker }
    }

    /// Check every enabled agent that is due at `now`, concurrently.
    ///
    /// One agent failing (persistence error or panic) never affects the
    /// others; only failing to list agents aborts the cycle.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<CycleSummary, RepositoryError> {
        let agents = self.checker.store().list_enabled_agents().await?;
        let mut summary = CycleSummary {
            enabled: agents.len(),
            ..Default::default()
        };

        let due: Vec<_> = agents.into_iter().filter(|a| a.is_due(now)).collect();
        debug!("{} of {} enabled agents due", due.len(), summary.enabled);

        let mut agent_ids = Vec::with_capacity(due.len());
        let mut handles = Vec::with_capacity(due.len());
        for agent in due {
            let checker = self.checker.clone();
            agent_ids.push(agent.id.clone());
            handles.push(tokio::spawn(async move { checker.check_agent(&agent).await }));
        }

        for (agent_id, joined) in agent_ids.into_iter().zip(join_all(handles).await) {
            match joined {
                Ok(Ok(report)) => summary.record(&report),
                Ok(Err(e)) => {
                    error!("Failed to persist check for agent {}: {}", agent_id, e);
                    summary.failed += 1;
                }
                Err(e) => {
                    error!("Check task for agent {} panicked: {}", agent_id, e);
                    summary.failed += 1;
                }
            }
        }

        info!(
            "Cycle complete: {} checked ({} in stock, {} out of stock, {} blocked, {} errors, {} failed), {} notified",
            summary.checked,
            summary.in_stock,
            summary.out_of_stock,
            summary.bot_detected,
            summary.errors,
            summary.failed,
            summary.notified
        );
        Ok(summary)
    }

    /// Run a cycle every `interval` until Ctrl-C.
    pub async fn run_forever(&self, interval: Duration) -> Result<(), RepositoryError> {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!("Scheduler started, checking every {}s", interval.as_secs());

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_cycle(Utc::now()).await {
                        error!("Scheduling cycle failed: {}", e);
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutting down scheduler");
                    return Ok(());
                }
            }
        }
    }
}
