//! Agent management commands.

use console::style;

use crate::config::Settings;
use crate::models::{Agent, AgentStatus, CheckStrategy, Condition};
use crate::repository::AgentRepository;

use super::super::helpers::{self, truncate};

/// Arguments for a new agent, after CLI parsing.
pub struct NewAgent {
    pub user_id: String,
    pub url: String,
    pub alias: Option<String>,
    pub frequency: u32,
    pub strategy: CheckStrategy,
    pub auto_checkout: bool,
    pub card: Option<String>,
    pub webhook: Option<String>,
}

/// Build a check strategy from `agent add` flags.
///
/// A selector wins over keywords; otherwise `--present` picks the
/// positive-keyword strategy and the default is keyword-missing.
pub fn strategy_from_args(
    keywords: Option<String>,
    present: bool,
    selector: Option<String>,
    condition: Condition,
    expected: Option<String>,
) -> CheckStrategy {
    match selector {
        Some(selector) => CheckStrategy::Selector {
            selector,
            condition,
            expected_value: expected,
        },
        None if present => CheckStrategy::KeywordPresent { keywords },
        None => CheckStrategy::KeywordMissing { keywords },
    }
}

pub async fn cmd_agent_add(settings: &Settings, new: NewAgent) -> anyhow::Result<()> {
    if url::Url::parse(&new.url).is_err() {
        anyhow::bail!("'{}' is not a valid URL", new.url);
    }

    let store = helpers::open_store(settings)?;
    let mut agent = Agent::new(new.user_id, new.url, new.strategy);
    agent.alias = new.alias.filter(|a| !a.trim().is_empty());
    agent.frequency_minutes = new.frequency;
    agent.auto_checkout = new.auto_checkout;
    agent.auto_checkout_card_id = new.card;

    if let Some(webhook) = new.webhook.filter(|w| !w.trim().is_empty()) {
        let cipher = helpers::load_cipher()?;
        agent.webhook_url = Some(cipher.encrypt(webhook.trim())?);
    }

    store.save_agent(&agent).await?;

    println!(
        "{} Watching {} as {} ({})",
        style("✓").green(),
        style(&agent.url).cyan(),
        style(agent.display_title()).bold(),
        agent.check.kind()
    );
    println!("  Agent ID: {}", agent.id);
    Ok(())
}

pub async fn cmd_agent_list(settings: &Settings, user_id: &str) -> anyhow::Result<()> {
    let store = helpers::open_store(settings)?;
    let agents = store.list_agents(user_id).await?;

    if agents.is_empty() {
        println!(
            "{} No agents for '{}'. Add one with 'rotom agent add'.",
            style("!").yellow(),
            user_id
        );
        return Ok(());
    }

    println!("\n{}", style("Agents").bold());
    println!("{}", "-".repeat(100));
    println!(
        "{:<36} {:<24} {:<16} {:<9} {:<14} Last Checked",
        "ID", "Name", "Strategy", "Status", "Last Result"
    );
    println!("{}", "-".repeat(100));

    for agent in agents {
        let last_checked = agent
            .last_checked
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "Never".to_string());
        let last_result = agent
            .last_result
            .map(|r| r.as_str())
            .unwrap_or("-");

        println!(
            "{:<36} {:<24} {:<16} {:<9} {:<14} {}",
            agent.id,
            truncate(agent.display_title(), 23),
            agent.check.kind(),
            agent.status.as_str(),
            last_result,
            last_checked
        );
    }

    Ok(())
}

pub async fn cmd_agent_set_enabled(
    settings: &Settings,
    user_id: &str,
    agent_id: &str,
    enabled: bool,
) -> anyhow::Result<()> {
    let store = helpers::open_store(settings)?;
    let status = if enabled {
        AgentStatus::Enabled
    } else {
        AgentStatus::Disabled
    };

    if store.set_agent_status(user_id, agent_id, status).await? {
        println!(
            "{} Agent {} is now {}",
            style("✓").green(),
            agent_id,
            status.as_str()
        );
    } else {
        println!("{} Agent '{}' not found", style("✗").red(), agent_id);
    }
    Ok(())
}

pub async fn cmd_agent_remove(
    settings: &Settings,
    user_id: &str,
    agent_id: &str,
) -> anyhow::Result<()> {
    let store = helpers::open_store(settings)?;
    if store.delete_agent(user_id, agent_id).await? {
        println!("{} Removed agent {}", style("✓").green(), agent_id);
    } else {
        println!("{} Agent '{}' not found", style("✗").red(), agent_id);
    }
    Ok(())
}

pub async fn cmd_agent_logs(
    settings: &Settings,
    user_id: &str,
    agent_id: &str,
    limit: usize,
) -> anyhow::Result<()> {
    let store = helpers::open_store(settings)?;
    let logs = store.list_logs(user_id, agent_id, limit).await?;

    if logs.is_empty() {
        println!("{} No history for agent '{}'", style("!").yellow(), agent_id);
        return Ok(());
    }

    for entry in logs {
        println!(
            "{}  {:<18} {:>3}  {}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.result.as_str(),
            entry.http_status,
            entry.message
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_from_args() {
        assert_eq!(
            strategy_from_args(None, false, None, Condition::Exists, None),
            CheckStrategy::KeywordMissing { keywords: None }
        );
        assert_eq!(
            strategy_from_args(Some("buy now".into()), true, None, Condition::Exists, None),
            CheckStrategy::KeywordPresent {
                keywords: Some("buy now".into())
            }
        );
        assert_eq!(
            strategy_from_args(
                Some("ignored".into()),
                false,
                Some("#stock".into()),
                Condition::Equals,
                Some("In Stock".into())
            ),
            CheckStrategy::Selector {
                selector: "#stock".into(),
                condition: Condition::Equals,
                expected_value: Some("In Stock".into()),
            }
        );
    }
}
