//! Scheduling and one-off check commands.

use std::time::Duration;

use chrono::Utc;
use console::style;

use crate::config::Settings;
use crate::models::CheckResult;
use crate::repository::AgentRepository;
use crate::services::{CheckReport, CycleSummary};

use super::super::helpers;

/// Run the scheduler until Ctrl-C.
pub async fn cmd_run(settings: &Settings, interval: Option<u64>) -> anyhow::Result<()> {
    let interval = interval
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .unwrap_or(settings.interval);
    let scheduler = helpers::scheduler(settings)?;

    println!(
        "{} Watching agents every {}s (Ctrl+C to stop)",
        style("→").cyan(),
        interval.as_secs()
    );
    scheduler.run_forever(interval).await?;
    Ok(())
}

/// Run one scheduling pass and print the summary.
pub async fn cmd_cycle(settings: &Settings) -> anyhow::Result<()> {
    let scheduler = helpers::scheduler(settings)?;
    let summary = scheduler.run_cycle(Utc::now()).await?;
    print_summary(&summary);
    Ok(())
}

/// Check a single agent immediately.
pub async fn cmd_check(settings: &Settings, user_id: &str, agent_id: &str) -> anyhow::Result<()> {
    let checker = helpers::stock_checker(settings)?;
    let Some(agent) = checker.store().get_agent(user_id, agent_id).await? else {
        println!("{} Agent '{}' not found", style("✗").red(), agent_id);
        return Ok(());
    };

    let report = checker.check_agent(&agent).await?;
    print_report(agent.display_title(), &report);
    Ok(())
}

fn styled_result(result: CheckResult) -> console::StyledObject<&'static str> {
    match result {
        CheckResult::InStock => style(result.as_str()).green().bold(),
        CheckResult::OutOfStock => style(result.as_str()).red(),
        CheckResult::BotDetected => style(result.as_str()).yellow(),
        CheckResult::Error => style(result.as_str()).red().bold(),
    }
}

fn print_report(title: &str, report: &CheckReport) {
    println!("\n{} {}", style("Agent:").bold(), title);
    println!("  Result:      {}", styled_result(report.result));
    println!("  Message:     {}", report.message);
    println!("  HTTP status: {}", report.http_status);
    if let Some(ref thumb) = report.thumbnail {
        println!("  Thumbnail:   {}", thumb);
    }
    match report.notified {
        Some(ref outcome) => println!("  Notified:    {:?}", outcome),
        None => println!("  Notified:    {}", style("no (status unchanged)").dim()),
    }
}

fn print_summary(summary: &CycleSummary) {
    println!(
        "{} Checked {} of {} enabled agents",
        style("✓").green(),
        summary.checked,
        summary.enabled
    );
    println!("  In stock:     {}", style(summary.in_stock).green());
    println!("  Out of stock: {}", summary.out_of_stock);
    println!("  Bot detected: {}", style(summary.bot_detected).yellow());
    println!("  Errors:       {}", style(summary.errors).red());
    println!("  Notified:     {}", summary.notified);
    if summary.failed > 0 {
        println!(
            "  {} {} checks could not be saved",
            style("!").yellow(),
            summary.failed
        );
    }
}
