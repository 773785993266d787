//! Check service types.

use crate::models::CheckResult;
use crate::notifications::NotifyOutcome;

/// Bot-protection outcome recorded in the check log.
pub const BOT_DETECTED_MESSAGE: &str =
    "Bot detection (WAF/anti-scraping) blocked access to page. Real stock status unknown.";

/// What one check cycle did for one agent.
#[derive(Debug, Clone)]
pub struct CheckReport {
    pub agent_id: String,
    pub result: CheckResult,
    pub message: String,
    /// HTTP status observed, 0 when no response was received.
    pub http_status: u16,
    /// `None` when the notification rule did not fire.
    pub notified: Option<NotifyOutcome>,
    /// Thumbnail newly cached by this cycle.
    pub thumbnail: Option<String>,
}

/// Result of a scheduling pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    /// Enabled agents considered.
    pub enabled: usize,
    /// Agents that were due and got checked.
    pub checked: usize,
    pub in_stock: usize,
    pub out_of_stock: usize,
    pub bot_detected: usize,
    pub errors: usize,
    pub notified: usize,
    /// Checks that could not be persisted or whose task panicked.
    pub failed: usize,
}

impl CycleSummary {
    pub(crate) fn record(&mut self, report: &CheckReport) {
        self.checked += 1;
        match report.result {
            CheckResult::InStock => self.in_stock += 1,
            CheckResult::OutOfStock => self.out_of_stock += 1,
            CheckResult::BotDetected => self.bot_detected += 1,
            CheckResult::Error => self.errors += 1,
        }
        if report.notified.as_ref().is_some_and(NotifyOutcome::is_sent) {
            self.notified += 1;
        }
    }
}
