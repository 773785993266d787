//! Monitored product agents and their check strategies.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Frequency used when an agent record does not carry one.
pub const DEFAULT_FREQUENCY_MINUTES: u32 = 5;

/// Keywords used by [`CheckStrategy::KeywordPresent`] when none are configured.
pub const DEFAULT_POSITIVE_KEYWORDS: &str = "add to cart, in stock";

/// Keywords used by [`CheckStrategy::KeywordMissing`] when none are configured.
pub const DEFAULT_NEGATIVE_KEYWORDS: &str =
    "out of stock, sold out, currently unavailable, notify me";

/// Whether the scheduler should consider an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentStatus {
    #[default]
    Enabled,
    Disabled,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enabled => "ENABLED",
            Self::Disabled => "DISABLED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ENABLED" => Some(Self::Enabled),
            "DISABLED" => Some(Self::Disabled),
            _ => None,
        }
    }
}

/// Comparison applied to the content of a selector match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Condition {
    Equals,
    NotEquals,
    Contains,
    /// At least one element matches. Used when no condition is configured.
    #[default]
    Exists,
}

impl Condition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equals => "EQUALS",
            Self::NotEquals => "NOT_EQUALS",
            Self::Contains => "CONTAINS",
            Self::Exists => "EXISTS",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "EQUALS" => Some(Self::Equals),
            "NOT_EQUALS" => Some(Self::NotEquals),
            "CONTAINS" => Some(Self::Contains),
            "EXISTS" => Some(Self::Exists),
            _ => None,
        }
    }
}

/// How an agent decides whether a page shows the product in stock.
///
/// Stored as an internally tagged object (`{"checkType": "SELECTOR", ...}`).
/// Unknown check types or conditions fail deserialization, so a malformed
/// agent record is rejected when it is loaded rather than when it is checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "checkType", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckStrategy {
    /// Inspect the content of elements matched by a CSS selector.
    #[serde(rename_all = "camelCase")]
    Selector {
        selector: String,
        #[serde(default)]
        condition: Condition,
        #[serde(default)]
        expected_value: Option<String>,
    },
    /// In stock when any of the keywords appears in the page body.
    KeywordPresent {
        #[serde(default)]
        keywords: Option<String>,
    },
    /// In stock when none of the keywords appears in the page body.
    KeywordMissing {
        #[serde(default)]
        keywords: Option<String>,
    },
}

impl Default for CheckStrategy {
    fn default() -> Self {
        Self::KeywordMissing { keywords: None }
    }
}

impl CheckStrategy {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Selector { .. } => "SELECTOR",
            Self::KeywordPresent { .. } => "KEYWORD_PRESENT",
            Self::KeywordMissing { .. } => "KEYWORD_MISSING",
        }
    }
}

/// Outcome of a single stock check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckResult {
    InStock,
    OutOfStock,
    BotDetected,
    Error,
}

impl CheckResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InStock => "IN_STOCK",
            Self::OutOfStock => "OUT_OF_STOCK",
            Self::BotDetected => "BOT_DETECTED",
            Self::Error => "ERROR",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "IN_STOCK" => Some(Self::InStock),
            "OUT_OF_STOCK" => Some(Self::OutOfStock),
            "BOT_DETECTED" => Some(Self::BotDetected),
            "ERROR" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn from_stock(in_stock: bool) -> Self {
        if in_stock {
            Self::InStock
        } else {
            Self::OutOfStock
        }
    }
}

impl std::fmt::Display for CheckResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One monitored URL owned by one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: String,
    pub user_id: String,
    pub url: String,
    pub name: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default = "default_frequency")]
    pub frequency_minutes: u32,
    #[serde(flatten)]
    pub check: CheckStrategy,
    #[serde(default)]
    pub status: AgentStatus,
    #[serde(default)]
    pub auto_checkout: bool,
    #[serde(default)]
    pub auto_checkout_card_id: Option<String>,
    /// Encrypted webhook URL that overrides the owner's default webhook.
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub last_checked: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_result: Option<CheckResult>,
    #[serde(default)]
    pub last_http_status: Option<u16>,
    #[serde(default)]
    pub last_checkout_attempt: Option<DateTime<Utc>>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    pub created_at: DateTime<Utc>,
}

fn default_frequency() -> u32 {
    DEFAULT_FREQUENCY_MINUTES
}

impl Agent {
    /// Create a new enabled agent for `url`, named after the URL host.
    pub fn new(user_id: impl Into<String>, url: impl Into<String>, check: CheckStrategy) -> Self {
        let url = url.into();
        let name = host_name(&url).unwrap_or_else(|| url.clone());
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            url,
            name,
            alias: None,
            frequency_minutes: DEFAULT_FREQUENCY_MINUTES,
            check,
            status: AgentStatus::Enabled,
            auto_checkout: false,
            auto_checkout_card_id: None,
            webhook_url: None,
            last_checked: None,
            last_result: None,
            last_http_status: None,
            last_checkout_attempt: None,
            thumbnail: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.status == AgentStatus::Enabled
    }

    /// When the agent next becomes eligible. Never-checked agents count from
    /// the Unix epoch, so they are always due.
    pub fn next_check_at(&self) -> DateTime<Utc> {
        let last = self.last_checked.unwrap_or(DateTime::UNIX_EPOCH);
        let minutes = if self.frequency_minutes == 0 {
            DEFAULT_FREQUENCY_MINUTES
        } else {
            self.frequency_minutes
        };
        last + Duration::minutes(i64::from(minutes))
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.next_check_at()
    }

    /// Name shown in notifications: alias, then name, then a generic label.
    pub fn display_title(&self) -> &str {
        [self.alias.as_deref(), Some(self.name.as_str())]
            .into_iter()
            .flatten()
            .find(|s| !s.is_empty())
            .unwrap_or("Product")
    }
}

/// Host portion of a URL, used as the default agent name.
pub fn host_name(url: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
}

/// Fields written back to an agent after each check.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckStateUpdate {
    pub checked_at: DateTime<Utc>,
    pub result: CheckResult,
    pub http_status: u16,
    /// Only set when the agent had no thumbnail before this check.
    pub thumbnail: Option<String>,
    pub checkout_attempted_at: Option<DateTime<Utc>>,
}
