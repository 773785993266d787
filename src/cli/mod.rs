//! Command-line interface.
//!
//! Parses arguments and dispatches to the command modules.

mod commands;
mod helpers;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{load_settings_with_options, LoadOptions};
use crate::models::Condition;

use commands::{agent, check, notify, payment, serve};

#[derive(Parser)]
#[command(name = "rotom")]
#[command(about = "Cart Rotom: watch product pages and get told when they come back in stock")]
#[command(version)]
pub struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler until interrupted
    Run {
        /// Seconds between scheduling passes (overrides config)
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// Run a single scheduling pass over all due agents
    Cycle,

    /// Check one agent now, regardless of schedule
    Check { user_id: String, agent_id: String },

    /// Manage monitored products
    Agent {
        #[command(subcommand)]
        command: AgentCommands,
    },

    /// Notification settings
    Notify {
        #[command(subcommand)]
        command: NotifyCommands,
    },

    /// Stored payment methods for auto-checkout
    Payment {
        #[command(subcommand)]
        command: PaymentCommands,
    },

    /// Serve the Telegram bot webhook
    Serve {
        /// Address to bind to: PORT, HOST, or HOST:PORT (default: 127.0.0.1:3030)
        #[arg(default_value = "127.0.0.1:3030")]
        bind: String,
    },
}

#[derive(Subcommand)]
enum AgentCommands {
    /// Start monitoring a product page
    Add {
        user_id: String,
        url: String,
        /// Display name used in notifications
        #[arg(long)]
        alias: Option<String>,
        /// Minutes between checks
        #[arg(short, long, default_value = "5")]
        frequency: u32,
        /// Comma-separated keywords
        #[arg(short, long)]
        keywords: Option<String>,
        /// In stock when a keyword is present (default: when none is present)
        #[arg(long, conflicts_with = "selector")]
        present: bool,
        /// CSS selector to inspect instead of keywords
        #[arg(short, long)]
        selector: Option<String>,
        /// Selector condition
        #[arg(long, value_enum, default_value = "exists")]
        condition: ConditionArg,
        /// Expected value for equals / not-equals / contains
        #[arg(long, requires = "selector")]
        expected: Option<String>,
        /// Attempt checkout when in stock
        #[arg(long, requires = "card")]
        auto_checkout: bool,
        /// Payment method id used for auto-checkout
        #[arg(long)]
        card: Option<String>,
        /// Webhook for this agent only (overrides the user default)
        #[arg(long)]
        webhook: Option<String>,
    },
    /// List a user's agents
    List { user_id: String },
    /// Resume monitoring
    Enable { user_id: String, agent_id: String },
    /// Pause monitoring
    Disable { user_id: String, agent_id: String },
    /// Delete an agent and its history
    Remove { user_id: String, agent_id: String },
    /// Show recent check history
    Logs {
        user_id: String,
        agent_id: String,
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum ConditionArg {
    Exists,
    Equals,
    NotEquals,
    Contains,
}

impl From<ConditionArg> for Condition {
    fn from(arg: ConditionArg) -> Self {
        match arg {
            ConditionArg::Exists => Condition::Exists,
            ConditionArg::Equals => Condition::Equals,
            ConditionArg::NotEquals => Condition::NotEquals,
            ConditionArg::Contains => Condition::Contains,
        }
    }
}

#[derive(Subcommand)]
enum NotifyCommands {
    /// Webhook delivery
    Webhook {
        #[command(subcommand)]
        command: WebhookCommands,
    },
    /// Telegram delivery
    Telegram {
        #[command(subcommand)]
        command: TelegramCommands,
    },
}

#[derive(Subcommand)]
enum WebhookCommands {
    /// Set the user's default webhook (omit the URL to clear it)
    Set { user_id: String, url: Option<String> },
    /// Send a test payload to a webhook URL
    Test { url: String },
}

#[derive(Subcommand)]
enum TelegramCommands {
    /// Link a Telegram chat and make it the active channel
    Connect { user_id: String, chat_id: String },
    /// Send a test message to a chat
    Test { chat_id: String },
    /// Unlink Telegram and fall back to webhooks
    Disconnect { user_id: String },
}

#[derive(Subcommand)]
enum PaymentCommands {
    /// Store an encrypted card
    Add {
        user_id: String,
        #[arg(long)]
        number: String,
        #[arg(long)]
        cvc: String,
        /// Expiry as MM/YY
        #[arg(long)]
        expiry: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        prepaid: bool,
        /// Remaining balance (prepaid cards only)
        #[arg(long, requires = "prepaid")]
        balance: Option<f64>,
    },
    /// Edit a stored card; number and CVC are replaced only together
    Update {
        user_id: String,
        method_id: String,
        #[arg(long, requires = "cvc")]
        number: Option<String>,
        #[arg(long, requires = "number")]
        cvc: Option<String>,
        /// Expiry as MM/YY
        #[arg(long)]
        expiry: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        prepaid: bool,
        /// Remaining balance (prepaid cards only)
        #[arg(long, requires = "prepaid")]
        balance: Option<f64>,
    },
}

/// Parse arguments and run the selected command.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (settings, _config) = load_settings_with_options(LoadOptions {
        config_path: cli.config,
    })
    .await
    .map_err(anyhow::Error::msg)?;

    match cli.command {
        Commands::Run { interval } => check::cmd_run(&settings, interval).await,
        Commands::Cycle => check::cmd_cycle(&settings).await,
        Commands::Check { user_id, agent_id } => {
            check::cmd_check(&settings, &user_id, &agent_id).await
        }
        Commands::Agent { command } => match command {
            AgentCommands::Add {
                user_id,
                url,
                alias,
                frequency,
                keywords,
                present,
                selector,
                condition,
                expected,
                auto_checkout,
                card,
                webhook,
            } => {
                let strategy = agent::strategy_from_args(
                    keywords,
                    present,
                    selector,
                    condition.into(),
                    expected,
                );
                agent::cmd_agent_add(
                    &settings,
                    agent::NewAgent {
                        user_id,
                        url,
                        alias,
                        frequency,
                        strategy,
                        auto_checkout,
                        card,
                        webhook,
                    },
                )
                .await
            }
            AgentCommands::List { user_id } => agent::cmd_agent_list(&settings, &user_id).await,
            AgentCommands::Enable { user_id, agent_id } => {
                agent::cmd_agent_set_enabled(&settings, &user_id, &agent_id, true).await
            }
            AgentCommands::Disable { user_id, agent_id } => {
                agent::cmd_agent_set_enabled(&settings, &user_id, &agent_id, false).await
            }
            AgentCommands::Remove { user_id, agent_id } => {
                agent::cmd_agent_remove(&settings, &user_id, &agent_id).await
            }
            AgentCommands::Logs {
                user_id,
                agent_id,
                limit,
            } => agent::cmd_agent_logs(&settings, &user_id, &agent_id, limit).await,
        },
        Commands::Notify { command } => match command {
            NotifyCommands::Webhook { command } => match command {
                WebhookCommands::Set { user_id, url } => {
                    notify::cmd_webhook_set(&settings, &user_id, url.as_deref()).await
                }
                WebhookCommands::Test { url } => notify::cmd_webhook_test(&settings, &url).await,
            },
            NotifyCommands::Telegram { command } => match command {
                TelegramCommands::Connect { user_id, chat_id } => {
                    notify::cmd_telegram_connect(&settings, &user_id, &chat_id).await
                }
                TelegramCommands::Test { chat_id } => {
                    notify::cmd_telegram_test(&settings, &chat_id).await
                }
                TelegramCommands::Disconnect { user_id } => {
                    notify::cmd_telegram_disconnect(&settings, &user_id).await
                }
            },
        },
        Commands::Payment { command } => match command {
            PaymentCommands::Add {
                user_id,
                number,
                cvc,
                expiry,
                name,
                prepaid,
                balance,
            } => {
                payment::cmd_payment_add(
                    &settings,
                    &user_id,
                    crate::crypto::NewCard {
                        card_number: number,
                        cvc,
                        expiry,
                        cardholder_name: name,
                        is_prepaid: prepaid,
                        balance,
                    },
                )
                .await
            }
            PaymentCommands::Update {
                user_id,
                method_id,
                number,
                cvc,
                expiry,
                name,
                prepaid,
                balance,
            } => {
                payment::cmd_payment_update(
                    &settings,
                    &user_id,
                    &method_id,
                    crate::crypto::CardUpdate {
                        card_number: number,
                        cvc,
                        expiry,
                        cardholder_name: name,
                        is_prepaid: prepaid,
                        balance,
                    },
                )
                .await
            }
        },
        Commands::Serve { bind } => serve::cmd_serve(&settings, &bind).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("rotom").chain(args.iter().copied()))
    }

    #[test]
    fn test_payment_update_pairs_number_and_cvc() {
        let base = ["payment", "update", "ash", "pm1", "--expiry", "02/30", "--name", "Ash"];

        let cli = parse(&base).unwrap();
        match cli.command {
            Commands::Payment {
                command: PaymentCommands::Update { number, cvc, prepaid, .. },
            } => {
                assert!(number.is_none() && cvc.is_none());
                assert!(!prepaid);
            }
            _ => panic!("expected payment update"),
        }

        let with_number: Vec<&str> = base.iter().copied().chain(["--number", "4242"]).collect();
        assert!(parse(&with_number).is_err());

        let both: Vec<&str> = with_number.iter().copied().chain(["--cvc", "123"]).collect();
        assert!(parse(&both).is_ok());

        let balance_only: Vec<&str> = base.iter().copied().chain(["--balance", "5"]).collect();
        assert!(parse(&balance_only).is_err());
    }
}
