//! Vendor-specific message bodies for stock alerts.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::models::{Agent, CheckResult};

const FOOTER: &str = "Cart Rotom Stock Alert";
const TEST_TITLE: &str = "🧪 Test Notification";
const TEST_MESSAGE: &str = "Your Cart Rotom webhook is working perfectly!";

const IN_STOCK_COLOR: u32 = 0x00ff00;
const OUT_OF_STOCK_COLOR: u32 = 0xff0000;
const TEST_COLOR: u32 = 0x00aaff;

/// Webhook flavour, inferred from the URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookKind {
    Discord,
    Slack,
    Generic,
}

impl WebhookKind {
    pub fn detect(url: &str) -> Self {
        if url.contains("discord.com") {
            Self::Discord
        } else if url.contains("hooks.slack.com") {
            Self::Slack
        } else {
            Self::Generic
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discord => "discord",
            Self::Slack => "slack",
            Self::Generic => "generic",
        }
    }
}

fn status_text(in_stock: bool) -> &'static str {
    if in_stock {
        "✅ IN STOCK"
    } else {
        "❌ OUT OF STOCK"
    }
}

fn display_time(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Body for a stock status change, shaped for `kind`.
pub fn stock_payload(kind: WebhookKind, agent: &Agent, in_stock: bool, now: DateTime<Utc>) -> Value {
    let title = agent.display_title();
    let status = status_text(in_stock);

    match kind {
        WebhookKind::Discord => {
            let mut embed = json!({
                "title": title,
                "url": agent.url,
                "description": format!("Status: **{}**", status),
                "color": if in_stock { IN_STOCK_COLOR } else { OUT_OF_STOCK_COLOR },
                "fields": [
                    { "name": "URL", "value": agent.url, "inline": false },
                    { "name": "Last Checked", "value": display_time(now), "inline": true },
                ],
                "footer": { "text": FOOTER },
                "timestamp": now.to_rfc3339(),
            });
            if let Some(ref thumb) = agent.thumbnail {
                embed["thumbnail"] = json!({ "url": thumb });
            }
            json!({ "embeds": [embed] })
        }
        WebhookKind::Slack => {
            let mut section = json!({
                "type": "section",
                "text": {
                    "type": "mrkdwn",
                    "text": format!(
                        "*Product:* {}\n*Status:* {}\n*URL:* <{}|View Product>",
                        title, status, agent.url
                    ),
                },
            });
            if let Some(ref thumb) = agent.thumbnail {
                section["accessory"] = json!({
                    "type": "image",
                    "image_url": thumb,
                    "alt_text": title,
                });
            }
            json!({
                "blocks": [
                    {
                        "type": "header",
                        "text": {
                            "type": "plain_text",
                            "text": format!("{}: {}", status, title),
                            "emoji": true,
                        },
                    },
                    section,
                    {
                        "type": "context",
                        "elements": [
                            { "type": "mrkdwn", "text": format!("Last checked: {}", display_time(now)) },
                        ],
                    },
                ],
                "attachments": [{ "color": if in_stock { "good" } else { "danger" } }],
            })
        }
        WebhookKind::Generic => json!({
            "agent": {
                "id": agent.id,
                "name": title,
                "alias": agent.alias,
                "url": agent.url,
                "thumbnail": agent.thumbnail,
            },
            "status": CheckResult::from_stock(in_stock).as_str(),
            "isInStock": in_stock,
            "timestamp": now.to_rfc3339(),
            "message": format!("{} is now {}", title, status),
        }),
    }
}

/// Body used to verify a webhook is reachable.
pub fn test_payload(kind: WebhookKind, now: DateTime<Utc>) -> Value {
    match kind {
        WebhookKind::Discord => json!({
            "embeds": [{
                "title": TEST_TITLE,
                "description": TEST_MESSAGE,
                "color": TEST_COLOR,
                "fields": [
                    { "name": "Status", "value": "✅ Connected", "inline": true },
                    { "name": "Type", "value": "Discord Webhook", "inline": true },
                ],
                "footer": { "text": FOOTER },
                "timestamp": now.to_rfc3339(),
            }]
        }),
        WebhookKind::Slack => json!({
            "blocks": [
                {
                    "type": "header",
                    "text": { "type": "plain_text", "text": TEST_TITLE, "emoji": true },
                },
                {
                    "type": "section",
                    "text": {
                        "type": "mrkdwn",
                        "text": format!("*{}*\n\n✅ Status: Connected\n🔔 Type: Slack Webhook", TEST_MESSAGE),
                    },
                },
            ],
            "attachments": [{ "color": "good" }],
        }),
        WebhookKind::Generic => json!({
            "test": true,
            "message": TEST_MESSAGE,
            "status": "connected",
            "type": "generic webhook",
            "timestamp": now.to_rfc3339(),
        }),
    }
}

/// Markdown text for a Telegram stock alert.
pub fn telegram_stock_message(agent: &Agent, in_stock: bool, now: DateTime<Utc>) -> String {
    let (emoji, status) = if in_stock {
        ("✅", "IN STOCK ✅")
    } else {
        ("❌", "OUT OF STOCK ❌")
    };
    format!(
        "{} *{}*\n\nStatus: {}\n\nURL: {}\n\nTime: {}",
        emoji,
        agent.display_title(),
        status,
        agent.url,
        display_time(now)
    )
}

pub const TELEGRAM_TEST_MESSAGE: &str =
    "🧪 *Cart Rotom Test Notification*\n\nYour Telegram connection is working! ✅";

/// Reply to `/start`, telling the user which chat id to paste into settings.
pub fn telegram_start_reply(chat_id: &str) -> String {
    format!(
        "🎯 Your Telegram User ID:\n\n`{}`\n\nPaste this ID into Cart Rotom settings to connect your account!",
        chat_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CheckStrategy;
    use chrono::TimeZone;

    fn agent() -> Agent {
        let mut agent = Agent::new("u1", "https://shop.example.com/p/1", CheckStrategy::default());
        agent.id = "a1".to_string();
        agent.alias = Some("Switch OLED".to_string());
        agent
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 4, 13, 30, 0).unwrap()
    }

    #[test]
    fn test_detect_kind() {
        assert_eq!(
            WebhookKind::detect("https://discord.com/api/webhooks/1/x"),
            WebhookKind::Discord
        );
        assert_eq!(
            WebhookKind::detect("https://hooks.slack.com/services/T/B/X"),
            WebhookKind::Slack
        );
        assert_eq!(WebhookKind::detect("https://example.com/hook"), WebhookKind::Generic);
    }

    #[test]
    fn test_discord_payload() {
        let mut agent = agent();
        agent.thumbnail = Some("https://img.example.com/p.jpg".to_string());
        let body = stock_payload(WebhookKind::Discord, &agent, true, now());
        let embed = &body["embeds"][0];

        assert_eq!(embed["title"], "Switch OLED");
        assert_eq!(embed["description"], "Status: **✅ IN STOCK**");
        assert_eq!(embed["color"], 0x00ff00);
        assert_eq!(embed["thumbnail"]["url"], "https://img.example.com/p.jpg");
        assert_eq!(embed["footer"]["text"], "Cart Rotom Stock Alert");
        assert_eq!(embed["fields"][1]["value"], "2024-05-04 13:30:00 UTC");
    }

    #[test]
    fn test_discord_without_thumbnail() {
        let body = stock_payload(WebhookKind::Discord, &agent(), false, now());
        assert!(body["embeds"][0].get("thumbnail").is_none());
        assert_eq!(body["embeds"][0]["color"], 0xff0000);
    }

    #[test]
    fn test_slack_payload() {
        let mut agent = agent();
        agent.thumbnail = Some("https://img.example.com/p.jpg".to_string());
        let body = stock_payload(WebhookKind::Slack, &agent, false, now());

        assert_eq!(body["blocks"][0]["text"]["text"], "❌ OUT OF STOCK: Switch OLED");
        assert_eq!(
            body["blocks"][1]["accessory"]["image_url"],
            "https://img.example.com/p.jpg"
        );
        assert_eq!(body["attachments"][0]["color"], "danger");
        assert!(body["blocks"][1]["text"]["text"]
            .as_str()
            .unwrap()
            .contains("<https://shop.example.com/p/1|View Product>"));
    }

    #[test]
    fn test_generic_payload() {
        let body = stock_payload(WebhookKind::Generic, &agent(), true, now());
        assert_eq!(body["agent"]["id"], "a1");
        assert_eq!(body["status"], "IN_STOCK");
        assert_eq!(body["isInStock"], true);
        assert_eq!(body["message"], "Switch OLED is now ✅ IN STOCK");
    }

    #[test]
    fn test_telegram_message() {
        let text = telegram_stock_message(&agent(), true, now());
        assert_eq!(
            text,
            "✅ *Switch OLED*\n\nStatus: IN STOCK ✅\n\nURL: https://shop.example.com/p/1\n\nTime: 2024-05-04 13:30:00 UTC"
        );
    }

    #[test]
    fn test_test_payloads() {
        assert_eq!(
            test_payload(WebhookKind::Discord, now())["embeds"][0]["title"],
            "🧪 Test Notification"
        );
        assert_eq!(test_payload(WebhookKind::Generic, now())["test"], true);
        assert!(telegram_start_reply("12345").contains("`12345`"));
    }
}
