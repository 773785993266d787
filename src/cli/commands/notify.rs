//! Notification settings commands.

use console::style;

use crate::config::Settings;
use crate::notifications::NotificationService;

use super::super::helpers;

fn service(settings: &Settings) -> anyhow::Result<NotificationService> {
    let store = helpers::open_store(settings)?;
    let cipher = helpers::load_cipher()?;
    helpers::notification_service(settings, store, cipher)
}

pub async fn cmd_webhook_set(
    settings: &Settings,
    user_id: &str,
    url: Option<&str>,
) -> anyhow::Result<()> {
    service(settings)?.save_webhook(user_id, url).await?;
    match url.filter(|u| !u.trim().is_empty()) {
        Some(_) => println!("{} Webhook URL saved successfully", style("✓").green()),
        None => println!("{} Webhook URL cleared", style("✓").green()),
    }
    Ok(())
}

pub async fn cmd_webhook_test(settings: &Settings, url: &str) -> anyhow::Result<()> {
    let kind = service(settings)?.send_test_webhook(url).await?;
    println!(
        "{} Test notification sent successfully ({})",
        style("✓").green(),
        kind.as_str()
    );
    Ok(())
}

pub async fn cmd_telegram_connect(
    settings: &Settings,
    user_id: &str,
    chat_id: &str,
) -> anyhow::Result<()> {
    let link = service(settings)?.connect_telegram(user_id, chat_id).await?;
    println!(
        "{} Telegram connected successfully (chat {})",
        style("✓").green(),
        link.chat_id
    );
    Ok(())
}

pub async fn cmd_telegram_test(settings: &Settings, chat_id: &str) -> anyhow::Result<()> {
    service(settings)?.send_test_telegram(chat_id).await?;
    println!("{} Test notification sent", style("✓").green());
    Ok(())
}

pub async fn cmd_telegram_disconnect(settings: &Settings, user_id: &str) -> anyhow::Result<()> {
    service(settings)?.disconnect_telegram(user_id).await?;
    println!("{} Telegram disconnected", style("✓").green());
    Ok(())
}
