//! Shared helpers for CLI commands: wiring the runtime from settings.

use std::sync::Arc;

use anyhow::Context;

use crate::config::{SecretBackend, Settings};
use crate::crypto::{AesGcmCipher, Cipher, ENCRYPTION_KEY_ENV};
use crate::notifications::{
    GcpSecretManagerStore, NoSecretStore, NotificationService, SecretCache, SecretResolver,
    SecretStore, TelegramSender, WebhookSender,
};
use crate::repository::{SqliteStore, Store};
use crate::scrapers::{
    resolve_user_agent, BrowserFetcher, HttpFetcher, PageFetcher, PageRetriever,
};
use crate::services::{Scheduler, StockChecker};

/// Open (creating if needed) the configured database.
pub fn open_store(settings: &Settings) -> anyhow::Result<Arc<dyn Store>> {
    let store = SqliteStore::new(&settings.database_path).with_context(|| {
        format!(
            "Failed to open database at {}",
            settings.database_path.display()
        )
    })?;
    tracing::debug!("Using database {}", store.path().display());
    Ok(Arc::new(store))
}

pub fn load_cipher() -> anyhow::Result<Arc<dyn Cipher>> {
    let cipher = AesGcmCipher::from_env().with_context(|| {
        format!(
            "{} must hold a 64-character hex key (generate one with `openssl rand -hex 32`)",
            ENCRYPTION_KEY_ENV
        )
    })?;
    Ok(Arc::new(cipher))
}

fn secret_resolver(settings: &Settings) -> anyhow::Result<SecretResolver> {
    let store: Arc<dyn SecretStore> = match settings.secret_backend {
        SecretBackend::Gcp => Arc::new(GcpSecretManagerStore::new(settings.notify_timeout)?),
        SecretBackend::None => Arc::new(NoSecretStore),
    };
    Ok(SecretResolver::new(
        SecretCache::new(settings.secret_ttl),
        store,
    ))
}

pub fn notification_service(
    settings: &Settings,
    store: Arc<dyn Store>,
    cipher: Arc<dyn Cipher>,
) -> anyhow::Result<NotificationService> {
    Ok(NotificationService::new(
        store,
        cipher,
        WebhookSender::new(settings.notify_timeout)?,
        TelegramSender::new(&settings.telegram_api_base, settings.notify_timeout)?,
        secret_resolver(settings)?,
    ))
}

/// HTTP first, then the stealth browser when enabled.
pub fn page_retriever(settings: &Settings) -> anyhow::Result<PageRetriever> {
    let user_agent = resolve_user_agent(settings.user_agent.as_deref());
    let http: Arc<dyn PageFetcher> = Arc::new(HttpFetcher::new(settings.fetch_timeout, &user_agent)?);
    let browser: Option<Arc<dyn PageFetcher>> = if settings.browser.enabled {
        Some(Arc::new(BrowserFetcher::new(settings.browser.clone())))
    } else {
        None
    };
    Ok(PageRetriever::new(http, browser))
}

pub fn stock_checker(settings: &Settings) -> anyhow::Result<StockChecker> {
    let store = open_store(settings)?;
    let cipher = load_cipher()?;
    let notifier = notification_service(settings, store.clone(), cipher.clone())?;
    Ok(StockChecker::new(
        store,
        page_retriever(settings)?,
        Arc::new(notifier),
        cipher,
    ))
}

pub fn scheduler(settings: &Settings) -> anyhow::Result<Scheduler> {
    Ok(Scheduler::new(stock_checker(settings)?))
}

/// Truncate a string for column display.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
