//! Configuration management for Cart Rotom using the prefer crate.
//!
//! `Config` mirrors the config file (every field optional); `Settings` is the
//! resolved form the runtime uses after defaults and environment overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::notifications::DEFAULT_TELEGRAM_API_BASE;
use crate::scrapers::BrowserEngineConfig;

/// Default database filename.
pub const DEFAULT_DATABASE_FILENAME: &str = "rotom.db";

/// Seconds between scheduling passes.
pub const DEFAULT_INTERVAL_SECS: u64 = 60;

/// Secret backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretBackend {
    /// Google Cloud Secret Manager.
    #[default]
    Gcp,
    /// Environment variables only.
    None,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Plain HTTP timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// User agent override; desktop Chrome when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram_api_base: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecretsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<SecretBackend>,
}

/// Configuration file contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Database file path. Relative paths resolve against the config file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub browser: BrowserEngineConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub secrets: SecretsConfig,

    /// Path the config was loaded from.
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

/// Resolved application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_path: PathBuf,
    pub interval: Duration,
    pub fetch_timeout: Duration,
    pub user_agent: Option<String>,
    pub browser: BrowserEngineConfig,
    pub notify_timeout: Duration,
    pub telegram_api_base: String,
    pub secret_ttl: Duration,
    pub secret_backend: SecretBackend,
}

impl Default for Settings {
    fn default() -> Self {
        // Platform data dir, falling back to home, then the current dir
        let data_dir = dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cart-rotom");

        Self {
            database_path: data_dir.join(DEFAULT_DATABASE_FILENAME),
            interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
            fetch_timeout: Duration::from_secs(crate::scrapers::DEFAULT_TIMEOUT_SECS),
            user_agent: None,
            browser: BrowserEngineConfig::default(),
            notify_timeout: crate::notifications::DEFAULT_NOTIFY_TIMEOUT,
            telegram_api_base: DEFAULT_TELEGRAM_API_BASE.to_string(),
            secret_ttl: crate::notifications::secrets::DEFAULT_SECRET_TTL,
            secret_backend: SecretBackend::default(),
        }
    }
}

impl Config {
    /// Load configuration using prefer crate for discovery.
    /// Falls back to defaults when no `rotom` config file is found.
    pub async fn load() -> Self {
        match prefer::load("rotom").await {
            Ok(pref_config) => match pref_config.source_path() {
                Some(path) => match Self::load_from_path(path).await {
                    Ok(config) => config,
                    Err(e) => {
                        tracing::warn!("Ignoring config {}: {}", path.display(), e);
                        Self::default()
                    }
                },
                None => Self::default(),
            },
            Err(_) => Self::default(),
        }
    }

    /// Load configuration from a specific file path.
    /// The format is chosen by extension: TOML, YAML, otherwise JSON.
    pub async fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

        let mut config = Self::parse(&contents, ext)?;
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    fn parse(contents: &str, ext: &str) -> Result<Self, String> {
        match ext {
            "toml" => {
                toml::from_str(contents).map_err(|e| format!("Failed to parse TOML config: {}", e))
            }
            "yaml" | "yml" => serde_yaml::from_str(contents)
                .map_err(|e| format!("Failed to parse YAML config: {}", e)),
            _ => serde_json::from_str(contents)
                .map_err(|e| format!("Failed to parse JSON config: {}", e)),
        }
    }

    /// Directory of the config file, if it came from one.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref database) = self.database {
            settings.database_path = self.resolve_path(database, base_dir);
        }
        if let Some(secs) = self.scheduler.interval_secs.filter(|s| *s > 0) {
            settings.interval = Duration::from_secs(secs);
        }
        if let Some(secs) = self.fetch.timeout_secs.filter(|s| *s > 0) {
            settings.fetch_timeout = Duration::from_secs(secs);
        }
        if let Some(ref ua) = self.fetch.user_agent {
            settings.user_agent = Some(ua.clone());
        }
        settings.browser = self.browser.clone();
        if let Some(ref path) = settings.browser.chrome_path {
            settings.browser.chrome_path =
                Some(self.resolve_path(&path.to_string_lossy(), base_dir));
        }
        if let Some(secs) = self.notifications.timeout_secs.filter(|s| *s > 0) {
            settings.notify_timeout = Duration::from_secs(secs);
        }
        if let Some(ref base) = self.notifications.telegram_api_base {
            settings.telegram_api_base = base.trim_end_matches('/').to_string();
        }
        if let Some(secs) = self.secrets.ttl_secs {
            settings.secret_ttl = Duration::from_secs(secs);
        }
        if let Some(backend) = self.secrets.backend {
            settings.secret_backend = backend;
        }
    }
}

/// Options controlling where settings come from.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file (`--config`).
    pub config_path: Option<PathBuf>,
}

fn env_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Apply `ROTOM_*` environment overrides, which win over the config file.
fn apply_env_overrides(settings: &mut Settings) {
    if let Some(db) = std::env::var("ROTOM_DATABASE").ok().filter(|s| !s.is_empty()) {
        tracing::debug!("Using ROTOM_DATABASE from environment: {}", db);
        settings.database_path = PathBuf::from(shellexpand::tilde(&db).as_ref());
    }
    if let Some(enabled) = std::env::var("ROTOM_BROWSER")
        .ok()
        .and_then(|v| env_flag(&v))
    {
        settings.browser.enabled = enabled;
    }
    if let Some(chrome) = std::env::var("ROTOM_CHROME_PATH")
        .ok()
        .filter(|s| !s.is_empty())
    {
        settings.browser.chrome_path = Some(PathBuf::from(shellexpand::tilde(&chrome).as_ref()));
    }
}

/// Load settings with explicit options.
/// Returns (Settings, Config) tuple.
pub async fn load_settings_with_options(
    options: LoadOptions,
) -> Result<(Settings, Config), String> {
    let config = match options.config_path {
        Some(ref path) => Config::load_from_path(path).await?,
        None => Config::load().await,
    };

    let base_dir = config
        .base_dir()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let mut settings = Settings::default();
    config.apply_to_settings(&mut settings, &base_dir);
    apply_env_overrides(&mut settings);

    Ok((settings, config))
}
