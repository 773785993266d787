//! Browser engine configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Headless browser settings used for the fallback fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserEngineConfig {
    /// Use the browser fallback at all (default: true).
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Run in headless mode (default: true).
    /// Set to false for debugging or if headless detection is an issue.
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Proxy server URL (e.g., "socks5://127.0.0.1:1080").
    #[serde(default)]
    pub proxy: Option<String>,

    /// Navigation timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Explicit Chrome/Chromium executable; searched for when unset.
    #[serde(default)]
    pub chrome_path: Option<PathBuf>,

    /// Additional Chrome arguments.
    #[serde(default)]
    pub chrome_args: Vec<String>,

    /// Remote Chrome DevTools URL (e.g., "ws://localhost:9222").
    /// If set, connects to an existing browser instead of launching one.
    #[serde(default)]
    pub remote_url: Option<String>,
}

pub fn default_enabled() -> bool {
    true
}

pub fn default_headless() -> bool {
    true
}

pub fn default_timeout() -> u64 {
    40
}

impl Default for BrowserEngineConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            headless: default_headless(),
            proxy: None,
            timeout: default_timeout(),
            chrome_path: None,
            chrome_args: Vec::new(),
            remote_url: None,
        }
    }
}
