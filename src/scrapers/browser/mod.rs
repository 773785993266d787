//! Browser-based fetcher for anti-bot protected sites.
//!
//! Uses chromiumoxide (CDP) with stealth evasion techniques to get past
//! WAF interstitials from Cloudflare, Incapsula, Akamai, etc. A fresh browser
//! is launched per fetch and torn down afterwards, whatever the outcome.

mod config;
#[cfg(feature = "browser")]
mod fetch;
mod stealth;

pub use config::BrowserEngineConfig;

use async_trait::async_trait;

use super::{FetchError, FetchedPage, PageFetcher};

#[cfg(feature = "browser")]
use std::path::PathBuf;
#[cfg(feature = "browser")]
use tracing::{debug, info};

/// Browser-based fetcher with stealth capabilities.
#[derive(Debug, Clone)]
pub struct BrowserFetcher {
    pub(crate) config: BrowserEngineConfig,
}

impl BrowserFetcher {
    /// Common Chrome executable paths to check.
    #[cfg(feature = "browser")]
    const CHROME_PATHS: &'static [&'static str] = &[
        // Linux
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        // macOS
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
        // Common install locations
        "/opt/google/chrome/google-chrome",
    ];

    /// Create a new browser fetcher.
    pub fn new(config: BrowserEngineConfig) -> Self {
        Self { config }
    }

    /// Locate a Chrome executable: configured path, well-known locations,
    /// then `PATH`.
    #[cfg(feature = "browser")]
    pub(crate) fn find_chrome(&self) -> Result<PathBuf, FetchError> {
        if let Some(ref path) = self.config.chrome_path {
            let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();
            let path = PathBuf::from(expanded);
            if path.exists() {
                return Ok(path);
            }
            return Err(FetchError::BrowserUnavailable(format!(
                "configured Chrome path does not exist: {}",
                path.display()
            )));
        }

        for path in Self::CHROME_PATHS {
            let p = std::path::Path::new(path);
            if p.exists() {
                debug!("Found Chrome at: {}", path);
                return Ok(p.to_path_buf());
            }
        }

        for cmd in &[
            "google-chrome",
            "google-chrome-stable",
            "chromium",
            "chromium-browser",
        ] {
            if let Ok(path) = which::which(cmd) {
                info!("Found Chrome in PATH: {}", path.display());
                return Ok(path);
            }
        }

        Err(FetchError::BrowserUnavailable(
            "Chrome/Chromium not found. Install chromium or set browser.chrome_path".to_string(),
        ))
    }
}

#[cfg(feature = "browser")]
#[async_trait]
impl PageFetcher for BrowserFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        self.fetch_page(url).await
    }
}

// Stub for when browser feature is disabled
#[cfg(not(feature = "browser"))]
#[async_trait]
impl PageFetcher for BrowserFetcher {
    async fn fetch(&self, _url: &str) -> Result<FetchedPage, FetchError> {
        Err(FetchError::BrowserUnavailable(
            "Browser support not compiled. Rebuild with: cargo build --features browser"
                .to_string(),
        ))
    }
}
