//! Rendering a page in a stealth-configured browser.

use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::network::{
    Headers, SetBlockedUrLsParams, SetExtraHttpHeadersParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, NavigateParams,
};
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::stealth::{BLOCKED_RESOURCE_PATTERNS, EXTRA_HEADERS, STEALTH_SCRIPTS};
use super::BrowserFetcher;
use crate::scrapers::{FetchError, FetchVia, FetchedPage};

/// User agent presented by the browser.
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36";

/// Grace period after navigation for late client-side rendering.
const SETTLE_DELAY: Duration = Duration::from_millis(1000);

fn browser_err(e: impl std::fmt::Display) -> FetchError {
    FetchError::Browser(e.to_string())
}

/// A running browser plus the task driving its CDP connection.
struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
    /// Launched by us (and therefore ours to close) rather than remote.
    owned: bool,
}

impl BrowserSession {
    async fn shutdown(mut self) {
        if self.owned {
            if let Err(e) = self.browser.close().await {
                debug!("Browser close failed: {}", e);
            }
            let _ = self.browser.wait().await;
        }
        self.handler.abort();
    }
}

/// Run `fut` with a deadline, reporting expiry as [`FetchError::Timeout`].
async fn bounded<T>(
    limit: Duration,
    fut: impl std::future::Future<Output = Result<T, FetchError>>,
) -> Result<T, FetchError> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| FetchError::Timeout(limit.as_secs()))?
}

fn spawn_handler(mut handler: chromiumoxide::Handler) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    })
}

impl BrowserFetcher {
    /// Launch a browser, render `url`, and always tear the browser down.
    ///
    /// Everything between opening the tab and reading the rendered HTML is
    /// bounded by the configured timeout.
    pub(crate) async fn fetch_page(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let session = self.start().await?;
        let limit = Duration::from_secs(self.config.timeout);
        let result = bounded(limit, self.fetch_with(&session.browser, url)).await;
        if matches!(result, Err(FetchError::Timeout(_))) {
            warn!("Browser fetch of {} timed out after {}s", url, limit.as_secs());
        }
        session.shutdown().await;
        result
    }

    async fn start(&self) -> Result<BrowserSession, FetchError> {
        if let Some(remote_url) = self.config.remote_url.as_deref() {
            info!("Connecting to remote browser at {}", remote_url);
            let (browser, handler) = Browser::connect(remote_url).await.map_err(browser_err)?;
            return Ok(BrowserSession {
                browser,
                handler: spawn_handler(handler),
                owned: false,
            });
        }

        let chrome_path = self.find_chrome()?;
        debug!("Launching browser (headless={})", self.config.headless);

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .window_size(1920, 1080);

        // with_head means NOT headless
        if !self.config.headless {
            builder = builder.with_head();
        }

        if let Some(ref proxy) = self.config.proxy {
            builder = builder.arg(format!("--proxy-server={}", proxy));
        }

        builder = builder
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-background-networking")
            .arg("--disable-sync")
            .arg("--no-sandbox")
            .arg("--disable-gpu")
            .arg("--window-size=1920,1080");

        for arg in &self.config.chrome_args {
            builder = builder.arg(arg);
        }

        let config = builder
            .build()
            .map_err(|e| FetchError::Browser(format!("failed to build browser config: {}", e)))?;

        let (browser, handler) = Browser::launch(config).await.map_err(browser_err)?;
        Ok(BrowserSession {
            browser,
            handler: spawn_handler(handler),
            owned: true,
        })
    }

    async fn fetch_with(&self, browser: &Browser, url: &str) -> Result<FetchedPage, FetchError> {
        let page = browser.new_page("about:blank").await.map_err(browser_err)?;

        // Inner call so the page is closed on every path
        let result = self.render(&page, url).await;
        let _ = page.close().await;
        result
    }

    async fn render(&self, page: &Page, url: &str) -> Result<FetchedPage, FetchError> {
        page.execute(SetUserAgentOverrideParams::new(BROWSER_USER_AGENT.to_string()))
            .await
            .map_err(browser_err)?;

        let headers: serde_json::Map<String, serde_json::Value> = EXTRA_HEADERS
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
            .collect();
        page.execute(SetExtraHttpHeadersParams::new(Headers::new(
            serde_json::Value::Object(headers),
        )))
        .await
        .map_err(browser_err)?;

        if let Err(e) = page
            .execute(SetBlockedUrLsParams::new(
                BLOCKED_RESOURCE_PATTERNS
                    .iter()
                    .map(|p| p.to_string())
                    .collect::<Vec<_>>(),
            ))
            .await
        {
            debug!("Resource blocking unavailable: {}", e);
        }

        for script in STEALTH_SCRIPTS {
            if let Err(e) = page
                .execute(AddScriptToEvaluateOnNewDocumentParams::new(script.to_string()))
                .await
            {
                debug!("Stealth script injection skipped: {}", e);
            }
        }

        self.navigate_to_url(page, url).await?;
        tokio::time::sleep(SETTLE_DELAY).await;

        let html = page.content().await.map_err(browser_err)?;
        Ok(FetchedPage {
            html,
            status: 200,
            via: FetchVia::Browser,
        })
    }

    /// Navigate and wait for the network to settle.
    async fn navigate_to_url(&self, page: &Page, url: &str) -> Result<(), FetchError> {
        info!("Navigating to {} in browser", url);
        let nav_params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(|e| FetchError::Browser(format!("invalid URL: {}", e)))?;

        page.execute(nav_params).await.map_err(browser_err)?;
        if let Err(e) = page.wait_for_navigation().await {
            warn!("Waiting for navigation failed on {}: {}", url, e);
        }
        Ok(())
    }
}
