//! Page retrieval: plain HTTP first, stealth browser when blocked.

pub mod browser;
mod http_client;
pub mod protection;

pub use browser::{BrowserEngineConfig, BrowserFetcher};
pub use http_client::{resolve_user_agent, HttpFetcher, DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT};
pub use protection::detect_protection;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

/// Errors raised while fetching a page.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Request timed out after {0}s")]
    Timeout(u64),
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("Browser error: {0}")]
    Browser(String),
    #[error("Browser support not available: {0}")]
    BrowserUnavailable(String),
}

impl FetchError {
    /// Status code carried by the failure, if the server responded at all.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Status(code) => Some(*code),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            FetchError::Status(status.as_u16())
        } else {
            FetchError::Network(e.to_string())
        }
    }
}

/// Which strategy produced a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchVia {
    Http,
    Browser,
}

impl FetchVia {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Browser => "browser",
        }
    }
}

/// Raw HTML returned by a fetch strategy.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub html: String,
    pub status: u16,
    pub via: FetchVia,
}

/// A strategy for turning a URL into HTML.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError>;
}

/// Outcome of running the fetch pipeline for one URL.
#[derive(Debug, Clone)]
pub enum Retrieval {
    /// Usable HTML.
    Page {
        html: String,
        status: u16,
        via: FetchVia,
    },
    /// Every attempt ended on an anti-bot wall (or the browser gave up).
    /// `html` is the most recent wall page received, if any.
    Blocked {
        vendor: Option<&'static str>,
        status: u16,
        html: Option<String>,
    },
}

/// Runs the primary fetcher and escalates to the fallback when the primary
/// fails or returns a bot-protection page.
#[derive(Clone)]
pub struct PageRetriever {
    primary: Arc<dyn PageFetcher>,
    fallback: Option<Arc<dyn PageFetcher>>,
}

impl PageRetriever {
    pub fn new(primary: Arc<dyn PageFetcher>, fallback: Option<Arc<dyn PageFetcher>>) -> Self {
        Self { primary, fallback }
    }

    /// Retrieve HTML for `url`.
    ///
    /// Only returns `Err` when there is no fallback and the primary failed
    /// outright; a blocked page without fallback is reported as
    /// [`Retrieval::Blocked`].
    pub async fn retrieve(&self, url: &str) -> Result<Retrieval, FetchError> {
        let (primary_status, primary_vendor, primary_html) = match self.primary.fetch(url).await {
            Ok(page) => match detect_protection(&page.html) {
                None => {
                    debug!("Fetched {} via {} ({})", url, page.via.as_str(), page.status);
                    return Ok(Retrieval::Page {
                        html: page.html,
                        status: page.status,
                        via: page.via,
                    });
                }
                Some(vendor) => {
                    info!("{} protection detected on {}, escalating", vendor, url);
                    if self.fallback.is_none() {
                        return Ok(Retrieval::Blocked {
                            vendor: Some(vendor),
                            status: page.status,
                            html: Some(page.html),
                        });
                    }
                    (Some(page.status), Some(vendor), Some(page.html))
                }
            },
            Err(e) => {
                if self.fallback.is_none() {
                    return Err(e);
                }
                info!("Primary fetch failed for {} ({}), escalating", url, e);
                (e.http_status(), None, None)
            }
        };

        let Some(fallback) = self.fallback.as_ref() else {
            return Ok(Retrieval::Blocked {
                vendor: primary_vendor,
                status: primary_status.unwrap_or(0),
                html: primary_html,
            });
        };

        match fallback.fetch(url).await {
            Ok(page) => match detect_protection(&page.html) {
                None => Ok(Retrieval::Page {
                    html: page.html,
                    status: primary_status.unwrap_or(page.status),
                    via: page.via,
                }),
                Some(vendor) => {
                    warn!("{} protection still present on {} after fallback", vendor, url);
                    Ok(Retrieval::Blocked {
                        vendor: Some(vendor),
                        status: primary_status.unwrap_or(page.status),
                        html: Some(page.html),
                    })
                }
            },
            Err(e) => {
                warn!("Fallback fetch failed for {}: {}", url, e);
                Ok(Retrieval::Blocked {
                    vendor: primary_vendor,
                    status: primary_status.unwrap_or(0),
                    html: primary_html,
                })
            }
        }
    }
}
