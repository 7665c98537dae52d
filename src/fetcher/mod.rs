//! HTTP fetching under politeness constraints.

mod identity;
mod rate_limit;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};
use url::Url;

use crate::config::CrawlConfig;
use crate::error::FetchError;

pub use identity::{IdentityPool, RequestIdentity};
pub use rate_limit::{FetchPermit, RateLimiter};

/// Response body markers of anti-bot interstitials served with a 200 status.
const BLOCK_MARKERS: &[&str] = &[
    "captcha-delivery.com",
    "pardon our interruption",
    "uso indebido",
    "are you a robot",
];

/// Captcha widgets. Contact forms on real listing pages embed these too, so
/// they only count on a page without listing content.
const WIDGET_MARKERS: &[&str] = &["g-recaptcha", "h-captcha"];

/// Markup present on results and listing pages.
const CONTENT_MARKERS: &[&str] = &["items-container", "detail-container", "main-info__title"];

/// Raw HTML of one fetched page.
#[derive(Debug, Clone)]
pub struct RawPage {
    pub url: String,
    pub status: u16,
    pub body: String,
}

/// Anything that can hand the pipeline the HTML of a URL.
///
/// The HTTP [`Fetcher`] is the default; a headless-render step can implement
/// this too and feed pre-rendered HTML into the same pipeline.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch a page, applying whatever retry policy the source has.
    async fn fetch_page(&self, url: &str) -> Result<RawPage, FetchError>;

    /// Get the name of the page source
    fn source_name(&self) -> &'static str;
}

/// Polite HTTP fetcher
pub struct Fetcher {
    client: Client,
    limiter: Arc<RateLimiter>,
    max_retries: u32,
    backoff_base_ms: u64,
}

impl Fetcher {
    /// Create a fetcher from the crawl configuration
    pub fn new(config: &CrawlConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        let identities = IdentityPool::new(&config.user_agents);
        debug!(identities = identities.size(), "identity rotation ready");
        let limiter = RateLimiter::new(
            Duration::from_millis(config.request_delay_ms),
            config.concurrency,
            identities,
        );

        Ok(Self {
            client,
            limiter: Arc::new(limiter),
            max_retries: config.max_retries,
            backoff_base_ms: config.backoff_base_ms,
        })
    }

    /// Performs a single attempt at `url`. `attempt` is zero for the first try.
    ///
    /// # Errors
    ///
    /// - [`FetchError::Blocked`] on HTTP 403 or an anti-bot body.
    /// - [`FetchError::Http`] on any other non-2xx status.
    /// - [`FetchError::Timeout`] / [`FetchError::Network`] on transport failure.
    pub async fn fetch(&self, url: &str, attempt: u32) -> Result<RawPage, FetchError> {
        let host = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_owned))
            .unwrap_or_else(|| url.to_owned());

        let permit = self.limiter.acquire(&host).await?;
        debug!(url, attempt, user_agent = %permit.identity().user_agent, "fetching");

        let response = self
            .client
            .get(url)
            .headers(permit.identity().headers())
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, &e))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(url, &e))?;
        drop(permit);

        if status == StatusCode::FORBIDDEN {
            warn!(url, "received 403, treating as blocked");
            return Err(FetchError::Blocked {
                url: url.to_owned(),
                reason: "HTTP 403".into(),
            });
        }
        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
                url: url.to_owned(),
            });
        }
        if let Some(marker) = detect_block(&body) {
            warn!(url, marker, "anti-bot page detected");
            return Err(FetchError::Blocked {
                url: url.to_owned(),
                reason: format!("response body contains {marker:?}"),
            });
        }

        debug!(url, bytes = body.len(), "fetched");
        Ok(RawPage {
            url: url.to_owned(),
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl PageSource for Fetcher {
    async fn fetch_page(&self, url: &str) -> Result<RawPage, FetchError> {
        rate_limit::retry_with_backoff(self.max_retries, self.backoff_base_ms, |attempt| {
            self.fetch(url, attempt)
        })
        .await
    }

    fn source_name(&self) -> &'static str {
        "http"
    }
}

/// Returns the first anti-bot marker found in `body`, if any.
pub(crate) fn detect_block(body: &str) -> Option<&'static str> {
    let lower = body.to_lowercase();
    if let Some(marker) = BLOCK_MARKERS.iter().copied().find(|m| lower.contains(m)) {
        return Some(marker);
    }
    if CONTENT_MARKERS.iter().any(|m| lower.contains(m)) {
        return None;
    }
    WIDGET_MARKERS.iter().copied().find(|m| lower.contains(m))
}
