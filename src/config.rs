use std::path::PathBuf;

use url::Url;

use crate::error::ConfigError;
use crate::normalize::NumberLocale;

/// Options for one crawl of one search.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// First results page of the search.
    pub search_url: String,
    /// Append-only JSON Lines output. The checkpoint lives next to it.
    pub output_path: PathBuf,
    /// Stop after this many pages even if more are available.
    pub max_pages: Option<u32>,
    /// Minimum delay between two requests to the same host.
    pub request_delay_ms: u64,
    /// Additional attempts after the first one for transient fetch errors.
    pub max_retries: u32,
    /// In-flight detail-page fetches. Index pages are always sequential.
    pub concurrency: usize,
    pub resume: bool,
    pub timeout_secs: u64,
    /// Base of the exponential backoff: `backoff_base_ms * 2^attempt`.
    pub backoff_base_ms: u64,
    /// Consecutive `Blocked` responses that halt the search.
    pub blocked_threshold: u32,
    /// Attempts a failed page gets, across resumed runs, before it is given up.
    pub max_page_attempts: u32,
    pub fetch_details: bool,
    /// Query parameter carrying the page number. `None` uses `pagina-N.htm`.
    pub page_param: Option<String>,
    /// User-Agent rotation pool. Empty means the built-in pool.
    pub user_agents: Vec<String>,
    pub locale: NumberLocale,
}

impl CrawlConfig {
    pub fn new(search_url: impl Into<String>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            search_url: search_url.into(),
            output_path: output_path.into(),
            max_pages: None,
            request_delay_ms: 2000,
            max_retries: 3,
            concurrency: 1,
            resume: true,
            timeout_secs: 30,
            backoff_base_ms: 1000,
            blocked_threshold: 3,
            max_page_attempts: 3,
            fetch_details: false,
            page_param: None,
            user_agents: Vec::new(),
            locale: NumberLocale::default(),
        }
    }

    /// Checks the options and returns the parsed search URL.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for a non-http(s) search URL or an option whose
    /// value would make the crawl meaningless (zero concurrency, zero timeout).
    pub fn validate(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.search_url).map_err(|e| ConfigError::InvalidSearchUrl {
            url: self.search_url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidSearchUrl {
                url: self.search_url.clone(),
                reason: format!("unsupported scheme {}", url.scheme()),
            });
        }
        if url.host_str().is_none() {
            return Err(ConfigError::InvalidSearchUrl {
                url: self.search_url.clone(),
                reason: "missing host".into(),
            });
        }

        if self.output_path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidOption {
                option: "output_path",
                reason: "must not be empty".into(),
            });
        }
        if self.concurrency == 0 {
            return Err(ConfigError::InvalidOption {
                option: "concurrency",
                reason: "must be at least 1".into(),
            });
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidOption {
                option: "timeout_secs",
                reason: "must be at least 1".into(),
            });
        }
        if self.blocked_threshold == 0 {
            return Err(ConfigError::InvalidOption {
                option: "blocked_threshold",
                reason: "must be at least 1".into(),
            });
        }
        if self.max_page_attempts == 0 {
            return Err(ConfigError::InvalidOption {
                option: "max_page_attempts",
                reason: "must be at least 1".into(),
            });
        }
        if self.max_pages == Some(0) {
            return Err(ConfigError::InvalidOption {
                option: "max_pages",
                reason: "must be at least 1 when set".into(),
            });
        }
        if let Some(param) = &self.page_param {
            if param.trim().is_empty() {
                return Err(ConfigError::InvalidOption {
                    option: "page_param",
                    reason: "must not be blank".into(),
                });
            }
        }

        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str) -> CrawlConfig {
        CrawlConfig::new(url, "out/listings.jsonl")
    }

    #[test]
    fn accepts_https_search_url() {
        let url = config("https://www.idealista.com/venta-viviendas/madrid/centro/")
            .validate()
            .unwrap();
        assert_eq!(url.host_str(), Some("www.idealista.com"));
    }

    #[test]
    fn rejects_non_http_scheme() {
        let err = config("ftp://example.com/listings").validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSearchUrl { .. }));
    }

    #[test]
    fn rejects_unparseable_url() {
        let err = config("not a url").validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSearchUrl { .. }));
    }

    #[test]
    fn rejects_zero_concurrency() {
        let mut cfg = config("https://example.com/search/");
        cfg.concurrency = 0;
        assert_eq!(
            cfg.validate().unwrap_err(),
            ConfigError::InvalidOption {
                option: "concurrency",
                reason: "must be at least 1".into(),
            }
        );
    }

    #[test]
    fn rejects_zero_max_pages() {
        let mut cfg = config("https://example.com/search/");
        cfg.max_pages = Some(0);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn defaults_are_polite_and_sequential() {
        let cfg = config("https://example.com/search/");
        assert_eq!(cfg.concurrency, 1);
        assert_eq!(cfg.blocked_threshold, 3);
        assert!(cfg.request_delay_ms >= 1000);
        assert!(cfg.resume);
    }
}
