//! Page URL construction and end-of-results detection.

use std::collections::VecDeque;
use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::debug;
use url::Url;

use crate::config::CrawlConfig;
use crate::models::{PageStatus, RunState};

static PAGE_SEGMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/pagina-\d+\.htm$").expect("valid page segment regex"));

/// Stable id for a search: first 16 hex chars of SHA-256 over the URL with
/// pagination, fragment, trailing slash and query order normalized away.
pub fn search_id(url: &Url, page_param: Option<&str>) -> String {
    let path = PAGE_SEGMENT_RE.replace(url.path(), "");
    let path = path.trim_end_matches('/');

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| Some(&**k) != page_param)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort();

    let mut canonical = format!(
        "{}://{}{}{}",
        url.scheme(),
        url.host_str().unwrap_or_default().to_lowercase(),
        url.port().map(|p| format!(":{p}")).unwrap_or_default(),
        path
    );
    if !pairs.is_empty() {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish();
        canonical.push('?');
        canonical.push_str(&query);
    }

    let digest = format!("{:x}", Sha256::digest(canonical.as_bytes()));
    digest[..16].to_owned()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub page_number: u32,
    pub url: String,
    /// The page failed in an earlier run and is being tried again.
    pub retry: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageStep {
    Fetch(PageRequest),
    EndOfResults,
}

/// What the extractor saw on a fetched index page.
#[derive(Debug, Clone, Copy, Default)]
pub struct PageOutcome {
    pub listings: usize,
    pub total_pages: Option<u32>,
    pub current_page: Option<u32>,
}

/// Walks the result pages of one search.
#[derive(Debug)]
pub struct Pager {
    base: Url,
    page_param: Option<String>,
    max_pages: Option<u32>,
    next: u32,
    total_pages: Option<u32>,
    retries: VecDeque<u32>,
    given_up: Vec<u32>,
    exhausted: bool,
}

impl Pager {
    pub fn new(base: Url, config: &CrawlConfig) -> Self {
        Self {
            base,
            page_param: config.page_param.clone(),
            max_pages: config.max_pages,
            next: 1,
            total_pages: None,
            retries: VecDeque::new(),
            given_up: Vec::new(),
            exhausted: false,
        }
    }

    /// Rehydrates the page sequence from a checkpoint.
    ///
    /// Failed pages that still have attempts left come first; forward paging
    /// continues after the highest page already settled.
    pub fn resume(base: Url, config: &CrawlConfig, state: &RunState) -> Self {
        let mut pager = Self::new(base, config);
        pager.total_pages = state.total_pages_known;

        let highest_failed = state.failed_pages.keys().next_back().copied().unwrap_or(0);
        pager.next = state.last_completed_page.max(highest_failed) + 1;

        for (&page, &attempts) in &state.failed_pages {
            if attempts < config.max_page_attempts {
                pager.retries.push_back(page);
            } else {
                pager.given_up.push(page);
            }
        }
        debug!(
            next = pager.next,
            retries = pager.retries.len(),
            given_up = pager.given_up.len(),
            "pager resumed"
        );
        pager
    }

    /// Pages that used up `max_page_attempts` in earlier runs.
    pub fn given_up(&self) -> &[u32] {
        &self.given_up
    }

    pub fn total_pages(&self) -> Option<u32> {
        self.total_pages
    }

    pub fn next_page(&mut self) -> PageStep {
        if let Some(page_number) = self.retries.pop_front() {
            return PageStep::Fetch(PageRequest {
                page_number,
                url: self.page_url(page_number),
                retry: true,
            });
        }
        if self.exhausted
            || self.max_pages.is_some_and(|max| self.next > max)
            || self.total_pages.is_some_and(|total| self.next > total)
        {
            return PageStep::EndOfResults;
        }

        let page_number = self.next;
        self.next += 1;
        PageStep::Fetch(PageRequest {
            page_number,
            url: self.page_url(page_number),
            retry: false,
        })
    }

    /// Folds what a fetched page showed into the sequence and returns the
    /// status its cursor should settle on.
    ///
    /// An empty page ends the search even when the total-page indicator
    /// promises more, and so does a page whose current-page marker is lower
    /// than the one requested (the site redirected past the end).
    pub fn record_outcome(&mut self, request: &PageRequest, outcome: &PageOutcome) -> PageStatus {
        let past_end = outcome.listings == 0
            || outcome
                .current_page
                .is_some_and(|current| current < request.page_number);

        if past_end {
            if !request.retry {
                self.exhausted = true;
            }
            debug!(page = request.page_number, "end of results");
            return PageStatus::Exhausted;
        }

        if let Some(total) = outcome.total_pages {
            self.total_pages = Some(total);
        }
        PageStatus::Fetched
    }

    /// URL of page `n`. Page 1 is the search URL itself.
    pub fn page_url(&self, n: u32) -> String {
        if n <= 1 {
            return self.base.to_string();
        }
        let mut url = self.base.clone();

        if let Some(param) = &self.page_param {
            let pairs: Vec<(String, String)> = url
                .query_pairs()
                .filter(|(k, _)| k != param)
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            url.query_pairs_mut()
                .clear()
                .extend_pairs(pairs)
                .append_pair(param, &n.to_string());
            return url.to_string();
        }

        let path = PAGE_SEGMENT_RE.replace(url.path(), "").into_owned();
        let path = if path.ends_with('/') {
            path
        } else {
            format!("{path}/")
        };
        url.set_path(&format!("{path}pagina-{n}.htm"));
        url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;

    use super::*;

    const SEARCH: &str = "https://www.idealista.com/venta-viviendas/madrid/centro/";

    fn pager(config: &CrawlConfig) -> Pager {
        Pager::new(Url::parse(&config.search_url).unwrap(), config)
    }

    fn fetch(step: PageStep) -> PageRequest {
        match step {
            PageStep::Fetch(req) => req,
            PageStep::EndOfResults => panic!("unexpected end of results"),
        }
    }

    fn outcome(listings: usize, total: Option<u32>) -> PageOutcome {
        PageOutcome {
            listings,
            total_pages: total,
            current_page: None,
        }
    }

    #[test]
    fn path_style_page_urls() {
        let config = CrawlConfig::new(format!("{SEARCH}?ordenado-por=precios-asc"), "o.jsonl");
        let p = pager(&config);
        assert_eq!(p.page_url(1), config.search_url);
        assert_eq!(
            p.page_url(3),
            "https://www.idealista.com/venta-viviendas/madrid/centro/pagina-3.htm?ordenado-por=precios-asc"
        );
    }

    #[test]
    fn query_param_page_urls() {
        let mut config = CrawlConfig::new("https://homes.test/search?city=madrid&page=1", "o.jsonl");
        config.page_param = Some("page".into());
        let p = pager(&config);
        assert_eq!(p.page_url(4), "https://homes.test/search?city=madrid&page=4");
    }

    #[test]
    fn search_id_ignores_pagination_and_query_order() {
        let a = Url::parse("https://www.idealista.com/venta-viviendas/madrid/centro/?b=2&a=1").unwrap();
        let b = Url::parse("https://WWW.idealista.com/venta-viviendas/madrid/centro/pagina-3.htm?a=1&b=2#top")
            .unwrap();
        assert_eq!(search_id(&a, None), search_id(&b, None));
        assert_eq!(search_id(&a, None).len(), 16);

        let other = Url::parse("https://www.idealista.com/alquiler-viviendas/madrid/").unwrap();
        assert_ne!(search_id(&a, None), search_id(&other, None));
    }

    #[test]
    fn stops_after_advertised_total() {
        let config = CrawlConfig::new(SEARCH, "o.jsonl");
        let mut p = pager(&config);

        let first = fetch(p.next_page());
        assert_eq!(p.record_outcome(&first, &outcome(30, Some(2))), PageStatus::Fetched);
        let second = fetch(p.next_page());
        assert_eq!(second.page_number, 2);
        p.record_outcome(&second, &outcome(12, Some(2)));
        assert_eq!(p.next_page(), PageStep::EndOfResults);
    }

    #[test]
    fn empty_page_wins_over_stale_indicator() {
        let config = CrawlConfig::new(SEARCH, "o.jsonl");
        let mut p = pager(&config);

        let first = fetch(p.next_page());
        p.record_outcome(&first, &outcome(30, Some(10)));
        let second = fetch(p.next_page());
        assert_eq!(p.record_outcome(&second, &outcome(0, Some(10))), PageStatus::Exhausted);
        assert_eq!(p.next_page(), PageStep::EndOfResults);
    }

    #[test]
    fn redirect_past_the_end_is_exhausted() {
        let config = CrawlConfig::new(SEARCH, "o.jsonl");
        let mut p = pager(&config);
        fetch(p.next_page());
        let second = fetch(p.next_page());
        let status = p.record_outcome(
            &second,
            &PageOutcome {
                listings: 30,
                total_pages: None,
                current_page: Some(1),
            },
        );
        assert_eq!(status, PageStatus::Exhausted);
        assert_eq!(p.next_page(), PageStep::EndOfResults);
    }

    #[test]
    fn max_pages_caps_the_walk() {
        let mut config = CrawlConfig::new(SEARCH, "o.jsonl");
        config.max_pages = Some(1);
        let mut p = pager(&config);
        let first = fetch(p.next_page());
        p.record_outcome(&first, &outcome(30, None));
        assert_eq!(p.next_page(), PageStep::EndOfResults);
    }

    #[test]
    fn resume_retries_failed_pages_first() {
        let config = CrawlConfig::new(SEARCH, "o.jsonl");
        let mut state = RunState::new("id", SEARCH, Utc::now());
        state.last_completed_page = 4;
        state.failed_pages = BTreeMap::from([(2, 1), (3, 3)]);

        let mut p = Pager::resume(Url::parse(SEARCH).unwrap(), &config, &state);
        assert_eq!(p.given_up(), &[3]);

        let retry = fetch(p.next_page());
        assert_eq!((retry.page_number, retry.retry), (2, true));
        let forward = fetch(p.next_page());
        assert_eq!((forward.page_number, forward.retry), (5, false));
    }

    #[test]
    fn empty_retry_page_does_not_end_forward_paging() {
        let config = CrawlConfig::new(SEARCH, "o.jsonl");
        let mut state = RunState::new("id", SEARCH, Utc::now());
        state.last_completed_page = 3;
        state.failed_pages = BTreeMap::from([(2, 1)]);

        let mut p = Pager::resume(Url::parse(SEARCH).unwrap(), &config, &state);
        let retry = fetch(p.next_page());
        assert_eq!(p.record_outcome(&retry, &outcome(0, None)), PageStatus::Exhausted);
        assert_eq!(fetch(p.next_page()).page_number, 4);
    }
}
