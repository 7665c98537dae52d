use std::sync::atomic::{AtomicUsize, Ordering};

use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, REFERER, USER_AGENT};

const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
];

const ACCEPT_LANGUAGES: &[&str] = &[
    "es-ES,es;q=0.9,en;q=0.8",
    "en-US,en;q=0.9",
    "es-ES,es;q=0.9",
];

const REFERERS: &[&str] = &["https://www.google.com/", "https://www.bing.com/"];

const ACCEPT_HTML: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,image/apng,*/*;q=0.8";

/// One coherent set of request headers presented to the site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestIdentity {
    pub user_agent: String,
    pub accept_language: &'static str,
    pub referer: &'static str,
}

impl RequestIdentity {
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(ua) = HeaderValue::from_str(&self.user_agent) {
            headers.insert(USER_AGENT, ua);
        }
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HTML));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(self.accept_language));
        headers.insert(REFERER, HeaderValue::from_static(self.referer));
        headers.insert(
            "Upgrade-Insecure-Requests",
            HeaderValue::from_static("1"),
        );
        headers
    }
}

/// Round-robin rotation over a fixed pool of identities.
///
/// The starting offset is random so that separate runs do not all open with
/// the same fingerprint.
#[derive(Debug)]
pub struct IdentityPool {
    identities: Vec<RequestIdentity>,
    next: AtomicUsize,
}

impl IdentityPool {
    pub fn new(user_agents: &[String]) -> Self {
        let agents: Vec<String> = if user_agents.is_empty() {
            DEFAULT_USER_AGENTS.iter().map(|ua| (*ua).to_owned()).collect()
        } else {
            user_agents.to_vec()
        };

        let identities: Vec<RequestIdentity> = agents
            .into_iter()
            .enumerate()
            .map(|(i, user_agent)| RequestIdentity {
                user_agent,
                accept_language: ACCEPT_LANGUAGES[i % ACCEPT_LANGUAGES.len()],
                referer: REFERERS[i % REFERERS.len()],
            })
            .collect();

        let start = rand::thread_rng().gen_range(0..identities.len());
        Self {
            identities,
            next: AtomicUsize::new(start),
        }
    }

    /// Number of identities in the rotation. Never zero.
    pub fn size(&self) -> usize {
        self.identities.len()
    }

    /// Hands out the next identity in the rotation.
    pub fn next_identity(&self) -> RequestIdentity {
        let i = self.next.fetch_add(1, Ordering::Relaxed) % self.identities.len();
        self.identities[i].clone()
    }
}
