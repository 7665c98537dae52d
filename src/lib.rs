//! Crawl a paginated property-listing search into an append-only JSON Lines
//! file, resumable across runs.

pub mod config;
pub mod crawler;
pub mod dedup;
pub mod error;
pub mod fetcher;
pub mod models;
pub mod normalize;
pub mod pager;
pub mod scrapers;
pub mod storage;

pub use config::CrawlConfig;
pub use crawler::{Crawler, RunSummary};
pub use error::CrawlError;
pub use fetcher::{Fetcher, PageSource, RawPage};
pub use models::{Field, ListingRecord, RunStatus};
pub use normalize::NumberLocale;
pub use scrapers::{IdealistaParser, ListingParser};
