use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use listing_scout::{
    CrawlConfig, Crawler, Fetcher, IdealistaParser, NumberLocale, RunStatus, RunSummary,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Crawl a property-listing search into a JSON Lines file.
#[derive(Debug, Parser)]
#[command(name = "listing-scout", version)]
struct Cli {
    /// First results page of the search
    #[arg(env = "LISTING_SCOUT_SEARCH_URL")]
    search_url: String,

    /// JSON Lines output file; the checkpoint is written next to it
    #[arg(short, long, env = "LISTING_SCOUT_OUTPUT", default_value = "listings.jsonl")]
    output: PathBuf,

    #[arg(long, env = "LISTING_SCOUT_MAX_PAGES")]
    max_pages: Option<u32>,

    /// Minimum delay between requests to the same host
    #[arg(long, env = "LISTING_SCOUT_REQUEST_DELAY_MS")]
    request_delay_ms: Option<u64>,

    #[arg(long, env = "LISTING_SCOUT_MAX_RETRIES")]
    max_retries: Option<u32>,

    /// In-flight detail-page fetches
    #[arg(long, env = "LISTING_SCOUT_CONCURRENCY")]
    concurrency: Option<usize>,

    /// Ignore any checkpoint and start from page 1
    #[arg(long, env = "LISTING_SCOUT_NO_RESUME")]
    no_resume: bool,

    #[arg(long, env = "LISTING_SCOUT_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,

    #[arg(long, env = "LISTING_SCOUT_BACKOFF_BASE_MS")]
    backoff_base_ms: Option<u64>,

    /// Consecutive blocked responses that halt the search
    #[arg(long, env = "LISTING_SCOUT_BLOCKED_THRESHOLD")]
    blocked_threshold: Option<u32>,

    /// Attempts a failed page gets across resumed runs
    #[arg(long, env = "LISTING_SCOUT_MAX_PAGE_ATTEMPTS")]
    max_page_attempts: Option<u32>,

    /// Also fetch each listing's own page
    #[arg(long, env = "LISTING_SCOUT_FETCH_DETAILS")]
    fetch_details: bool,

    /// Query parameter carrying the page number, instead of pagina-N.htm
    #[arg(long, env = "LISTING_SCOUT_PAGE_PARAM")]
    page_param: Option<String>,

    /// User-Agent to rotate through (repeatable, or `|`-separated in env)
    #[arg(long = "user-agent", env = "LISTING_SCOUT_USER_AGENTS", value_delimiter = '|')]
    user_agents: Vec<String>,

    /// Number format of the site: es (1.250,50) or en (1,250.50)
    #[arg(long, env = "LISTING_SCOUT_LOCALE", default_value = "es")]
    locale: NumberLocale,
}

impl Cli {
    fn into_config(self) -> CrawlConfig {
        let mut config = CrawlConfig::new(self.search_url, self.output);
        config.max_pages = self.max_pages;
        if let Some(v) = self.request_delay_ms {
            config.request_delay_ms = v;
        }
        if let Some(v) = self.max_retries {
            config.max_retries = v;
        }
        if let Some(v) = self.concurrency {
            config.concurrency = v;
        }
        if let Some(v) = self.timeout_secs {
            config.timeout_secs = v;
        }
        if let Some(v) = self.backoff_base_ms {
            config.backoff_base_ms = v;
        }
        if let Some(v) = self.blocked_threshold {
            config.blocked_threshold = v;
        }
        if let Some(v) = self.max_page_attempts {
            config.max_page_attempts = v;
        }
        config.resume = !self.no_resume;
        config.fetch_details = self.fetch_details;
        config.page_param = self.page_param;
        config.user_agents = self.user_agents;
        config.locale = self.locale;
        config
    }
}

async fn crawl(config: CrawlConfig) -> anyhow::Result<RunSummary> {
    config.validate().context("invalid configuration")?;
    let fetcher = Fetcher::new(&config).context("failed to build HTTP client")?;
    let parser = IdealistaParser::new();

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received, finishing current page");
            on_signal.cancel();
        }
    });

    let summary = Crawler::new(&config, &fetcher, &parser)
        .run(cancel)
        .await
        .with_context(|| format!("crawl of {} failed", config.search_url))?;
    Ok(summary)
}

fn print_summary(summary: &RunSummary) {
    println!("Search {} finished: {:?}", summary.search_id, summary.status);
    println!(
        "   Pages: {} fetched, {} failed, {} given up",
        summary.pages_fetched, summary.pages_failed, summary.pages_given_up
    );
    println!(
        "   Listings: {} written, {} duplicates skipped, {} errors",
        summary.listings_emitted, summary.duplicates_skipped, summary.listing_errors
    );
    if !summary.field_warnings.is_empty() {
        let tallies: Vec<String> = summary
            .field_warnings
            .iter()
            .map(|(field, n)| format!("{field}={n}"))
            .collect();
        println!("   Unparseable fields: {}", tallies.join(", "));
    }
    if summary.blocked {
        println!("   Stopped: site is blocking requests");
    }
    if summary.cancelled {
        println!("   Stopped: cancelled");
    }
    println!("   State: {}", summary.state_path.display());
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_config();
    info!("🏠 Listing Scout");
    info!(search_url = %config.search_url, output = %config.output_path.display(), "starting");

    match crawl(config).await {
        Ok(summary) => {
            print_summary(&summary);
            match summary.status {
                RunStatus::Complete => ExitCode::SUCCESS,
                _ => ExitCode::from(2),
            }
        }
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
