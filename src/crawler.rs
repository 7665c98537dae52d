//! The crawl loop: pager, fetch, extract, normalize, dedup, sink, checkpoint.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::CrawlConfig;
use crate::dedup::Deduplicator;
use crate::error::{CrawlError, ExtractionError, FetchError};
use crate::fetcher::PageSource;
use crate::models::{PageCursor, PageStatus, RunStatus};
use crate::normalize::Normalizer;
use crate::pager::{search_id, PageOutcome, PageRequest, PageStep, Pager};
use crate::scrapers::{ListingDetail, ListingParser, ListingSummary};
use crate::storage::{load_emitted_ids, Checkpoint, JsonlSink};

/// Failed pages in a row, of any kind, after which forward paging stops.
const FAILURE_STREAK_LIMIT: u32 = 5;

const NO_IDS: &[String] = &[];

/// What a run did. Logged at the end and printed by the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub search_id: String,
    pub status: RunStatus,
    pub pages_fetched: u32,
    pub pages_failed: u32,
    /// Pages that used up their attempts in earlier runs and were not retried.
    pub pages_given_up: u32,
    pub listings_emitted: usize,
    pub duplicates_skipped: usize,
    /// Cards without an id and detail pages that could not be fetched or parsed.
    pub listing_errors: usize,
    pub field_warnings: BTreeMap<&'static str, usize>,
    /// Fetching stopped after `blocked_threshold` consecutive blocked responses.
    pub blocked: bool,
    pub cancelled: bool,
    pub state_path: PathBuf,
}

#[derive(Debug, Error)]
enum DetailError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Extract(#[from] ExtractionError),
    #[error("not requested, site is blocking")]
    Skipped,
}

/// Runs one search end to end.
pub struct Crawler<'a> {
    config: &'a CrawlConfig,
    source: &'a dyn PageSource,
    parser: &'a dyn ListingParser,
    normalizer: Normalizer,
}

impl<'a> Crawler<'a> {
    pub fn new(
        config: &'a CrawlConfig,
        source: &'a dyn PageSource,
        parser: &'a dyn ListingParser,
    ) -> Self {
        Self {
            config,
            source,
            parser,
            normalizer: Normalizer::new(config.locale),
        }
    }

    /// Crawls until end of results, blocking, cancellation or `max_pages`.
    ///
    /// Page-level failures are absorbed into the summary. Only configuration,
    /// an unreachable first page of a fresh run, and sink/checkpoint I/O are
    /// returned as errors.
    pub async fn run(&self, cancel: CancellationToken) -> Result<RunSummary, CrawlError> {
        let config = self.config;
        let base = config.validate()?;
        let id = search_id(&base, config.page_param.as_deref());

        let mut checkpoint = Checkpoint::load_run_state(
            &config.output_path,
            &id,
            &config.search_url,
            config.resume,
        )
        .await?;
        let state = checkpoint.state();
        let fresh_run = state.last_completed_page == 0 && state.failed_pages.is_empty();

        let mut dedup = Deduplicator::seeded(state.seen_listing_ids.iter().cloned());
        let mut pager = if config.resume {
            dedup.extend(load_emitted_ids(&config.output_path).await?);
            Pager::resume(base, config, state)
        } else {
            Pager::new(base, config)
        };
        let mut sink = JsonlSink::open(&config.output_path).await?;
        if !dedup.is_empty() {
            info!(known_ids = dedup.len(), "listings already written will be skipped");
        }

        info!(
            search_id = %id,
            source = self.source.source_name(),
            parser = self.parser.site_name(),
            output = %config.output_path.display(),
            "starting crawl"
        );

        let mut summary = RunSummary {
            search_id: id.clone(),
            status: RunStatus::InProgress,
            pages_fetched: 0,
            pages_failed: 0,
            pages_given_up: pager.given_up().len() as u32,
            listings_emitted: 0,
            duplicates_skipped: 0,
            listing_errors: 0,
            field_warnings: BTreeMap::new(),
            blocked: false,
            cancelled: false,
            state_path: checkpoint.path().to_path_buf(),
        };
        let mut consecutive_blocks = 0u32;
        let mut failure_streak = 0u32;

        loop {
            if cancel.is_cancelled() {
                info!("cancellation requested, stopping before next page");
                summary.cancelled = true;
                break;
            }
            let request = match pager.next_page() {
                PageStep::Fetch(request) => request,
                PageStep::EndOfResults => break,
            };
            let mut cursor = PageCursor::pending(&id, request.page_number, pager.total_pages());
            info!(page = request.page_number, url = %request.url, retry = request.retry, "fetching page");

            let page = match self.source.fetch_page(&request.url).await {
                Ok(page) => {
                    consecutive_blocks = 0;
                    page
                }
                Err(err) if err.is_blocked() => {
                    consecutive_blocks += 1;
                    warn!(
                        page = request.page_number,
                        consecutive_blocks,
                        error = %err,
                        "page blocked"
                    );
                    summary.pages_failed += 1;
                    cursor.transition(PageStatus::Failed)?;
                    checkpoint.save_page_cursor(&cursor, NO_IDS).await?;
                    if consecutive_blocks >= config.blocked_threshold {
                        warn!(consecutive_blocks, "blocking threshold reached, halting search");
                        summary.blocked = true;
                        break;
                    }
                    continue;
                }
                Err(FetchError::Http { status, .. })
                    if request.page_number > 1 && matches!(status, 404 | 410) =>
                {
                    info!(page = request.page_number, status, "page gone, treating as end of results");
                    pager.record_outcome(&request, &PageOutcome::default());
                    cursor.transition(PageStatus::Exhausted)?;
                    checkpoint.save_page_cursor(&cursor, NO_IDS).await?;
                    continue;
                }
                Err(err) => {
                    consecutive_blocks = 0;
                    if fresh_run && request.page_number == 1 && !request.retry {
                        return Err(CrawlError::Unreachable(err));
                    }
                    warn!(page = request.page_number, error = %err, "page fetch failed");
                    summary.pages_failed += 1;
                    cursor.transition(PageStatus::Failed)?;
                    checkpoint.save_page_cursor(&cursor, NO_IDS).await?;
                    failure_streak += 1;
                    if failure_streak >= FAILURE_STREAK_LIMIT {
                        warn!(failure_streak, "too many failed pages in a row, halting search");
                        break;
                    }
                    continue;
                }
            };

            let index = match self.parser.extract_summaries(&page) {
                Ok(index) => index,
                Err(err) => {
                    warn!(page = request.page_number, error = %err, "page could not be parsed");
                    summary.pages_failed += 1;
                    cursor.transition(PageStatus::Failed)?;
                    checkpoint.save_page_cursor(&cursor, NO_IDS).await?;
                    failure_streak += 1;
                    if failure_streak >= FAILURE_STREAK_LIMIT {
                        warn!(failure_streak, "too many failed pages in a row, halting search");
                        break;
                    }
                    continue;
                }
            };
            failure_streak = 0;
            summary.listing_errors += index.skipped_cards;

            let outcome = PageOutcome {
                listings: index.summaries.len(),
                total_pages: index.total_pages,
                current_page: index.current_page,
            };
            let status = pager.record_outcome(&request, &outcome);
            cursor.total_pages_known = pager.total_pages();
            if status == PageStatus::Exhausted {
                cursor.transition(PageStatus::Exhausted)?;
                checkpoint.save_page_cursor(&cursor, NO_IDS).await?;
                continue;
            }

            let emitted = self
                .emit_page(
                    &request,
                    &index.summaries,
                    &mut dedup,
                    &mut sink,
                    &mut consecutive_blocks,
                    &mut summary,
                )
                .await?;
            cursor.transition(PageStatus::Fetched)?;
            checkpoint.save_page_cursor(&cursor, &emitted).await?;
            summary.pages_fetched += 1;

            info!(
                page = request.page_number,
                total_pages = ?pager.total_pages(),
                emitted = emitted.len(),
                "page done"
            );
            if summary.blocked {
                warn!(consecutive_blocks, "blocking threshold reached on detail pages, halting search");
                break;
            }
        }

        summary.duplicates_skipped = dedup.duplicates_skipped();
        summary.status = if summary.blocked
            || summary.cancelled
            || !checkpoint.state().failed_pages.is_empty()
        {
            RunStatus::Partial
        } else {
            RunStatus::Complete
        };
        checkpoint.finish(summary.status).await?;

        info!(
            search_id = %summary.search_id,
            status = ?summary.status,
            pages_fetched = summary.pages_fetched,
            pages_failed = summary.pages_failed,
            listings_emitted = summary.listings_emitted,
            duplicates_skipped = summary.duplicates_skipped,
            listing_errors = summary.listing_errors,
            "crawl finished"
        );
        Ok(summary)
    }

    /// Normalizes and writes the new listings of one page, then commits.
    /// Returns the ids written.
    async fn emit_page(
        &self,
        request: &PageRequest,
        summaries: &[ListingSummary],
        dedup: &mut Deduplicator,
        sink: &mut JsonlSink,
        consecutive_blocks: &mut u32,
        summary: &mut RunSummary,
    ) -> Result<Vec<String>, CrawlError> {
        let details = if self.config.fetch_details {
            let targets: Vec<&ListingSummary> = summaries
                .iter()
                .filter(|s| !dedup.contains(&s.listing_id))
                .collect();
            self.fetch_details(&targets, consecutive_blocks, summary).await
        } else {
            HashMap::new()
        };

        let mut emitted = Vec::new();
        for listing in summaries {
            if !dedup.should_emit(&listing.listing_id) {
                debug!(listing_id = %listing.listing_id, "duplicate listing skipped");
                continue;
            }
            let normalized =
                self.normalizer
                    .normalize(listing, details.get(&listing.listing_id), Utc::now());
            for warning in &normalized.warnings {
                debug!(
                    listing_id = %listing.listing_id,
                    field = warning.field,
                    error = %warning.error,
                    "field not normalized"
                );
                *summary.field_warnings.entry(warning.field).or_insert(0) += 1;
            }

            sink.append_record(&normalized.record).await?;
            dedup.mark_emitted(&listing.listing_id);
            emitted.push(listing.listing_id.clone());
        }

        sink.commit().await?;
        summary.listings_emitted += emitted.len();
        debug!(page = request.page_number, emitted = emitted.len(), "page committed");
        Ok(emitted)
    }

    /// Fetches detail pages with at most `concurrency` in flight. Failures
    /// fall back to card-only records.
    ///
    /// Blocked detail fetches count towards `consecutive_blocks` like index
    /// pages do. Once the threshold is reached no further detail page is
    /// requested and `summary.blocked` is set.
    async fn fetch_details(
        &self,
        targets: &[&ListingSummary],
        consecutive_blocks: &mut u32,
        summary: &mut RunSummary,
    ) -> HashMap<String, ListingDetail> {
        let source = self.source;
        let parser = self.parser;
        let threshold = self.config.blocked_threshold;
        let blocks = AtomicU32::new(*consecutive_blocks);
        let blocks = &blocks;

        let results: Vec<(String, Result<ListingDetail, DetailError>)> =
            stream::iter(targets.iter().copied())
                .map(|listing| async move {
                    if blocks.load(Ordering::SeqCst) >= threshold {
                        return (listing.listing_id.clone(), Err(DetailError::Skipped));
                    }
                    let detail = match source.fetch_page(&listing.url).await {
                        Ok(page) => {
                            blocks.store(0, Ordering::SeqCst);
                            parser.extract_detail(&page).map_err(DetailError::from)
                        }
                        Err(err) => {
                            if err.is_blocked() {
                                blocks.fetch_add(1, Ordering::SeqCst);
                            }
                            Err(DetailError::from(err))
                        }
                    };
                    (listing.listing_id.clone(), detail)
                })
                .buffer_unordered(self.config.concurrency.max(1))
                .collect()
                .await;

        *consecutive_blocks = blocks.load(Ordering::SeqCst);
        if *consecutive_blocks >= threshold {
            summary.blocked = true;
        }

        let mut details = HashMap::with_capacity(results.len());
        for (listing_id, result) in results {
            match result {
                Ok(detail) => {
                    details.insert(listing_id, detail);
                }
                Err(DetailError::Skipped) => {
                    debug!(%listing_id, "detail page skipped while blocked, using card data");
                    summary.listing_errors += 1;
                }
                Err(err) => {
                    warn!(%listing_id, error = %err, "detail page unavailable, using card data");
                    summary.listing_errors += 1;
                }
            }
        }
        details
    }
}
