use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CheckpointError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    Pending,
    Fetched,
    Failed,
    /// The page signalled end of results (no listing cards).
    Exhausted,
}

/// Progress marker for one results page of a search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageCursor {
    pub search_id: String,
    pub page_number: u32,
    pub total_pages_known: Option<u32>,
    pub status: PageStatus,
}

impl PageCursor {
    pub fn pending(search_id: &str, page_number: u32, total_pages_known: Option<u32>) -> Self {
        Self {
            search_id: search_id.to_owned(),
            page_number,
            total_pages_known,
            status: PageStatus::Pending,
        }
    }

    /// Moves the cursor out of `Pending`. A settled cursor never changes again.
    pub fn transition(&mut self, to: PageStatus) -> Result<(), CheckpointError> {
        if self.status != PageStatus::Pending || to == PageStatus::Pending {
            return Err(CheckpointError::InvalidTransition {
                page: self.page_number,
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    InProgress,
    Complete,
    /// Finished, but some pages were permanently failed or fetching was halted.
    Partial,
}

/// Everything needed to resume a search. Persisted by the checkpoint after
/// every page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunState {
    pub search_id: String,
    pub search_url: String,
    pub status: RunStatus,
    /// Highest page whose records are durably written; 0 when none is.
    pub last_completed_page: u32,
    pub total_pages_known: Option<u32>,
    /// Failed page number -> attempts spent on it so far.
    #[serde(default)]
    pub failed_pages: BTreeMap<u32, u32>,
    #[serde(default)]
    pub seen_listing_ids: BTreeSet<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunState {
    pub fn new(search_id: &str, search_url: &str, now: DateTime<Utc>) -> Self {
        Self {
            search_id: search_id.to_owned(),
            search_url: search_url.to_owned(),
            status: RunStatus::InProgress,
            last_completed_page: 0,
            total_pages_known: None,
            failed_pages: BTreeMap::new(),
            seen_listing_ids: BTreeSet::new(),
            started_at: now,
            updated_at: now,
        }
    }

    /// Folds a settled page cursor into the run state.
    pub(crate) fn apply_cursor(&mut self, cursor: &PageCursor, now: DateTime<Utc>) {
        match cursor.status {
            PageStatus::Fetched | PageStatus::Exhausted => {
                self.failed_pages.remove(&cursor.page_number);
                if cursor.status == PageStatus::Fetched {
                    self.last_completed_page = self.last_completed_page.max(cursor.page_number);
                }
            }
            PageStatus::Failed => {
                *self.failed_pages.entry(cursor.page_number).or_insert(0) += 1;
            }
            PageStatus::Pending => {}
        }
        if cursor.total_pages_known.is_some() {
            self.total_pages_known = cursor.total_pages_known;
        }
        self.updated_at = now;
    }
}
