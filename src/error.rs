use std::path::PathBuf;

use thiserror::Error;

use crate::models::PageStatus;

/// Failure of a single fetch attempt (or of the whole retry sequence).
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("unexpected HTTP status {status} from {url}")]
    Http { status: u16, url: String },

    #[error("blocked by {url}: {reason}")]
    Blocked { url: String, reason: String },

    #[error("network error for {url}: {message}")]
    Network { url: String, message: String },
}

impl FetchError {
    /// Timeouts, network failures, 5xx and 429 are worth another attempt.
    /// `Blocked` never is: blind retries make blocking worse.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout { .. } | FetchError::Network { .. } => true,
            FetchError::Http { status, .. } => *status == 429 || (500..600).contains(status),
            FetchError::Blocked { .. } => false,
        }
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, FetchError::Blocked { .. })
    }

    pub(crate) fn from_reqwest(url: &str, err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout {
                url: url.to_owned(),
            }
        } else {
            FetchError::Network {
                url: url.to_owned(),
                message: err.to_string(),
            }
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ExtractionError {
    /// The page matches no known card template and no "no results" marker,
    /// which usually means the site changed its markup.
    #[error("page {url} matches no known listing layout")]
    SchemaMismatch { url: String },

    #[error("listing card is missing required field `{field}`")]
    MissingField { field: &'static str },
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum NormalizationError {
    #[error("field is empty")]
    Empty,

    #[error("no number found in {raw:?}")]
    NotNumeric { raw: String },

    #[error("unknown unit in {raw:?}")]
    UnknownUnit { raw: String },

    #[error("value out of range in {raw:?}")]
    OutOfRange { raw: String },

    #[error("unrecognized date {raw:?}")]
    UnrecognizedDate { raw: String },

    #[error("unknown property type {raw:?}")]
    UnknownPropertyType { raw: String },

    #[error("unrecognized value {raw:?}")]
    Unrecognized { raw: String },
}

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("failed to read checkpoint {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write checkpoint {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt checkpoint {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("checkpoint {path} belongs to search {found}, expected {expected}")]
    SearchMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },

    #[error("page {page} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        page: u32,
        from: PageStatus,
        to: PageStatus,
    },
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error on output {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize record {listing_id}: {source}")]
    Serialize {
        listing_id: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid search URL {url:?}: {reason}")]
    InvalidSearchUrl { url: String, reason: String },

    #[error("invalid value for {option}: {reason}")]
    InvalidOption { option: &'static str, reason: String },
}

/// Errors that abort a run. Everything else is absorbed into the run summary.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("search URL is unreachable: {0}")]
    Unreachable(#[source] FetchError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Sink(#[from] SinkError),
}
