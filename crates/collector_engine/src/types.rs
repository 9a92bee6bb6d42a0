use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use collector_core::{PageFailure, PageIndex, ProgressSnapshot, Record, RunMetadata};

use crate::decode::{decode_body, DecodeError};

/// Raw content of one page as returned by a fetcher. Consumed by the
/// extractor within the same attempt and never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPage {
    pub page: PageIndex,
    pub body: Bytes,
    pub content_type: Option<String>,
    pub final_url: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

impl RawPage {
    pub fn new(page: PageIndex, body: impl Into<Bytes>) -> Self {
        Self {
            page,
            body: body.into(),
            content_type: None,
            final_url: None,
            fetched_at: Utc::now(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_fetched_at(mut self, fetched_at: DateTime<Utc>) -> Self {
        self.fetched_at = fetched_at;
        self
    }

    /// Body decoded to UTF-8, honouring the content-type charset.
    pub fn text(&self) -> Result<String, DecodeError> {
        decode_body(&self.body, self.content_type.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    pub kind: FetchFailureKind,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FetchFailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for FetchError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchFailureKind {
    InvalidUrl,
    HttpStatus(u16),
    Timeout,
    RedirectLimitExceeded,
    TooLarge { max_bytes: u64, actual: Option<u64> },
    UnsupportedContentType { content_type: String },
    /// A browser session or similar per-attempt resource could not be set up.
    Resource,
    Network,
}

impl fmt::Display for FetchFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchFailureKind::InvalidUrl => write!(f, "invalid url"),
            FetchFailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FetchFailureKind::Timeout => write!(f, "timeout"),
            FetchFailureKind::RedirectLimitExceeded => write!(f, "redirect limit exceeded"),
            FetchFailureKind::TooLarge { max_bytes, actual } => {
                write!(f, "response too large (max {max_bytes}, actual {actual:?})")
            }
            FetchFailureKind::UnsupportedContentType { content_type } => {
                write!(f, "unsupported content type {content_type}")
            }
            FetchFailureKind::Resource => write!(f, "resource unavailable"),
            FetchFailureKind::Network => write!(f, "network error"),
        }
    }
}

/// Content arrived but did not have the expected shape.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<DecodeError> for ParseError {
    fn from(err: DecodeError) -> Self {
        ParseError::new(err.to_string())
    }
}

/// Result of a single fetch + extract attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success(Vec<Record>),
    FetchError(FetchError),
    ParseError(ParseError),
    /// The fetch succeeded and the extractor found no records.
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    PageStarted {
        page: PageIndex,
    },
    AttemptFailed {
        page: PageIndex,
        attempt: u32,
        max_attempts: u32,
        failure: PageFailure,
        /// `None` when this was the last attempt.
        retry_in: Option<Duration>,
    },
    PageResolved {
        page: PageIndex,
        attempts: u32,
        records: usize,
        failure: Option<PageFailure>,
    },
    Checkpoint(ProgressSnapshot),
    Cancelled {
        pages_resolved: usize,
        pages_planned: usize,
    },
    Finished(RunMetadata),
}
