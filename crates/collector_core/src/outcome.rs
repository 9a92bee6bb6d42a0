use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{PageIndex, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Transport, status or timeout failure while fetching.
    Fetch,
    /// The page arrived but its content had an unexpected shape.
    Parse,
    /// Every attempt returned zero records and the policy treats that as failure.
    EmptyPage,
    /// The retry loop was stopped by cancellation before a success.
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Fetch => write!(f, "fetch error"),
            FailureKind::Parse => write!(f, "parse error"),
            FailureKind::EmptyPage => write!(f, "empty page"),
            FailureKind::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Terminal failure of a page, taken from the last failed attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl PageFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for PageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageStatus {
    /// Zero or more records; an accepted empty page is `Collected(vec![])`.
    Collected(Vec<Record>),
    Failed(PageFailure),
}

/// Resolved outcome of one page after its retry loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageResult {
    page: PageIndex,
    attempts: u32,
    status: PageStatus,
}

impl PageResult {
    pub fn collected(page: PageIndex, attempts: u32, records: Vec<Record>) -> Self {
        Self {
            page,
            attempts,
            status: PageStatus::Collected(records),
        }
    }

    pub fn failed(page: PageIndex, attempts: u32, failure: PageFailure) -> Self {
        Self {
            page,
            attempts,
            status: PageStatus::Failed(failure),
        }
    }

    pub fn page(&self) -> PageIndex {
        self.page
    }

    /// Number of fetch attempts spent on this page.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn status(&self) -> &PageStatus {
        &self.status
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, PageStatus::Collected(_))
    }

    /// Records of a successful page; empty for failures.
    pub fn records(&self) -> &[Record] {
        match &self.status {
            PageStatus::Collected(records) => records,
            PageStatus::Failed(_) => &[],
        }
    }

    pub fn record_count(&self) -> usize {
        self.records().len()
    }

    pub fn failure(&self) -> Option<&PageFailure> {
        match &self.status {
            PageStatus::Collected(_) => None,
            PageStatus::Failed(failure) => Some(failure),
        }
    }
}
