use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::view_model::ProgressSnapshot;
use crate::{PageIndex, PageResult, Record};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("page {0} is not part of this run")]
    UnplannedPage(PageIndex),
    #[error("page {0} already has a result")]
    DuplicatePage(PageIndex),
    #[error("run is already finalized")]
    Finalized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    InProgress,
    Completed,
    Cancelled,
}

/// Denominator for [`CollectionRun::success_rate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SuccessTarget {
    pub expected_records: Option<u64>,
    pub records_per_page_estimate: u32,
}

/// Run metadata persisted next to the records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub pages_planned: usize,
    pub pages_attempted: usize,
    pub total_records: usize,
    pub failed_pages: Vec<PageIndex>,
    pub not_attempted_pages: Vec<PageIndex>,
    pub success_rate: Option<f64>,
}

/// Append-only ledger of a collection run.
///
/// Holds exactly one [`PageResult`] per visited page, keyed and iterated in
/// page order whatever order the results arrived in.
#[derive(Debug, Clone)]
pub struct CollectionRun {
    planned: Vec<PageIndex>,
    results: BTreeMap<PageIndex, PageResult>,
    failed_pages: BTreeSet<PageIndex>,
    total_records: usize,
    status: RunStatus,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    target: SuccessTarget,
}

impl CollectionRun {
    pub fn new(planned: Vec<PageIndex>, started_at: DateTime<Utc>, target: SuccessTarget) -> Self {
        let mut planned = planned;
        planned.sort_unstable();
        planned.dedup();
        Self {
            planned,
            results: BTreeMap::new(),
            failed_pages: BTreeSet::new(),
            total_records: 0,
            status: RunStatus::InProgress,
            started_at,
            finished_at: None,
            target,
        }
    }

    /// Commits a page result as a whole.
    pub fn record(&mut self, result: PageResult) -> Result<(), LedgerError> {
        if self.status != RunStatus::InProgress {
            return Err(LedgerError::Finalized);
        }
        let page = result.page();
        if self.planned.binary_search(&page).is_err() {
            return Err(LedgerError::UnplannedPage(page));
        }
        if self.results.contains_key(&page) {
            return Err(LedgerError::DuplicatePage(page));
        }

        if result.is_success() {
            self.total_records += result.record_count();
        } else {
            self.failed_pages.insert(page);
        }
        self.results.insert(page, result);
        Ok(())
    }

    pub fn finish(&mut self, status: RunStatus, finished_at: DateTime<Utc>) {
        if self.status == RunStatus::InProgress {
            self.status = status;
            self.finished_at = Some(finished_at);
        }
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn planned_pages(&self) -> &[PageIndex] {
        &self.planned
    }

    pub fn record_count(&self) -> usize {
        self.total_records
    }

    pub fn resolved_count(&self) -> usize {
        self.results.len()
    }

    pub fn failed_page_indices(&self) -> Vec<PageIndex> {
        self.failed_pages.iter().copied().collect()
    }

    /// Planned pages that have no result, as opposed to failed ones.
    pub fn not_attempted(&self) -> Vec<PageIndex> {
        self.planned
            .iter()
            .copied()
            .filter(|page| !self.results.contains_key(page))
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.results.len() == self.planned.len()
    }

    pub fn result(&self, page: PageIndex) -> Option<&PageResult> {
        self.results.get(&page)
    }

    /// Page results in ascending page order.
    pub fn page_results(&self) -> impl Iterator<Item = &PageResult> {
        self.results.values()
    }

    /// Records of all successful pages, in page order.
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.results.values().flat_map(PageResult::records)
    }

    /// Owned, shape-conformed copy of the records for persistence.
    pub fn records_for_persistence(&self) -> Vec<Record> {
        let names = self.field_names();
        self.records().map(|record| record.conformed_to(&names)).collect()
    }

    /// Union of field names over all records, in first-seen order.
    pub fn field_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for record in self.records() {
            for name in record.field_names() {
                if !names.iter().any(|known| known == name) {
                    names.push(name.to_string());
                }
            }
        }
        names
    }

    /// Collected records relative to the expected count, or to the
    /// `planned_pages * records_per_page_estimate` estimate when none is known.
    pub fn success_rate(&self) -> Option<f64> {
        let denominator = match self.target.expected_records {
            Some(expected) => expected,
            None => {
                self.planned.len() as u64 * u64::from(self.target.records_per_page_estimate)
            }
        };
        if denominator == 0 {
            None
        } else {
            Some(self.total_records as f64 / denominator as f64)
        }
    }

    pub fn metadata(&self) -> RunMetadata {
        RunMetadata {
            started_at: self.started_at,
            finished_at: self.finished_at,
            status: self.status,
            pages_planned: self.planned.len(),
            pages_attempted: self.results.len(),
            total_records: self.total_records,
            failed_pages: self.failed_page_indices(),
            not_attempted_pages: self.not_attempted(),
            success_rate: self.success_rate(),
        }
    }

    /// Progress view for checkpoints; `elapsed` comes from the caller's clock.
    pub fn progress(&self, elapsed: Duration) -> ProgressSnapshot {
        let processed = self.results.len();
        let remaining = self.planned.len().saturating_sub(processed);
        let estimated_remaining = if processed == 0 {
            None
        } else {
            let per_page = elapsed.div_f64(processed as f64);
            Some(per_page.mul_f64(remaining as f64))
        };
        ProgressSnapshot {
            pages_processed: processed,
            pages_planned: self.planned.len(),
            records_so_far: self.total_records,
            failed_so_far: self.failed_pages.len(),
            elapsed,
            estimated_remaining,
        }
    }
}
