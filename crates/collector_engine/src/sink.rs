use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use collector_core::{PageIndex, Record, RunMetadata, RunStatus};
use collector_logging::{collector_info, collector_warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dedupe::merge_records;
use crate::persist::{AtomicFileWriter, PersistError};

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("persist error: {0}")]
    Persist(#[from] PersistError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("sink rejected records: {0}")]
    Rejected(String),
}

/// Durable destination for collected records.
///
/// Called once with the final record list, and additionally with partial
/// lists at checkpoints when enabled; checkpoint calls carry metadata whose
/// status is [`RunStatus::InProgress`].
pub trait Sink: Send + Sync {
    fn persist(
        &self,
        records: &[Record],
        failed_pages: &[PageIndex],
        metadata: &RunMetadata,
    ) -> Result<(), SinkError>;
}

/// Failure report written next to the dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub metadata: RunMetadata,
    pub failed_pages: Vec<PageIndex>,
    pub records_written: usize,
}

fn checkpoint_suffix(metadata: &RunMetadata) -> &'static str {
    if metadata.status == RunStatus::InProgress {
        "_checkpoint"
    } else {
        ""
    }
}

/// Writes `{stem}.json` (array of records) and `{stem}_report.json`.
#[derive(Debug, Clone)]
pub struct JsonSink {
    writer: AtomicFileWriter,
    stem: String,
}

impl JsonSink {
    pub fn new(dir: PathBuf, stem: impl Into<String>) -> Self {
        Self {
            writer: AtomicFileWriter::new(dir),
            stem: stem.into(),
        }
    }

    pub fn records_path(&self) -> PathBuf {
        self.writer.path_of(&format!("{}.json", self.stem))
    }

    pub fn report_path(&self) -> PathBuf {
        self.writer.path_of(&format!("{}_report.json", self.stem))
    }
}

impl Sink for JsonSink {
    fn persist(
        &self,
        records: &[Record],
        failed_pages: &[PageIndex],
        metadata: &RunMetadata,
    ) -> Result<(), SinkError> {
        let suffix = checkpoint_suffix(metadata);
        let body = serde_json::to_vec_pretty(records)?;
        let path = self
            .writer
            .write(&format!("{}{suffix}.json", self.stem), body)?;

        let report = RunReport {
            metadata: metadata.clone(),
            failed_pages: failed_pages.to_vec(),
            records_written: records.len(),
        };
        self.writer.write(
            &format!("{}{suffix}_report.json", self.stem),
            serde_json::to_vec_pretty(&report)?,
        )?;
        collector_info!("wrote {} records to {:?}", records.len(), path);
        Ok(())
    }
}

/// Reloads a dataset written by [`JsonSink`].
pub fn load_json_records(path: &Path) -> Result<Vec<Record>, SinkError> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Writes `{stem}.csv` with one row per record.
///
/// Columns are `source_page`, `collected_at`, the first record's fields and
/// `tags` (joined with `"; "`). Fields a later record lacks are written empty.
#[derive(Debug, Clone)]
pub struct CsvSink {
    writer: AtomicFileWriter,
    stem: String,
}

impl CsvSink {
    pub fn new(dir: PathBuf, stem: impl Into<String>) -> Self {
        Self {
            writer: AtomicFileWriter::new(dir),
            stem: stem.into(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.writer.path_of(&format!("{}.csv", self.stem))
    }
}

impl Sink for CsvSink {
    fn persist(
        &self,
        records: &[Record],
        _failed_pages: &[PageIndex],
        metadata: &RunMetadata,
    ) -> Result<(), SinkError> {
        let fields: Vec<String> = records
            .first()
            .map(|first| first.field_names().map(str::to_string).collect())
            .unwrap_or_default();

        let mut csv = csv::Writer::from_writer(Vec::new());
        let mut header = vec!["source_page".to_string(), "collected_at".to_string()];
        header.extend(fields.iter().cloned());
        header.push("tags".to_string());
        csv.write_record(&header)?;

        for record in records {
            let mut row = vec![
                record.source_page().to_string(),
                record.collected_at().to_rfc3339(),
            ];
            row.extend(
                fields
                    .iter()
                    .map(|name| record.field(name).unwrap_or_default().to_string()),
            );
            row.push(record.tags().join("; "));
            csv.write_record(&row)?;
        }
        let body = csv.into_inner().map_err(|err| err.into_error())?;

        let suffix = checkpoint_suffix(metadata);
        let path = self
            .writer
            .write(&format!("{}{suffix}.csv", self.stem), body)?;
        collector_info!("wrote {} rows to {:?}", records.len(), path);
        Ok(())
    }
}

/// Persists to every inner sink, even after one fails; reports the first error.
#[derive(Clone, Default)]
pub struct FanOutSink {
    sinks: Vec<Arc<dyn Sink>>,
}

impl FanOutSink {
    pub fn new(sinks: Vec<Arc<dyn Sink>>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: Arc<dyn Sink>) {
        self.sinks.push(sink);
    }
}

impl Sink for FanOutSink {
    fn persist(
        &self,
        records: &[Record],
        failed_pages: &[PageIndex],
        metadata: &RunMetadata,
    ) -> Result<(), SinkError> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(err) = sink.persist(records, failed_pages, metadata) {
                collector_warn!("sink failed: {}", err);
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Deduplicates on a natural key, optionally merging with an earlier
/// dataset, before handing records to the inner sink.
#[derive(Clone)]
pub struct DedupSink {
    inner: Arc<dyn Sink>,
    key: String,
    existing: Vec<Record>,
}

impl DedupSink {
    pub fn new(inner: Arc<dyn Sink>, key: impl Into<String>) -> Self {
        Self {
            inner,
            key: key.into(),
            existing: Vec::new(),
        }
    }

    pub fn with_existing(mut self, existing: Vec<Record>) -> Self {
        self.existing = existing;
        self
    }
}

impl Sink for DedupSink {
    fn persist(
        &self,
        records: &[Record],
        failed_pages: &[PageIndex],
        metadata: &RunMetadata,
    ) -> Result<(), SinkError> {
        let summary = merge_records(self.existing.clone(), records.to_vec(), &self.key);
        collector_info!(
            "dedup on `{}`: {} existing, {} added, {} duplicates removed",
            self.key,
            summary.existing,
            summary.added,
            summary.duplicates_removed
        );
        self.inner.persist(&summary.records, failed_pages, metadata)
    }
}
