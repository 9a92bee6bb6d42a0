//! Wires the reference adapters to the engine and drives one run.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use collector_core::CollectionRun;
use collector_engine::{
    dataset_stem, ensure_output_dir, load_json_records, CancellationToken, CollectError,
    Collector, CollectorHandle, CsvSink, DedupSink, FanOutSink, JsonSink, ReqwestPageFetcher,
    RunEvent, Sink,
};
use collector_logging::{collector_debug, collector_error, collector_info, collector_warn};

use crate::settings::{AppConfig, OutputConfig};

/// Files the final persistence wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFiles {
    pub records: PathBuf,
    pub report: PathBuf,
    pub csv: Option<PathBuf>,
}

/// Builds the sink chain: JSON (+ CSV), optionally behind a dedup/merge step.
pub fn build_sink(
    output: &OutputConfig,
    source: &str,
    started_at: DateTime<Utc>,
) -> Result<(Arc<dyn Sink>, OutputFiles)> {
    ensure_output_dir(&output.dir)
        .with_context(|| format!("preparing output directory {}", output.dir.display()))?;
    let stem = dataset_stem(&output.prefix, source, started_at);

    let json = JsonSink::new(output.dir.clone(), stem.clone());
    let mut files = OutputFiles {
        records: json.records_path(),
        report: json.report_path(),
        csv: None,
    };
    let mut fan_out = FanOutSink::default();
    fan_out.push(Arc::new(json));
    if output.csv {
        let csv = CsvSink::new(output.dir.clone(), stem);
        files.csv = Some(csv.path());
        fan_out.push(Arc::new(csv));
    }
    let sink: Arc<dyn Sink> = Arc::new(fan_out);

    let Some(key) = &output.dedupe_key else {
        return Ok((sink, files));
    };
    let mut dedup = DedupSink::new(sink, key.clone());
    if let Some(path) = &output.merge_existing {
        let existing = load_json_records(path)
            .with_context(|| format!("loading existing dataset {}", path.display()))?;
        collector_info!("merging with {} records from {:?}", existing.len(), path);
        dedup = dedup.with_existing(existing);
    }
    Ok((Arc::new(dedup), files))
}

pub fn run(config: &AppConfig) -> Result<(CollectionRun, OutputFiles)> {
    config.validate()?;
    let (sink, files) = build_sink(&config.output, &config.source.url_template, Utc::now())?;
    let fetcher = ReqwestPageFetcher::new(config.source.fetch_settings()?);
    let extractor = config.source.extractor()?;
    let collector = Collector::new(Arc::new(fetcher), Arc::new(extractor), sink);

    let handle = CollectorHandle::spawn(collector, config.run.clone());
    watch_interrupt(handle.cancellation_token());

    loop {
        match handle.recv_timeout(Duration::from_millis(200)) {
            Some(event) => report(&event),
            None if handle.is_finished() => break,
            None => {}
        }
    }
    while let Some(event) = handle.try_recv() {
        report(&event);
    }

    match handle.join() {
        Ok(run) => Ok((run, files)),
        Err(CollectError::Sink { source, run }) => {
            collector_error!(
                "{} records were collected but could not be saved",
                run.record_count()
            );
            Err(anyhow!(source).context("writing the dataset failed"))
        }
        Err(err) => Err(err.into()),
    }
}

/// Cancels the run on Ctrl-C; pages already in flight still finish.
fn watch_interrupt(cancel: CancellationToken) {
    thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                collector_warn!("Ctrl-C handling unavailable: {}", err);
                return;
            }
        };
        runtime.block_on(async {
            tokio::select! {
                signal = tokio::signal::ctrl_c() => {
                    if signal.is_ok() {
                        collector_warn!("interrupted; finishing pages in flight");
                        cancel.cancel();
                    }
                }
                _ = cancel.cancelled() => {}
            }
        });
    });
}

fn report(event: &RunEvent) {
    match event {
        RunEvent::Checkpoint(snapshot) => collector_info!("progress: {}", snapshot),
        RunEvent::Cancelled {
            pages_resolved,
            pages_planned,
        } => collector_warn!("stopped after {}/{} pages", pages_resolved, pages_planned),
        other => collector_debug!("{:?}", other),
    }
}

/// Human-readable end-of-run summary.
pub fn summary(run: &CollectionRun, files: &OutputFiles) -> String {
    let metadata = run.metadata();
    let mut lines = vec![
        format!("status: {:?}", metadata.status),
        format!(
            "pages: {} planned, {} resolved, {} failed, {} not attempted",
            metadata.pages_planned,
            metadata.pages_attempted,
            metadata.failed_pages.len(),
            metadata.not_attempted_pages.len()
        ),
        format!("records: {}", metadata.total_records),
    ];
    if let Some(rate) = metadata.success_rate {
        lines.push(format!("success rate: {:.1}%", rate * 100.0));
    }
    let retry: Vec<String> = metadata
        .failed_pages
        .iter()
        .chain(&metadata.not_attempted_pages)
        .map(|page| page.to_string())
        .collect();
    if !retry.is_empty() {
        lines.push(format!("re-run with: --only-pages {}", retry.join(",")));
    }
    lines.push(format!("dataset: {}", files.records.display()));
    if let Some(csv) = &files.csv {
        lines.push(format!("csv: {}", csv.display()));
    }
    lines.push(format!("report: {}", files.report.display()));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use collector_core::{
        FailureKind, PageFailure, PageIndex, PageResult, Record, RunConfig, RunMetadata,
        RunStatus,
    };

    fn page(n: u32) -> PageIndex {
        PageIndex::new(n).unwrap()
    }

    fn record(n: u32, id: &str) -> Record {
        Record::builder(page(n), Utc::now())
            .field("patent_number", id)
            .build()
            .unwrap()
    }

    fn started() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap()
    }

    #[test]
    fn sink_chain_writes_timestamped_json_and_csv() {
        let dir = tempfile::tempdir().unwrap();
        let output = OutputConfig {
            dir: dir.path().join("out"),
            prefix: "solar panels".to_string(),
            ..OutputConfig::default()
        };
        let (sink, files) = build_sink(&output, "https://x.example/?p={page}", started()).unwrap();

        let name = files.records.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("solar_panels--"));
        assert!(name.ends_with("_20240501_093000.json"));

        let run = CollectionRun::new(vec![page(1)], started(), Default::default());
        sink.persist(&[record(1, "US-1")], &[], &run.metadata())
            .unwrap();
        // In-progress metadata goes to the checkpoint files.
        assert!(!files.records.exists());

        let mut metadata: RunMetadata = run.metadata();
        metadata.status = RunStatus::Completed;
        sink.persist(&[record(1, "US-1")], &[], &metadata).unwrap();
        assert!(files.records.exists());
        assert!(files.report.exists());
        assert!(files.csv.unwrap().exists());
    }

    #[test]
    fn merge_requires_a_readable_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let output = OutputConfig {
            dir: dir.path().to_path_buf(),
            dedupe_key: Some("patent_number".to_string()),
            merge_existing: Some(dir.path().join("missing.json")),
            ..OutputConfig::default()
        };
        let err = build_sink(&output, "src", started()).err().unwrap();
        assert!(err.to_string().contains("missing.json"));
    }

    #[test]
    fn summary_lists_pages_to_rerun() {
        let config = RunConfig::with_total_pages(3);
        let mut run = CollectionRun::new(
            config.planned_pages().unwrap(),
            started(),
            config.success_target(),
        );
        run.record(PageResult::collected(page(1), 1, vec![record(1, "US-1")]))
            .unwrap();
        run.record(PageResult::failed(
            page(2),
            3,
            PageFailure::new(FailureKind::Fetch, "timeout"),
        ))
        .unwrap();
        run.finish(RunStatus::Cancelled, Utc::now());

        let files = OutputFiles {
            records: PathBuf::from("out/x.json"),
            report: PathBuf::from("out/x_report.json"),
            csv: None,
        };
        let text = summary(&run, &files);
        assert!(text.contains("status: Cancelled"));
        assert!(text.contains("3 planned, 2 resolved, 1 failed, 1 not attempted"));
        assert!(text.contains("re-run with: --only-pages 2,3"));
        assert!(text.contains("success rate: 3.3%"));
        assert!(!text.contains("csv:"));
    }
}
