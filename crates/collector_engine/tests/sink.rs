mod support;

use std::fs;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use collector_core::{PageIndex, Record, RunMetadata, RunStatus};
use collector_engine::{
    load_json_records, CsvSink, DedupSink, FanOutSink, JsonSink, RunReport, Sink,
};
use pretty_assertions::assert_eq;
use support::{page, MemorySink};

fn record(page_no: u32, number: &str, title: &str) -> Record {
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    Record::builder(page(page_no), at)
        .field("patent_number", number)
        .field("title", title)
        .tag("solar")
        .build()
        .unwrap()
}

fn metadata(status: RunStatus, total_records: usize, failed_pages: Vec<PageIndex>) -> RunMetadata {
    RunMetadata {
        started_at: Utc.with_ymd_and_hms(2024, 5, 1, 11, 0, 0).unwrap(),
        finished_at: (status != RunStatus::InProgress)
            .then(|| Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap()),
        status,
        pages_planned: 3,
        pages_attempted: 3,
        total_records,
        failed_pages,
        not_attempted_pages: Vec::new(),
        success_rate: Some(0.5),
    }
}

#[test]
fn json_sink_round_trips_records_and_writes_a_report() {
    let dir = tempfile::tempdir().unwrap();
    let sink = JsonSink::new(dir.path().to_path_buf(), "patents_20240501_120000");
    let records = vec![
        record(1, "US-1", "Panel"),
        record(1, "US-2", "Inverter, \"hybrid\""),
        record(3, "US-3", ""),
    ];

    sink.persist(
        &records,
        &[page(2)],
        &metadata(RunStatus::Completed, 3, vec![page(2)]),
    )
    .unwrap();

    assert_eq!(
        sink.records_path(),
        dir.path().join("patents_20240501_120000.json")
    );
    let reloaded = load_json_records(&sink.records_path()).unwrap();
    assert_eq!(reloaded, records);

    let report: RunReport =
        serde_json::from_slice(&fs::read(sink.report_path()).unwrap()).unwrap();
    assert_eq!(report.failed_pages, vec![page(2)]);
    assert_eq!(report.records_written, 3);
    assert_eq!(report.metadata.status, RunStatus::Completed);
}

#[test]
fn json_records_carry_provenance_next_to_fields() {
    let dir = tempfile::tempdir().unwrap();
    let sink = JsonSink::new(dir.path().to_path_buf(), "flat");
    sink.persist(
        &[record(4, "US-9", "Cell")],
        &[],
        &metadata(RunStatus::Completed, 1, Vec::new()),
    )
    .unwrap();

    let value: serde_json::Value =
        serde_json::from_slice(&fs::read(sink.records_path()).unwrap()).unwrap();
    let first = &value[0];
    assert_eq!(first["source_page"], 4);
    assert_eq!(first["patent_number"], "US-9");
    assert_eq!(first["tags"][0], "solar");
    assert!(first["collected_at"].as_str().unwrap().starts_with("2024-05-01T12:00:00"));
}

#[test]
fn checkpoint_writes_do_not_touch_the_final_files() {
    let dir = tempfile::tempdir().unwrap();
    let sink = JsonSink::new(dir.path().to_path_buf(), "run");
    sink.persist(
        &[record(1, "US-1", "Panel")],
        &[],
        &metadata(RunStatus::InProgress, 1, Vec::new()),
    )
    .unwrap();

    assert!(dir.path().join("run_checkpoint.json").exists());
    assert!(dir.path().join("run_checkpoint_report.json").exists());
    assert!(!sink.records_path().exists());
}

#[test]
fn json_sink_creates_missing_output_directory() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("out").join("patents");
    let sink = JsonSink::new(nested.clone(), "run");
    sink.persist(&[], &[], &metadata(RunStatus::Cancelled, 0, Vec::new()))
        .unwrap();
    assert!(load_json_records(&nested.join("run.json")).unwrap().is_empty());
}

#[test]
fn csv_sink_writes_header_and_blank_missing_fields() {
    let dir = tempfile::tempdir().unwrap();
    let sink = CsvSink::new(dir.path().to_path_buf(), "patents");
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let sparse = Record::builder(page(2), at)
        .field("patent_number", "US-7")
        .build()
        .unwrap();
    let records = vec![record(1, "US-1", "Panel, large"), sparse];

    sink.persist(&records, &[], &metadata(RunStatus::Completed, 2, Vec::new()))
        .unwrap();

    let text = fs::read_to_string(sink.path()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines[0],
        "source_page,collected_at,patent_number,title,tags"
    );
    assert_eq!(
        lines[1],
        "1,2024-05-01T12:00:00+00:00,US-1,\"Panel, large\",solar"
    );
    assert_eq!(lines[2], "2,2024-05-01T12:00:00+00:00,US-7,,");
}

#[test]
fn fan_out_reaches_every_sink_and_reports_the_failure() {
    let failing = Arc::new(MemorySink::failing());
    let healthy = Arc::new(MemorySink::default());
    let mut fan_out = FanOutSink::new(vec![failing.clone() as Arc<dyn Sink>]);
    fan_out.push(healthy.clone());

    let err = fan_out
        .persist(
            &[record(1, "US-1", "Panel")],
            &[],
            &metadata(RunStatus::Completed, 1, Vec::new()),
        )
        .unwrap_err();

    assert!(err.to_string().contains("disk full"));
    assert_eq!(failing.calls().len(), 1);
    assert_eq!(healthy.calls().len(), 1);
}

#[test]
fn dedup_sink_merges_with_an_earlier_dataset() {
    let inner = Arc::new(MemorySink::default());
    let sink = DedupSink::new(inner.clone(), "patent_number")
        .with_existing(vec![record(1, "US-1", "Panel"), record(2, "US-2", "Cell")]);

    sink.persist(
        &[
            record(16, "US-2", "Cell (again)"),
            record(16, "US-3", "Tracker"),
            record(17, "US-3", "Tracker"),
        ],
        &[],
        &metadata(RunStatus::Completed, 3, Vec::new()),
    )
    .unwrap();

    let calls = inner.calls();
    let numbers: Vec<&str> = calls[0]
        .records
        .iter()
        .map(|r| r.field("patent_number").unwrap())
        .collect();
    assert_eq!(numbers, vec!["US-1", "US-2", "US-3"]);
    assert_eq!(calls[0].records[1].field("title"), Some("Cell"));
}
