mod support;

use std::sync::Arc;
use std::time::Duration;

use collector_core::{RunConfig, RunStatus};
use collector_engine::{Collector, CollectorHandle, RunEvent};
use support::{arc, CountExtractor, MemorySink, ScriptedFetcher};

fn quick_config(total_pages: u32) -> RunConfig {
    RunConfig {
        retry_delay: Duration::from_millis(10),
        inter_page_delay: Duration::from_millis(20),
        ..RunConfig::with_total_pages(total_pages)
    }
}

fn wait_for(handle: &CollectorHandle, mut pred: impl FnMut(&RunEvent) -> bool) -> Vec<RunEvent> {
    let mut seen = Vec::new();
    while let Some(event) = handle.recv_timeout(Duration::from_secs(5)) {
        let done = pred(&event);
        seen.push(event);
        if done {
            return seen;
        }
    }
    panic!("event never arrived; saw {seen:?}");
}

#[test]
fn handle_streams_events_and_returns_the_run() {
    let sink = arc(MemorySink::default());
    let collector = Collector::new(
        arc(ScriptedFetcher::new(|_, _| Ok("2".into()))),
        Arc::new(CountExtractor),
        sink.clone(),
    );

    let handle = CollectorHandle::spawn(collector, quick_config(3));
    let events = wait_for(&handle, |event| matches!(event, RunEvent::Finished(_)));
    let started = events
        .iter()
        .filter(|event| matches!(event, RunEvent::PageStarted { .. }))
        .count();
    assert_eq!(started, 3);

    let run = handle.join().unwrap();
    assert_eq!(run.status(), RunStatus::Completed);
    assert_eq!(run.record_count(), 6);
    assert_eq!(sink.calls().len(), 1);
}

#[test]
fn cancelling_a_handle_keeps_partial_results() {
    let collector = Collector::new(
        arc(ScriptedFetcher::new(|_, _| Ok("1".into()))),
        Arc::new(CountExtractor),
        arc(MemorySink::default()),
    );

    let handle = CollectorHandle::spawn(collector, quick_config(50));
    wait_for(&handle, |event| matches!(event, RunEvent::PageResolved { .. }));
    handle.cancel();

    let run = handle.join().unwrap();
    assert_eq!(run.status(), RunStatus::Cancelled);
    assert!(run.resolved_count() >= 1);
    assert!(!run.not_attempted().is_empty());
    assert_eq!(run.record_count(), run.resolved_count());
}
