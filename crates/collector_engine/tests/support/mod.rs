#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use collector_core::{PageIndex, Record, RunMetadata};
use collector_engine::{
    Extractor, FetchError, FetchFailureKind, PageFetcher, ParseError, ProgressSink, RawPage,
    RunEvent, Sink, SinkError,
};

pub fn page(n: u32) -> PageIndex {
    PageIndex::new(n).unwrap()
}

pub fn network_error() -> FetchError {
    FetchError::new(FetchFailureKind::Network, "connection reset")
}

type Script = dyn Fn(u32, u32) -> Result<String, FetchError> + Send + Sync;

/// Answers `script(page, attempt)` and counts attempts per page.
pub struct ScriptedFetcher {
    script: Box<Script>,
    latency: Option<Box<dyn Fn(u32) -> Duration + Send + Sync>>,
    attempts: Mutex<BTreeMap<u32, u32>>,
    in_flight: Mutex<(usize, usize)>,
}

impl ScriptedFetcher {
    pub fn new(script: impl Fn(u32, u32) -> Result<String, FetchError> + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
            latency: None,
            attempts: Mutex::new(BTreeMap::new()),
            in_flight: Mutex::new((0, 0)),
        }
    }

    pub fn with_latency(mut self, latency: impl Fn(u32) -> Duration + Send + Sync + 'static) -> Self {
        self.latency = Some(Box::new(latency));
        self
    }

    pub fn attempts(&self, page: u32) -> u32 {
        self.attempts.lock().unwrap().get(&page).copied().unwrap_or(0)
    }

    pub fn total_attempts(&self) -> u32 {
        self.attempts.lock().unwrap().values().sum()
    }

    pub fn max_in_flight(&self) -> usize {
        self.in_flight.lock().unwrap().1
    }
}

#[async_trait::async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch(&self, page: PageIndex) -> Result<RawPage, FetchError> {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let entry = attempts.entry(page.get()).or_insert(0);
            *entry += 1;
            *entry
        };
        {
            let mut in_flight = self.in_flight.lock().unwrap();
            in_flight.0 += 1;
            in_flight.1 = in_flight.1.max(in_flight.0);
        }
        if let Some(latency) = &self.latency {
            tokio::time::sleep(latency(page.get())).await;
        }
        self.in_flight.lock().unwrap().0 -= 1;
        (self.script)(page.get(), attempt).map(|body| RawPage::new(page, body))
    }
}

/// Body is a record count; anything else is a parse error.
pub struct CountExtractor;

impl Extractor for CountExtractor {
    fn extract(&self, raw: &RawPage) -> Result<Vec<Record>, ParseError> {
        let text = std::str::from_utf8(&raw.body).map_err(|e| ParseError::new(e.to_string()))?;
        let count: usize = text
            .trim()
            .parse()
            .map_err(|_| ParseError::new(format!("not a count: {text}")))?;
        Ok((0..count)
            .map(|i| {
                Record::builder(raw.page, raw.fetched_at)
                    .field("id", format!("{}-{}", raw.page, i))
                    .field("title", format!("Item {i} of page {}", raw.page))
                    .build()
                    .unwrap()
            })
            .collect())
    }
}

#[derive(Debug, Clone)]
pub struct PersistCall {
    pub records: Vec<Record>,
    pub failed_pages: Vec<PageIndex>,
    pub metadata: RunMetadata,
}

#[derive(Default)]
pub struct MemorySink {
    calls: Mutex<Vec<PersistCall>>,
    fail: bool,
}

impl MemorySink {
    pub fn failing() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn calls(&self) -> Vec<PersistCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl Sink for MemorySink {
    fn persist(
        &self,
        records: &[Record],
        failed_pages: &[PageIndex],
        metadata: &RunMetadata,
    ) -> Result<(), SinkError> {
        self.calls.lock().unwrap().push(PersistCall {
            records: records.to_vec(),
            failed_pages: failed_pages.to_vec(),
            metadata: metadata.clone(),
        });
        if self.fail {
            return Err(SinkError::Rejected("disk full".into()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<RunEvent>>,
}

impl RecordingProgress {
    pub fn events(&self) -> Vec<RunEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressSink for RecordingProgress {
    fn emit(&self, event: RunEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub fn init_logging() {
    collector_logging::initialize_for_tests();
}

pub fn arc<T>(value: T) -> Arc<T> {
    Arc::new(value)
}
