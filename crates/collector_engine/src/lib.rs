//! Collector engine: retry, pagination and persistence around pluggable
//! fetchers, extractors and sinks.
mod decode;
mod dedupe;
mod driver;
mod engine;
mod extract;
mod fetch;
mod filename;
mod persist;
mod progress;
mod rate_gate;
mod retry;
mod sink;
mod types;

pub use decode::{decode_body, DecodeError};
pub use dedupe::{dedupe_by_key, merge_records, MergeSummary};
pub use driver::{CollectError, Collector};
pub use engine::CollectorHandle;
pub use extract::{Extractor, FieldMapping, JsonRecordExtractor};
pub use fetch::{FetchSettings, PageFetcher, ReqwestPageFetcher};
pub use filename::dataset_stem;
pub use persist::{ensure_output_dir, AtomicFileWriter, PersistError};
pub use progress::{ChannelProgressSink, NullProgressSink, ProgressSink};
pub use rate_gate::RateGate;
pub use retry::{resolve_page, PageResolver, RetryPolicy};
pub use sink::{
    load_json_records, CsvSink, DedupSink, FanOutSink, JsonSink, RunReport, Sink, SinkError,
};
pub use tokio_util::sync::CancellationToken;
pub use types::{AttemptOutcome, FetchError, FetchFailureKind, ParseError, RawPage, RunEvent};
