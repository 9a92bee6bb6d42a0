//! Collector core: IO-free data model for paginated collection runs.
mod config;
mod outcome;
mod page;
mod record;
mod run;
mod view_model;

pub use config::{ConfigError, EmptyPagePolicy, RetryBackoff, RunConfig};
pub use outcome::{FailureKind, PageFailure, PageResult, PageStatus};
pub use page::PageIndex;
pub use record::{Record, RecordBuilder, RecordError, RESERVED_FIELDS};
pub use run::{CollectionRun, LedgerError, RunMetadata, RunStatus, SuccessTarget};
pub use view_model::ProgressSnapshot;
