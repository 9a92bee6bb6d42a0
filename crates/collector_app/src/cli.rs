//! Command-line flags. Every flag is optional and overrides the matching
//! value from the `--config` file.

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser, ValueEnum};
use collector_core::EmptyPagePolicy;
use collector_logging::DEFAULT_LOG_FILE;
use log::LevelFilter;

/// Collect records from a paginated search, one page at a time.
///
/// Pages are fetched through a URL template (`{page}` and `{offset}` are
/// substituted), items are mapped to records with JSON pointers, and the
/// dataset is written as JSON (and CSV) with a failure report next to it.
#[derive(Parser, Debug)]
#[command(name = "page-collector")]
#[command(author, version, about)]
pub struct Args {
    /// RON file with `source`, `run` and `output` sections
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// URL template, e.g. `https://host/search?q=x&page={page}`
    #[arg(short, long, value_name = "TEMPLATE")]
    pub url: Option<String>,

    /// Results per page, used for `{offset}`
    #[arg(long)]
    pub page_size: Option<u32>,

    /// JSON pointer to the array of result items (empty for a top-level array)
    #[arg(long, value_name = "POINTER")]
    pub items_pointer: Option<String>,

    /// Record field as `name=/json/pointer` (repeatable); replaces configured fields
    #[arg(short, long = "field", value_name = "NAME=/POINTER")]
    pub fields: Vec<String>,

    /// JSON pointer to an item's tags
    #[arg(long, value_name = "POINTER")]
    pub tags_pointer: Option<String>,

    #[arg(long)]
    pub user_agent: Option<String>,

    /// Number of result pages
    #[arg(short = 'n', long)]
    pub pages: Option<u32>,

    /// Resume from this page (1-based)
    #[arg(long)]
    pub start_page: Option<u32>,

    /// Collect only these pages, e.g. `--only-pages 3,17,21`
    #[arg(long, value_delimiter = ',', value_name = "PAGES")]
    pub only_pages: Option<Vec<u32>>,

    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Seconds to wait before retrying a failed page
    #[arg(long, value_parser = parse_secs, value_name = "SECS")]
    pub retry_delay: Option<Duration>,

    /// Multiply the retry delay by the number of failed attempts
    #[arg(long)]
    pub linear_backoff: bool,

    /// How to treat pages that parse to zero records
    #[arg(long, value_enum)]
    pub empty_pages: Option<EmptyPages>,

    /// Seconds to wait between pages
    #[arg(long, value_parser = parse_secs, value_name = "SECS")]
    pub page_delay: Option<Duration>,

    /// Report progress every N resolved pages
    #[arg(long, value_name = "N")]
    pub checkpoint_every: Option<u32>,

    /// Write partial datasets at every checkpoint
    #[arg(long)]
    pub persist_checkpoints: bool,

    /// Pages in flight at once (1 = sequential)
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// Minimum seconds between any two requests
    #[arg(long, value_parser = parse_secs, value_name = "SECS")]
    pub min_interval: Option<Duration>,

    /// Cancel the run after this many seconds
    #[arg(long, value_parser = parse_secs, value_name = "SECS")]
    pub timeout: Option<Duration>,

    /// Expected number of records, for the success rate
    #[arg(long)]
    pub expected_records: Option<u64>,

    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Dataset filename prefix
    #[arg(long)]
    pub prefix: Option<String>,

    /// Skip the CSV export
    #[arg(long)]
    pub no_csv: bool,

    /// Drop records whose value of this field was already seen
    #[arg(long, value_name = "FIELD")]
    pub dedupe_key: Option<String>,

    /// Merge with an earlier JSON dataset (requires a dedupe key)
    #[arg(long, value_name = "FILE")]
    pub merge_existing: Option<PathBuf>,

    /// Print the effective configuration as RON and exit
    #[arg(long)]
    pub print_config: bool,

    /// Also write the log to a file (`./collector.log` when no path is given)
    #[arg(long, value_name = "FILE", num_args = 0..=1, default_missing_value = DEFAULT_LOG_FILE)]
    pub log_file: Option<PathBuf>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    pub fn log_level(&self) -> LevelFilter {
        if self.quiet {
            return LevelFilter::Error;
        }
        match self.verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EmptyPages {
    Accept,
    RetryThenAccept,
    RetryThenFail,
}

impl From<EmptyPages> for EmptyPagePolicy {
    fn from(value: EmptyPages) -> Self {
        match value {
            EmptyPages::Accept => EmptyPagePolicy::Accept,
            EmptyPages::RetryThenAccept => EmptyPagePolicy::RetryThenAccept,
            EmptyPages::RetryThenFail => EmptyPagePolicy::RetryThenFail,
        }
    }
}

fn parse_secs(value: &str) -> Result<Duration, String> {
    let secs: f64 = value
        .parse()
        .map_err(|_| format!("`{value}` is not a number of seconds"))?;
    Duration::try_from_secs_f64(secs).map_err(|err| format!("`{value}`: {err}"))
}
