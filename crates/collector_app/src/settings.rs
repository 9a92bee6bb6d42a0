//! Run settings: an optional RON file overlaid with command-line flags.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use collector_core::{RetryBackoff, RunConfig};
use collector_engine::{FetchSettings, FieldMapping, JsonRecordExtractor};
use serde::{Deserialize, Serialize};

use crate::cli::Args;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub source: SourceConfig,
    pub run: RunConfig,
    pub output: OutputConfig,
}

/// Where pages come from and how items become records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub url_template: String,
    pub page_size: u32,
    pub items_pointer: String,
    /// `name=/json/pointer` entries.
    pub fields: Vec<String>,
    pub tags_pointer: Option<String>,
    pub user_agent: Option<String>,
    pub request_timeout_secs: f64,
    pub max_bytes: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        let fetch = FetchSettings::default();
        Self {
            url_template: String::new(),
            page_size: fetch.page_size,
            items_pointer: String::new(),
            fields: Vec::new(),
            tags_pointer: None,
            user_agent: None,
            request_timeout_secs: fetch.request_timeout.as_secs_f64(),
            max_bytes: fetch.max_bytes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub prefix: String,
    pub csv: bool,
    pub dedupe_key: Option<String>,
    pub merge_existing: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output"),
            prefix: "dataset".to_string(),
            csv: true,
            dedupe_key: None,
            merge_existing: None,
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        ron::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    /// Config file (if any) with the command-line overrides applied.
    pub fn from_args(args: &Args) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_args(args);
        Ok(config)
    }

    pub fn apply_args(&mut self, args: &Args) {
        let source = &mut self.source;
        if let Some(url) = &args.url {
            source.url_template = url.clone();
        }
        if let Some(size) = args.page_size {
            source.page_size = size;
        }
        if let Some(pointer) = &args.items_pointer {
            source.items_pointer = pointer.clone();
        }
        if !args.fields.is_empty() {
            source.fields = args.fields.clone();
        }
        if let Some(pointer) = &args.tags_pointer {
            source.tags_pointer = Some(pointer.clone());
        }
        if let Some(agent) = &args.user_agent {
            source.user_agent = Some(agent.clone());
        }

        let run = &mut self.run;
        if let Some(pages) = args.pages {
            run.total_pages = pages;
        }
        if let Some(start) = args.start_page {
            run.start_page = start;
        }
        if let Some(pages) = &args.only_pages {
            run.only_pages = Some(pages.clone());
        }
        if let Some(attempts) = args.max_attempts {
            run.max_attempts_per_page = attempts;
        }
        if let Some(delay) = args.retry_delay {
            run.retry_delay = delay;
        }
        if args.linear_backoff {
            run.retry_backoff = RetryBackoff::Linear;
        }
        if let Some(policy) = args.empty_pages {
            run.empty_page_policy = policy.into();
        }
        if let Some(delay) = args.page_delay {
            run.inter_page_delay = delay;
        }
        if let Some(every) = args.checkpoint_every {
            run.checkpoint_interval = every;
        }
        if args.persist_checkpoints {
            run.persist_checkpoints = true;
        }
        if let Some(concurrency) = args.concurrency {
            run.concurrency = concurrency;
        }
        if let Some(interval) = args.min_interval {
            run.min_request_interval = interval;
        }
        if let Some(timeout) = args.timeout {
            run.run_timeout = Some(timeout);
        }
        if let Some(expected) = args.expected_records {
            run.expected_records = Some(expected);
        }

        let output = &mut self.output;
        if let Some(dir) = &args.output_dir {
            output.dir = dir.clone();
        }
        if let Some(prefix) = &args.prefix {
            output.prefix = prefix.clone();
        }
        if args.no_csv {
            output.csv = false;
        }
        if let Some(key) = &args.dedupe_key {
            output.dedupe_key = Some(key.clone());
        }
        if let Some(path) = &args.merge_existing {
            output.merge_existing = Some(path.clone());
        }
    }

    /// Rejects settings the engine would fail on, before anything is fetched.
    pub fn validate(&self) -> Result<()> {
        let template = &self.source.url_template;
        if template.is_empty() {
            bail!("no URL template given (use --url or `source.url_template`)");
        }
        if !template.contains("{page}") && !template.contains("{offset}") {
            bail!("URL template `{template}` has no {{page}} or {{offset}} placeholder");
        }
        if self.source.fields.is_empty() {
            bail!("no record fields given (use --field name=/pointer)");
        }
        if self.output.merge_existing.is_some() && self.output.dedupe_key.is_none() {
            bail!("merging with an existing dataset needs a dedupe key");
        }
        self.run.validate().context("invalid run settings")?;
        Ok(())
    }
}

impl SourceConfig {
    pub fn fetch_settings(&self) -> Result<FetchSettings> {
        let request_timeout = Duration::try_from_secs_f64(self.request_timeout_secs)
            .context("request timeout must be a non-negative number of seconds")?;
        Ok(FetchSettings {
            page_size: self.page_size,
            user_agent: self.user_agent.clone(),
            request_timeout,
            max_bytes: self.max_bytes,
            ..FetchSettings::for_template(self.url_template.clone())
        })
    }

    pub fn extractor(&self) -> Result<JsonRecordExtractor> {
        let fields = self
            .fields
            .iter()
            .map(|field| field.parse::<FieldMapping>().map_err(anyhow::Error::msg))
            .collect::<Result<Vec<_>>>()?;
        let extractor = JsonRecordExtractor::new(self.items_pointer.clone(), fields);
        Ok(match &self.tags_pointer {
            Some(pointer) => extractor.with_tags(pointer.clone()),
            None => extractor,
        })
    }
}
