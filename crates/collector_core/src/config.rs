use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::run::SuccessTarget;
use crate::PageIndex;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("total pages must be at least 1")]
    NoPages,
    #[error("max attempts per page must be at least 1")]
    NoAttempts,
    #[error("checkpoint interval must be at least 1")]
    ZeroCheckpointInterval,
    #[error("concurrency must be at least 1")]
    ZeroConcurrency,
    #[error("start page {start} is outside 1..={total}")]
    StartPageOutOfRange { start: u32, total: u32 },
    #[error("page 0 is not a valid page index")]
    ZeroPageIndex,
    #[error("page {0} is listed more than once")]
    DuplicatePage(u32),
    #[error("page {page} is outside 1..={total}")]
    PageOutOfRange { page: u32, total: u32 },
}

/// What the retry loop does with a fetch that parsed to zero records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyPagePolicy {
    /// Accept immediately as a successful page with no records.
    #[default]
    Accept,
    /// Retry; if every attempt is empty, accept with no records.
    RetryThenAccept,
    /// Retry; if every attempt is empty, the page fails.
    RetryThenFail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryBackoff {
    /// Same delay before every retry.
    #[default]
    Fixed,
    /// Delay grows with the number of failed attempts: `delay * attempt`.
    Linear,
}

impl RetryBackoff {
    /// Delay to wait after the `failed_attempt`-th (1-based) attempt failed.
    pub fn delay_after(self, base: Duration, failed_attempt: u32) -> Duration {
        match self {
            RetryBackoff::Fixed => base,
            RetryBackoff::Linear => base.saturating_mul(failed_attempt.max(1)),
        }
    }
}

/// Parameters of one collection run. Every value can be overridden.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub total_pages: u32,
    pub start_page: u32,
    /// Restricts the run to these pages, e.g. the failures of an earlier run.
    pub only_pages: Option<Vec<u32>>,
    pub max_attempts_per_page: u32,
    #[serde(with = "duration_secs")]
    pub retry_delay: Duration,
    pub retry_backoff: RetryBackoff,
    #[serde(with = "duration_secs")]
    pub inter_page_delay: Duration,
    pub checkpoint_interval: u32,
    pub empty_page_policy: EmptyPagePolicy,
    /// Pages in flight at once; 1 runs pages strictly one after another.
    pub concurrency: usize,
    /// Minimum spacing between any two fetches across all workers.
    #[serde(with = "duration_secs")]
    pub min_request_interval: Duration,
    #[serde(with = "option_duration_secs")]
    pub run_timeout: Option<Duration>,
    /// Hand the partial record list to the sink at every checkpoint.
    pub persist_checkpoints: bool,
    pub expected_records: Option<u64>,
    pub records_per_page_estimate: u32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            total_pages: 10,
            start_page: 1,
            only_pages: None,
            max_attempts_per_page: 3,
            retry_delay: Duration::from_secs(5),
            retry_backoff: RetryBackoff::Fixed,
            inter_page_delay: Duration::from_secs(2),
            checkpoint_interval: 5,
            empty_page_policy: EmptyPagePolicy::Accept,
            concurrency: 1,
            min_request_interval: Duration::ZERO,
            run_timeout: None,
            persist_checkpoints: false,
            expected_records: None,
            records_per_page_estimate: 10,
        }
    }
}

impl RunConfig {
    pub fn with_total_pages(total_pages: u32) -> Self {
        Self {
            total_pages,
            ..Self::default()
        }
    }

    /// Checks the configuration; nothing may be fetched when this fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts_per_page == 0 {
            return Err(ConfigError::NoAttempts);
        }
        if self.checkpoint_interval == 0 {
            return Err(ConfigError::ZeroCheckpointInterval);
        }
        if self.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        match &self.only_pages {
            Some(pages) => {
                if pages.is_empty() {
                    return Err(ConfigError::NoPages);
                }
                let mut seen = BTreeSet::new();
                for &page in pages {
                    if page == 0 {
                        return Err(ConfigError::ZeroPageIndex);
                    }
                    if page > self.total_pages {
                        return Err(ConfigError::PageOutOfRange {
                            page,
                            total: self.total_pages,
                        });
                    }
                    if !seen.insert(page) {
                        return Err(ConfigError::DuplicatePage(page));
                    }
                }
            }
            None => {
                if self.total_pages == 0 {
                    return Err(ConfigError::NoPages);
                }
                if self.start_page == 0 || self.start_page > self.total_pages {
                    return Err(ConfigError::StartPageOutOfRange {
                        start: self.start_page,
                        total: self.total_pages,
                    });
                }
            }
        }
        Ok(())
    }

    /// Pages this run will visit, in ascending order.
    pub fn planned_pages(&self) -> Result<Vec<PageIndex>, ConfigError> {
        self.validate()?;
        let pages = match &self.only_pages {
            Some(pages) => {
                let mut pages: Vec<PageIndex> =
                    pages.iter().filter_map(|&p| PageIndex::new(p)).collect();
                pages.sort_unstable();
                pages
            }
            None => {
                let start = PageIndex::new(self.start_page).ok_or(ConfigError::ZeroPageIndex)?;
                let end = PageIndex::new(self.total_pages).ok_or(ConfigError::NoPages)?;
                PageIndex::range_inclusive(start, end).collect()
            }
        };
        Ok(pages)
    }

    pub fn success_target(&self) -> SuccessTarget {
        SuccessTarget {
            expected_records: self.expected_records,
            records_per_page_estimate: self.records_per_page_estimate,
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

mod option_duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&duration.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<f64>::deserialize(deserializer)?
            .map(|secs| Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_the_documented_policy() {
        let config = RunConfig::default();
        assert_eq!(config.max_attempts_per_page, 3);
        assert_eq!(config.retry_delay, Duration::from_secs(5));
        assert_eq!(config.inter_page_delay, Duration::from_secs(2));
        assert_eq!(config.checkpoint_interval, 5);
        assert_eq!(config.empty_page_policy, EmptyPagePolicy::Accept);
    }

    #[test]
    fn linear_backoff_scales_with_attempt() {
        let base = Duration::from_secs(3);
        assert_eq!(RetryBackoff::Fixed.delay_after(base, 2), base);
        assert_eq!(
            RetryBackoff::Linear.delay_after(base, 2),
            Duration::from_secs(6)
        );
    }
}
