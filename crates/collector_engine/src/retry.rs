//! Bounded per-page retry loop.
//!
//! One page is fetched and extracted up to `max_attempts` times. Fetch and
//! parse errors are both retried after the configured delay; a page with zero
//! records follows the run's [`EmptyPagePolicy`]. The loop ends on the first
//! accepted attempt, on exhaustion, or when cancellation is observed between
//! attempts.

use std::time::Duration;

use collector_core::{
    EmptyPagePolicy, FailureKind, PageFailure, PageIndex, PageResult, RetryBackoff, RunConfig,
};
use collector_logging::{collector_debug, collector_warn};
use tokio_util::sync::CancellationToken;

use crate::progress::{NullProgressSink, ProgressSink};
use crate::rate_gate::RateGate;
use crate::{AttemptOutcome, Extractor, PageFetcher, ParseError, RunEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub backoff: RetryBackoff,
    pub empty_page: EmptyPagePolicy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RunConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            max_attempts: config.max_attempts_per_page.max(1),
            retry_delay: config.retry_delay,
            backoff: config.retry_backoff,
            empty_page: config.empty_page_policy,
        }
    }

    /// Wait before the attempt following failed attempt `failed_attempt`.
    pub fn delay_after(&self, failed_attempt: u32) -> Duration {
        self.backoff.delay_after(self.retry_delay, failed_attempt)
    }
}

/// Resolves single pages against one fetcher/extractor pair.
pub struct PageResolver<'a> {
    fetcher: &'a dyn PageFetcher,
    extractor: &'a dyn Extractor,
    policy: RetryPolicy,
    gate: &'a RateGate,
    cancel: &'a CancellationToken,
    progress: &'a dyn ProgressSink,
}

impl<'a> PageResolver<'a> {
    pub fn new(
        fetcher: &'a dyn PageFetcher,
        extractor: &'a dyn Extractor,
        policy: RetryPolicy,
        gate: &'a RateGate,
        cancel: &'a CancellationToken,
        progress: &'a dyn ProgressSink,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            policy,
            gate,
            cancel,
            progress,
        }
    }

    pub async fn resolve(&self, page: PageIndex) -> PageResult {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_failure = PageFailure::new(FailureKind::Fetch, "no attempt made");

        for attempt in 1..=max_attempts {
            collector_debug!("page {} attempt {}/{}", page, attempt, max_attempts);
            self.gate.acquire().await;

            let failure = match self.attempt(page).await {
                AttemptOutcome::Success(records) => {
                    return PageResult::collected(page, attempt, records);
                }
                AttemptOutcome::Empty => {
                    if self.policy.empty_page == EmptyPagePolicy::Accept {
                        return PageResult::collected(page, attempt, Vec::new());
                    }
                    PageFailure::new(FailureKind::EmptyPage, "no records extracted")
                }
                AttemptOutcome::FetchError(err) => {
                    PageFailure::new(FailureKind::Fetch, err.to_string())
                }
                AttemptOutcome::ParseError(err) => {
                    PageFailure::new(FailureKind::Parse, err.to_string())
                }
            };

            let retry_in = (attempt < max_attempts).then(|| self.policy.delay_after(attempt));
            collector_warn!(
                "page {} attempt {}/{} failed: {}",
                page,
                attempt,
                max_attempts,
                failure
            );
            self.progress.emit(RunEvent::AttemptFailed {
                page,
                attempt,
                max_attempts,
                failure: failure.clone(),
                retry_in,
            });
            last_failure = failure;

            if let Some(delay) = retry_in {
                let interrupted = tokio::select! {
                    _ = self.cancel.cancelled() => true,
                    _ = tokio::time::sleep(delay) => self.cancel.is_cancelled(),
                };
                if interrupted {
                    return PageResult::failed(
                        page,
                        attempt,
                        PageFailure::new(
                            FailureKind::Cancelled,
                            format!("cancelled after {}", last_failure),
                        ),
                    );
                }
            }
        }

        if last_failure.kind == FailureKind::EmptyPage
            && self.policy.empty_page == EmptyPagePolicy::RetryThenAccept
        {
            return PageResult::collected(page, max_attempts, Vec::new());
        }
        PageResult::failed(page, max_attempts, last_failure)
    }

    async fn attempt(&self, page: PageIndex) -> AttemptOutcome {
        let raw = match self.fetcher.fetch(page).await {
            Ok(raw) => raw,
            Err(err) => return AttemptOutcome::FetchError(err),
        };
        match self.extractor.extract(&raw) {
            Err(err) => AttemptOutcome::ParseError(err),
            Ok(records) if records.is_empty() => AttemptOutcome::Empty,
            Ok(records) => {
                if let Some(stray) = records.iter().find(|r| r.source_page() != page) {
                    return AttemptOutcome::ParseError(ParseError::new(format!(
                        "record claims page {} while page {} was fetched",
                        stray.source_page(),
                        page
                    )));
                }
                AttemptOutcome::Success(records)
            }
        }
    }
}

/// Resolves one page with no rate gate, cancellation or progress reporting.
pub async fn resolve_page(
    page: PageIndex,
    fetcher: &dyn PageFetcher,
    extractor: &dyn Extractor,
    policy: RetryPolicy,
) -> PageResult {
    let gate = RateGate::disabled();
    let cancel = CancellationToken::new();
    PageResolver::new(fetcher, extractor, policy, &gate, &cancel, &NullProgressSink)
        .resolve(page)
        .await
}
