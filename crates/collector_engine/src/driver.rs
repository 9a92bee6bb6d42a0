use std::sync::Arc;

use chrono::Utc;
use collector_core::{
    CollectionRun, ConfigError, FailureKind, LedgerError, PageIndex, PageResult, RunConfig,
    RunStatus,
};
use collector_logging::{collector_error, collector_info, collector_warn};
use futures_util::{future, stream, StreamExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::progress::{NullProgressSink, ProgressSink};
use crate::rate_gate::RateGate;
use crate::retry::{PageResolver, RetryPolicy};
use crate::sink::{Sink, SinkError};
use crate::{Extractor, PageFetcher, RunEvent};

/// Errors that end a run. Page-level failures never surface here.
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error("invalid run configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to persist collected records: {source}")]
    Sink {
        source: SinkError,
        /// Everything collected so far, kept for another persistence attempt.
        run: Box<CollectionRun>,
    },
    #[error("ledger rejected a page result: {0}")]
    Ledger(#[from] LedgerError),
    #[error("collector worker failed: {0}")]
    Worker(String),
}

impl CollectError {
    /// The in-memory run, when the error happened after collection.
    pub fn into_run(self) -> Option<CollectionRun> {
        match self {
            CollectError::Sink { run, .. } => Some(*run),
            _ => None,
        }
    }
}

/// Pagination driver: walks the planned pages, resolves each through the
/// retry loop and commits results to the run's ledger.
#[derive(Clone)]
pub struct Collector {
    fetcher: Arc<dyn PageFetcher>,
    extractor: Arc<dyn Extractor>,
    sink: Arc<dyn Sink>,
    progress: Arc<dyn ProgressSink>,
}

impl Collector {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        extractor: Arc<dyn Extractor>,
        sink: Arc<dyn Sink>,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            sink,
            progress: Arc::new(NullProgressSink),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Runs a full collection and hands the result to the sink once.
    ///
    /// Cancellation (explicit or via `run_timeout`) stops dispatching pages;
    /// the partial run is still persisted and returned with status
    /// [`RunStatus::Cancelled`].
    pub async fn collect(
        &self,
        config: &RunConfig,
        cancel: CancellationToken,
    ) -> Result<CollectionRun, CollectError> {
        let planned = config.planned_pages()?;
        let mut run = CollectionRun::new(planned.clone(), Utc::now(), config.success_target());
        collector_info!(
            "collecting {} pages ({} attempts each, concurrency {})",
            planned.len(),
            config.max_attempts_per_page,
            config.concurrency
        );

        let cancel = cancel.child_token();
        let _timeout_guard = config.run_timeout.map(|timeout| {
            let stop = CancellationToken::new();
            let run_cancel = cancel.clone();
            let timer_stop = stop.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = timer_stop.cancelled() => {}
                    _ = tokio::time::sleep(timeout) => {
                        collector_warn!("run timeout of {:?} reached", timeout);
                        run_cancel.cancel();
                    }
                }
            });
            stop.drop_guard()
        });

        let gate = RateGate::new(config.min_request_interval);
        let resolver = PageResolver::new(
            self.fetcher.as_ref(),
            self.extractor.as_ref(),
            RetryPolicy::from_config(config),
            &gate,
            &cancel,
            self.progress.as_ref(),
        );
        let started = Instant::now();

        if config.concurrency <= 1 {
            self.run_sequential(&mut run, &planned, &resolver, config, &cancel, started)
                .await?;
        } else {
            self.run_parallel(&mut run, &planned, &resolver, config, &cancel, started)
                .await?;
        }

        let interrupted = run.page_results().any(|result| {
            result
                .failure()
                .is_some_and(|failure| failure.kind == FailureKind::Cancelled)
        });
        let status = if run.is_complete() && !interrupted {
            RunStatus::Completed
        } else {
            collector_warn!(
                "run cancelled after {}/{} pages",
                run.resolved_count(),
                planned.len()
            );
            self.progress.emit(RunEvent::Cancelled {
                pages_resolved: run.resolved_count(),
                pages_planned: planned.len(),
            });
            RunStatus::Cancelled
        };
        run.finish(status, Utc::now());
        self.persist_final(run)
    }

    async fn run_sequential(
        &self,
        run: &mut CollectionRun,
        planned: &[PageIndex],
        resolver: &PageResolver<'_>,
        config: &RunConfig,
        cancel: &CancellationToken,
        started: Instant,
    ) -> Result<(), CollectError> {
        for (position, &page) in planned.iter().enumerate() {
            if cancel.is_cancelled() {
                break;
            }
            self.progress.emit(RunEvent::PageStarted { page });
            let result = resolver.resolve(page).await;
            self.commit(run, result, config, started)?;

            let is_last = position + 1 == planned.len();
            if !is_last && !config.inter_page_delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(config.inter_page_delay) => {}
                }
            }
        }
        Ok(())
    }

    /// Up to `concurrency` pages in flight. Results are committed one at a
    /// time as they complete; the ledger keeps them in page order.
    async fn run_parallel(
        &self,
        run: &mut CollectionRun,
        planned: &[PageIndex],
        resolver: &PageResolver<'_>,
        config: &RunConfig,
        cancel: &CancellationToken,
        started: Instant,
    ) -> Result<(), CollectError> {
        let last_page = planned.last().copied();
        let progress = self.progress.as_ref();
        let results = stream::iter(planned.iter().copied())
            .take_while(|_| future::ready(!cancel.is_cancelled()))
            .map(|page| async move {
                progress.emit(RunEvent::PageStarted { page });
                let result = resolver.resolve(page).await;
                if Some(page) != last_page && !config.inter_page_delay.is_zero() {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = tokio::time::sleep(config.inter_page_delay) => {}
                    }
                }
                result
            })
            .buffer_unordered(config.concurrency);
        futures_util::pin_mut!(results);

        while let Some(result) = results.next().await {
            self.commit(run, result, config, started)?;
        }
        Ok(())
    }

    fn commit(
        &self,
        run: &mut CollectionRun,
        result: PageResult,
        config: &RunConfig,
        started: Instant,
    ) -> Result<(), CollectError> {
        let page = result.page();
        match result.failure() {
            None => collector_info!(
                "page {}: {} records after {} attempt(s)",
                page,
                result.record_count(),
                result.attempts()
            ),
            Some(failure) => collector_warn!(
                "page {} failed after {} attempt(s): {}",
                page,
                result.attempts(),
                failure
            ),
        }
        self.progress.emit(RunEvent::PageResolved {
            page,
            attempts: result.attempts(),
            records: result.record_count(),
            failure: result.failure().cloned(),
        });
        run.record(result)?;

        let interval = config.checkpoint_interval.max(1) as usize;
        if run.resolved_count() % interval == 0 {
            let snapshot = run.progress(started.elapsed());
            collector_info!("checkpoint: {}", snapshot);
            self.progress.emit(RunEvent::Checkpoint(snapshot));
            if config.persist_checkpoints {
                let records = run.records_for_persistence();
                if let Err(err) =
                    self.sink
                        .persist(&records, &run.failed_page_indices(), &run.metadata())
                {
                    collector_warn!("checkpoint persistence failed: {}", err);
                }
            }
        }
        Ok(())
    }

    fn persist_final(&self, run: CollectionRun) -> Result<CollectionRun, CollectError> {
        let records = run.records_for_persistence();
        let failed = run.failed_page_indices();
        let metadata = run.metadata();
        if let Err(source) = self.sink.persist(&records, &failed, &metadata) {
            collector_error!("failed to persist {} records: {}", records.len(), source);
            return Err(CollectError::Sink {
                source,
                run: Box::new(run),
            });
        }
        collector_info!(
            "run finished: {} records, {} failed pages, {} not attempted",
            metadata.total_records,
            metadata.failed_pages.len(),
            metadata.not_attempted_pages.len()
        );
        self.progress.emit(RunEvent::Finished(metadata));
        Ok(run)
    }
}
