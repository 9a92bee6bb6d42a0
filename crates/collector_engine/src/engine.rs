use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use collector_core::{CollectionRun, RunConfig};
use tokio_util::sync::CancellationToken;

use crate::driver::{CollectError, Collector};
use crate::progress::ChannelProgressSink;
use crate::RunEvent;

/// A collection running on its own thread and tokio runtime.
///
/// Progress arrives as [`RunEvent`]s over a channel; the final run (or the
/// fatal error) is returned by [`CollectorHandle::join`].
pub struct CollectorHandle {
    cancel: CancellationToken,
    event_rx: mpsc::Receiver<RunEvent>,
    worker: thread::JoinHandle<Result<CollectionRun, CollectError>>,
}

impl CollectorHandle {
    pub fn spawn(collector: Collector, config: RunConfig) -> Self {
        let (event_tx, event_rx) = mpsc::channel();
        let cancel = CancellationToken::new();
        let collector = collector.with_progress(Arc::new(ChannelProgressSink::new(event_tx)));
        let run_cancel = cancel.clone();

        let worker = thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(|err| CollectError::Worker(format!("tokio runtime: {err}")))?;
            runtime.block_on(collector.collect(&config, run_cancel))
        });

        Self {
            cancel,
            event_rx,
            worker,
        }
    }

    /// Stops dispatching new pages; in-flight attempts finish.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn try_recv(&self) -> Option<RunEvent> {
        self.event_rx.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<RunEvent> {
        self.event_rx.recv_timeout(timeout).ok()
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Waits for the run to end.
    pub fn join(self) -> Result<CollectionRun, CollectError> {
        self.worker
            .join()
            .map_err(|_| CollectError::Worker("collector thread panicked".into()))?
    }
}
