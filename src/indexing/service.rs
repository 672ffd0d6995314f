//! Background scan runner
//!
//! At most one scan runs per service. Starting a new scan cancels the running
//! one and detaches its progress sink, so stale events never reach the new
//! subscriber.

use crate::error::{IndexError, IndexResult};
use crate::indexing::progress::{ProgressSink, ScanEvent, ScanReport};
use crate::indexing::scan::{ScanCoordinator, ScanOptions};
use crate::storage::SimilarityIndexStore;
use crate::types::IndexScope;
use crate::vector::EmbeddingProvider;
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

struct RunningScan {
    cancel: CancellationToken,
    sink: ProgressSink,
    handle: JoinHandle<IndexResult<ScanReport>>,
}

pub struct ScanService<S, P> {
    store: Arc<Mutex<S>>,
    provider: Arc<P>,
    current: Option<RunningScan>,
}

impl<S, P> ScanService<S, P>
where
    S: SimilarityIndexStore + 'static,
    P: EmbeddingProvider + 'static,
{
    pub fn new(store: Arc<Mutex<S>>, provider: Arc<P>) -> Self {
        Self {
            store,
            provider,
            current: None,
        }
    }

    pub fn store(&self) -> &Arc<Mutex<S>> {
        &self.store
    }

    /// Starts a scan on a worker thread, superseding any scan in flight.
    ///
    /// The superseded scan keeps the store lock until it observes its
    /// cancellation, so the new scan starts on a consistent store.
    pub fn start(
        &mut self,
        scope: IndexScope,
        options: ScanOptions,
        events: Option<Sender<ScanEvent>>,
    ) -> IndexResult<CancellationToken> {
        if let Some(previous) = self.current.take() {
            debug!("Superseding running scan");
            previous.sink.detach();
            previous.cancel.cancel();
        }

        let cancel = CancellationToken::new();
        let sink = events.map(ProgressSink::new).unwrap_or_default();
        let coordinator = ScanCoordinator::new(scope, options).with_progress(sink.clone());

        let store = Arc::clone(&self.store);
        let provider = Arc::clone(&self.provider);
        let token = cancel.clone();
        let handle = thread::Builder::new()
            .name("semdex-scan".to_string())
            .spawn(move || {
                let mut store = store.lock();
                info!("Scan of {} started", coordinator.scope());
                coordinator.run(&mut *store, provider.as_ref(), &token)
            })
            .map_err(|e| IndexError::WorkerFailed {
                reason: format!("failed to spawn scan thread: {e}"),
            })?;

        self.current = Some(RunningScan {
            cancel: cancel.clone(),
            sink,
            handle,
        });
        Ok(cancel)
    }

    /// Requests cancellation of the running scan, if any.
    pub fn cancel(&self) {
        if let Some(running) = &self.current {
            running.cancel.cancel();
        }
    }

    pub fn is_running(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    /// Blocks until the current scan ends and returns its report.
    pub fn wait(&mut self) -> IndexResult<Option<ScanReport>> {
        let Some(running) = self.current.take() else {
            return Ok(None);
        };
        let report = running
            .handle
            .join()
            .map_err(|_| IndexError::WorkerFailed {
                reason: "scan thread panicked".to_string(),
            })??;
        Ok(Some(report))
    }
}
