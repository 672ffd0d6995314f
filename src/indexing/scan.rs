//! Tree-wide scan with stale-row reconciliation
//!
//! A scan marks every row of its scope with the `Started` sentinel, walks the
//! roots and lets the indexer confirm (`Completed`) the rows it still needs.
//! Only a clean, uncanceled, unaborted run deletes what is left in `Started`.

use crate::error::{IndexError, IndexResult};
use crate::indexing::indexer::{IncrementalIndexer, IndexerOptions};
use crate::indexing::progress::{ProgressSink, ScanEvent, ScanReport, ScanState};
use crate::indexing::walker::{FileWalker, WalkOptions};
use crate::storage::SimilarityIndexStore;
use crate::types::{IndexScope, ProgressStatus};
use crate::vector::EmbeddingProvider;
use std::collections::HashSet;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default number of provider exceptions tolerated before a scan aborts.
pub const DEFAULT_MAX_EXCEPTIONS: usize = 5;

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub roots: Vec<PathBuf>,
    pub walk: WalkOptions,
    /// The scan aborts once more than this many items end in `Exception`.
    pub max_exceptions: usize,
    pub indexer: IndexerOptions,
    /// Label applied to the scope's group, if any.
    pub flag_name: Option<String>,
}

impl ScanOptions {
    pub fn new(roots: Vec<PathBuf>, indexer: IndexerOptions) -> Self {
        Self {
            roots,
            walk: WalkOptions::default(),
            max_exceptions: DEFAULT_MAX_EXCEPTIONS,
            indexer,
            flag_name: None,
        }
    }
}

/// Runs one scan of one scope.
pub struct ScanCoordinator {
    scope: IndexScope,
    options: ScanOptions,
    sink: ProgressSink,
}

impl ScanCoordinator {
    pub fn new(scope: IndexScope, options: ScanOptions) -> Self {
        Self {
            scope,
            options,
            sink: ProgressSink::detached(),
        }
    }

    pub fn with_progress(mut self, sink: ProgressSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn scope(&self) -> &IndexScope {
        &self.scope
    }

    /// Runs the scan to completion, cancellation or abort.
    ///
    /// Per-file problems are recorded in the report. Only storage failures in
    /// the sentinel pass or in reconciliation fail the call itself.
    pub fn run<S, P>(
        &self,
        store: &mut S,
        provider: &P,
        cancel: &CancellationToken,
    ) -> IndexResult<ScanReport>
    where
        S: SimilarityIndexStore + ?Sized,
        P: EmbeddingProvider + ?Sized,
    {
        let mut report = ScanReport::new();
        let roots = self.resolve_roots()?;
        let walker = FileWalker::new(self.options.walk.clone());
        // Pattern errors surface before any row is marked.
        let filters = roots
            .iter()
            .map(|root| walker.filter(root))
            .collect::<IndexResult<Vec<_>>>()?;
        let indexer = IncrementalIndexer::new(provider, &self.options.indexer);

        // A scan superseded before it got the store must not touch it.
        if cancel.is_cancelled() {
            report.state = ScanState::Canceled;
            report.stop_timing();
            return Ok(report);
        }

        store.upsert_group(
            &self.scope.group_name,
            self.scope.group_flag,
            self.options.flag_name.as_deref(),
        )?;
        let marked = store.set_state(&self.scope, ProgressStatus::Started)?;
        info!("Scanning {} root(s) for {}, {marked} rows marked", roots.len(), self.scope);

        report.state = ScanState::Running;
        self.sink.emit(ScanEvent::Started {
            roots: roots.clone(),
        });

        let mut seen = HashSet::new();
        let mut aborted = false;
        'roots: for (root, filter) in roots.iter().zip(filters) {
            for path in walker.walk_filtered(root, filter) {
                if cancel.is_cancelled() || aborted {
                    break 'roots;
                }
                if !seen.insert(path.clone()) {
                    continue;
                }

                report.files_seen += 1;
                self.sink.emit(ScanEvent::FileStarted { path: path.clone() });

                let status = match indexer.index_file(store, &self.scope, &path, cancel) {
                    Ok(outcome) => outcome.status(),
                    Err(e) => {
                        let status = if e.is_file_failure() {
                            ProgressStatus::Failed
                        } else {
                            ProgressStatus::Exception
                        };
                        warn!("{} {status}: {e}", path.display());
                        report.add_error(path.clone(), e.to_string());
                        status
                    }
                };
                report.counts.record(status);
                debug!("{} -> {status}", path.display());

                if status == ProgressStatus::Exception
                    && report.counts.exception > self.options.max_exceptions
                {
                    warn!(
                        "Aborting scan after {} exceptions (limit {})",
                        report.counts.exception, self.options.max_exceptions
                    );
                    aborted = true;
                }

                self.sink.emit(ScanEvent::FileFinished {
                    path,
                    status,
                    counts: report.counts,
                });
            }
        }

        report.state = if cancel.is_cancelled() {
            ScanState::Canceled
        } else if aborted {
            ScanState::Aborted
        } else {
            ScanState::Completed
        };

        if report.state == ScanState::Completed && report.counts.problems() == 0 {
            report.rows_reconciled = store.delete_by_state(&self.scope, ProgressStatus::Started)?;
            report.groups_pruned = store.prune_groups()?;
            info!(
                "Reconciled {}: {} stale rows, {} groups pruned",
                self.scope, report.rows_reconciled, report.groups_pruned
            );
            self.sink.emit(ScanEvent::Reconciled {
                rows_deleted: report.rows_reconciled,
                groups_pruned: report.groups_pruned,
            });
        } else {
            info!(
                "Skipping reconciliation for {} (state {:?}, {} problem items)",
                self.scope,
                report.state,
                report.counts.problems()
            );
        }

        report.stop_timing();
        self.sink.emit(ScanEvent::Finished {
            state: report.state,
            counts: report.counts,
        });
        Ok(report)
    }

    fn resolve_roots(&self) -> IndexResult<Vec<PathBuf>> {
        let mut roots = Vec::with_capacity(self.options.roots.len());
        for root in &self.options.roots {
            let resolved = root
                .canonicalize()
                .map_err(|_| IndexError::InvalidRoot { path: root.clone() })?;
            if !resolved.is_dir() {
                return Err(IndexError::InvalidRoot { path: root.clone() });
            }
            roots.push(resolved);
        }
        Ok(roots)
    }
}
