//! Progress reporting for scan operations

use crate::types::ProgressStatus;
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Maximum number of per-file errors kept in a report.
pub const MAX_REPORTED_ERRORS: usize = 100;

/// Lifecycle of one scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    NotStarted,
    Running,
    Completed,
    Canceled,
    /// Too many provider exceptions; the scan stopped early.
    Aborted,
}

/// Terminal item outcomes counted during a scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanCounts {
    pub skipped: usize,
    pub updated: usize,
    pub canceled: usize,
    pub failed: usize,
    pub exception: usize,
}

impl ScanCounts {
    pub fn record(&mut self, status: ProgressStatus) {
        match status {
            ProgressStatus::Skipped => self.skipped += 1,
            ProgressStatus::Updated => self.updated += 1,
            ProgressStatus::Canceled => self.canceled += 1,
            ProgressStatus::Failed => self.failed += 1,
            ProgressStatus::Exception => self.exception += 1,
            _ => {}
        }
    }

    /// Items whose outcome blocks reconciliation.
    pub fn problems(&self) -> usize {
        self.exception + self.failed + self.canceled
    }

    pub fn processed(&self) -> usize {
        self.skipped + self.updated + self.canceled + self.failed + self.exception
    }
}

/// Event published while a scan runs.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    Started {
        roots: Vec<PathBuf>,
    },
    FileStarted {
        path: PathBuf,
    },
    FileFinished {
        path: PathBuf,
        status: ProgressStatus,
        counts: ScanCounts,
    },
    Reconciled {
        rows_deleted: usize,
        groups_pruned: usize,
    },
    Finished {
        state: ScanState,
        counts: ScanCounts,
    },
}

/// Detachable, non-blocking event publisher.
///
/// Clones share one slot. Detaching empties the slot for every clone, after
/// which events are dropped. A full or disconnected channel drops the event.
#[derive(Debug, Clone, Default)]
pub struct ProgressSink {
    slot: Arc<Mutex<Option<Sender<ScanEvent>>>>,
}

impl ProgressSink {
    pub fn new(sender: Sender<ScanEvent>) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(sender))),
        }
    }

    pub fn detached() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: ScanEvent) {
        if let Some(sender) = self.slot.lock().as_ref() {
            let _ = sender.try_send(event);
        }
    }

    pub fn detach(&self) {
        self.slot.lock().take();
    }

    pub fn is_attached(&self) -> bool {
        self.slot.lock().is_some()
    }
}

/// Outcome of a scan
#[derive(Debug)]
pub struct ScanReport {
    pub state: ScanState,
    pub counts: ScanCounts,
    /// Files handed to the indexer
    pub files_seen: usize,
    /// Stale file and part rows deleted after a clean scan
    pub rows_reconciled: usize,
    pub groups_pruned: usize,
    pub elapsed: Duration,
    /// Errors encountered (limited to first N errors)
    pub errors: Vec<(PathBuf, String)>,

    start_time: Option<Instant>,
}

impl ScanReport {
    /// Create a report and start timing
    pub fn new() -> Self {
        Self {
            state: ScanState::NotStarted,
            counts: ScanCounts::default(),
            files_seen: 0,
            rows_reconciled: 0,
            groups_pruned: 0,
            elapsed: Duration::ZERO,
            errors: Vec::new(),
            start_time: Some(Instant::now()),
        }
    }

    /// Stop timing and record elapsed time
    pub fn stop_timing(&mut self) {
        if let Some(start) = self.start_time {
            self.elapsed = start.elapsed();
            self.start_time = None;
        }
    }

    /// Add an error (limited to first 100 errors)
    pub fn add_error(&mut self, path: PathBuf, error: String) {
        if self.errors.len() < MAX_REPORTED_ERRORS {
            self.errors.push((path, error));
        }
    }

    /// Display the report in a human-readable format
    pub fn display(&self) {
        let state = match self.state {
            ScanState::NotStarted => "Not started",
            ScanState::Running => "Running",
            ScanState::Completed => "Complete",
            ScanState::Canceled => "Canceled",
            ScanState::Aborted => "Aborted",
        };
        println!("\nScan {state}:");
        println!("  Files seen: {}", self.files_seen);
        println!("  Updated: {}", self.counts.updated);
        println!("  Skipped: {}", self.counts.skipped);
        println!("  Failed: {}", self.counts.failed);
        println!("  Exceptions: {}", self.counts.exception);
        if self.counts.canceled > 0 {
            println!("  Canceled: {}", self.counts.canceled);
        }
        println!("  Stale rows removed: {}", self.rows_reconciled);
        println!("  Time elapsed: {:.2}s", self.elapsed.as_secs_f64());

        if !self.errors.is_empty() {
            println!("\nErrors (showing first {}):", self.errors.len().min(5));
            for (path, error) in &self.errors[..5.min(self.errors.len())] {
                println!("  {}: {}", path.display(), error);
            }
            if self.errors.len() > 5 {
                println!("  ... and {} more errors", self.errors.len() - 5);
            }
        }
    }
}

impl Default for ScanReport {
    fn default() -> Self {
        Self::new()
    }
}
