//! Progress tracking utilities for long-running operations.

use crate::indexing::{ScanEvent, ScanState};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Create a styled progress bar for file processing.
pub fn create_progress_bar(total: u64, message: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-"),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Create a spinner for indeterminate progress.
pub fn create_spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

/// Renders scan events onto a progress bar.
///
/// The total is known up front from a dry walk; events only advance it.
pub struct ScanProgress {
    bar: ProgressBar,
}

impl ScanProgress {
    pub fn new(total_files: u64) -> Self {
        Self {
            bar: create_progress_bar(total_files, "Scanning"),
        }
    }

    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    pub fn bar(&self) -> &ProgressBar {
        &self.bar
    }

    /// Applies one event. Returns `true` once the scan has finished.
    pub fn apply(&self, event: &ScanEvent) -> bool {
        match event {
            ScanEvent::Started { roots } => {
                self.bar
                    .set_message(format!("Scanning {} root(s)", roots.len()));
            }
            ScanEvent::FileStarted { path } => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                self.bar.set_message(name);
            }
            ScanEvent::FileFinished { counts, .. } => {
                self.bar.set_position(counts.processed() as u64);
            }
            ScanEvent::Reconciled { rows_deleted, .. } => {
                self.bar
                    .set_message(format!("Removed {rows_deleted} stale rows"));
            }
            ScanEvent::Finished { state, counts } => {
                let label = match state {
                    ScanState::Completed => "done",
                    ScanState::Canceled => "canceled",
                    ScanState::Aborted => "aborted",
                    ScanState::NotStarted | ScanState::Running => "stopped",
                };
                self.bar.finish_with_message(format!(
                    "{label}: {} updated, {} skipped",
                    counts.updated, counts.skipped
                ));
                return true;
            }
        }
        false
    }
}
