//! Terminal display utilities for CLI output.
//!
//! Provides styled tables and progress bars.

pub mod progress;
pub mod tables;

pub use progress::{ScanProgress, create_progress_bar, create_spinner};
pub use tables::{
    TableBuilder, create_group_stats_table, create_groups_table, create_scan_summary_table,
};
