//! Table formatting utilities for structured output.

use crate::indexing::ScanReport;
use crate::storage::{Group, GroupStat};
use comfy_table::{
    Attribute, Cell, CellAlignment, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL,
};

/// Builder for creating formatted tables.
pub struct TableBuilder {
    table: Table,
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TableBuilder {
    /// Create a new table builder.
    pub fn new() -> Self {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.apply_modifier(UTF8_ROUND_CORNERS);
        Self { table }
    }

    /// Set the table headers.
    pub fn set_headers(mut self, headers: Vec<&str>) -> Self {
        let header_cells: Vec<Cell> = headers
            .into_iter()
            .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
            .collect();
        self.table.set_header(header_cells);
        self
    }

    /// Add a row to the table.
    pub fn add_row(mut self, row: Vec<String>) -> Self {
        self.table.add_row(row);
        self
    }

    /// Build and return the formatted table.
    pub fn build(self) -> String {
        self.table.to_string()
    }
}

/// Part counts per group, with a total row.
pub fn create_group_stats_table(stats: &[GroupStat]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.apply_modifier(UTF8_ROUND_CORNERS);

    table.set_header(vec![
        Cell::new("Group").add_attribute(Attribute::Bold),
        Cell::new("Flag").add_attribute(Attribute::Bold),
        Cell::new("Label").add_attribute(Attribute::Bold),
        Cell::new("Parts").add_attribute(Attribute::Bold),
    ]);

    let mut total = 0;
    for stat in stats {
        total += stat.part_count;
        table.add_row(vec![
            Cell::new(&stat.group_name),
            Cell::new(format!("{:#b}", stat.group_flag.bits())),
            Cell::new(&stat.flag_name),
            Cell::new(stat.part_count).set_alignment(CellAlignment::Right),
        ]);
    }

    if stats.len() > 1 {
        table.add_row(vec![
            Cell::new("TOTAL").add_attribute(Attribute::Bold),
            Cell::new(""),
            Cell::new(""),
            Cell::new(total)
                .add_attribute(Attribute::Bold)
                .set_alignment(CellAlignment::Right),
        ]);
    }

    table.to_string()
}

pub fn create_groups_table(groups: &[Group]) -> String {
    groups
        .iter()
        .fold(
            TableBuilder::new().set_headers(vec!["Group", "Flag", "Label"]),
            |builder, group| {
                builder.add_row(vec![
                    group.name.clone(),
                    group.flag.bits().to_string(),
                    group.flag_name.clone(),
                ])
            },
        )
        .build()
}

/// Summary table for a finished scan.
pub fn create_scan_summary_table(report: &ScanReport) -> String {
    let counts = &report.counts;
    TableBuilder::new()
        .set_headers(vec!["Metric", "Value"])
        .add_row(vec!["State".to_string(), format!("{:?}", report.state)])
        .add_row(vec!["Files seen".to_string(), report.files_seen.to_string()])
        .add_row(vec!["Updated".to_string(), counts.updated.to_string()])
        .add_row(vec!["Skipped".to_string(), counts.skipped.to_string()])
        .add_row(vec!["Failed".to_string(), counts.failed.to_string()])
        .add_row(vec!["Exceptions".to_string(), counts.exception.to_string()])
        .add_row(vec![
            "Stale rows removed".to_string(),
            report.rows_reconciled.to_string(),
        ])
        .add_row(vec![
            "Time".to_string(),
            format!("{:.2}s", report.elapsed.as_secs_f64()),
        ])
        .build()
}
