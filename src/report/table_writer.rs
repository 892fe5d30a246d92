//! Console tables (comfy-table)

use super::writer_backend::{ReportError, ReportWriterBackend};
use super::{format_optional_pct, format_optional_value, format_value, ReportView};
use crate::ingest_core::GroupBy;
use comfy_table::{presets::UTF8_FULL, Cell, CellAlignment, ContentArrangement, Table};
use std::io::Write;

fn new_table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(header.iter().map(|h| Cell::new(*h)).collect::<Vec<_>>());
    table
}

fn number_cell(text: String) -> Cell {
    Cell::new(text).set_alignment(CellAlignment::Right)
}

pub fn render_records_table(view: &ReportView<'_>) -> Table {
    let mut table = new_table(&["Entity", "Name", "Period", "Metric", "Value", "Unit", "Source", "Check"]);
    for r in view.records {
        let check = match &r.anomaly {
            Some(flag) => format!("⚠ {} ×{:.2}", flag.kind.as_str(), flag.ratio),
            None => String::new(),
        };
        table.add_row(vec![
            Cell::new(&r.entity_id),
            Cell::new(view.entities.name_of(&r.entity_id)),
            Cell::new(r.period),
            Cell::new(&r.metric_name),
            number_cell(format_value(r.value)),
            Cell::new(&r.unit),
            Cell::new(r.source.as_str()),
            Cell::new(check),
        ]);
    }
    table
}

pub fn render_trends_table(view: &ReportView<'_>) -> Table {
    let mut table = new_table(&[
        "Entity", "Name", "Metric", "Periods", "Mean", "Min", "Max", "Slope", "Trend/yr", "CAGR", "R²",
    ]);
    for t in view.trends {
        table.add_row(vec![
            Cell::new(&t.entity_id),
            Cell::new(view.entities.name_of(&t.entity_id)),
            Cell::new(&t.metric_name),
            Cell::new(format!("{}–{} ({})", t.first_period, t.last_period, t.points)),
            number_cell(format_value(t.mean)),
            number_cell(format_value(t.min)),
            number_cell(format_value(t.max)),
            number_cell(format!("{:.3}", t.slope)),
            number_cell(format_optional_pct(Some(t.annual_change_rate))),
            number_cell(format_optional_pct(t.cagr)),
            number_cell(format!("{:.3}", t.r_squared)),
        ]);
    }
    table
}

pub fn render_changes_table(view: &ReportView<'_>) -> Table {
    let mut table = new_table(&["Entity", "Name", "Metric", "From", "To", "Start", "End", "Change", "Change %"]);
    for c in view.changes {
        table.add_row(vec![
            Cell::new(&c.entity_id),
            Cell::new(view.entities.name_of(&c.entity_id)),
            Cell::new(&c.metric_name),
            Cell::new(c.start_period),
            Cell::new(c.end_period),
            number_cell(format_value(c.start)),
            number_cell(format_value(c.end)),
            number_cell(format_value(c.change_abs)),
            number_cell(format_optional_pct(c.change_pct)),
        ]);
    }
    table
}

pub fn render_correlations_table(view: &ReportView<'_>) -> Table {
    let mut table = new_table(&["Metric A", "Metric B", "r", "Samples", "Strong"]);
    for c in view.correlations {
        table.add_row(vec![
            Cell::new(&c.metric_a),
            Cell::new(&c.metric_b),
            number_cell(format!("{:+.3}", c.r)),
            Cell::new(c.samples),
            Cell::new(if c.strong { "yes" } else { "" }),
        ]);
    }
    table
}

pub fn render_statistics_table(view: &ReportView<'_>) -> Table {
    let mut table = new_table(&["By", "Group", "Metric", "Count", "Mean", "Median", "Std", "Min", "Max"]);
    for s in view.statistics {
        let group = match s.group_by {
            GroupBy::Entity => format!("{} {}", s.group, view.entities.name_of(&s.group)),
            _ => s.group.clone(),
        };
        table.add_row(vec![
            Cell::new(s.group_by.as_str()),
            Cell::new(group),
            Cell::new(&s.metric_name),
            number_cell(s.stats.count.to_string()),
            number_cell(format_value(s.stats.mean)),
            number_cell(format_value(s.stats.median)),
            number_cell(format_optional_value(s.stats.std)),
            number_cell(format_value(s.stats.min)),
            number_cell(format_value(s.stats.max)),
        ]);
    }
    table
}

pub fn render_failures_table(view: &ReportView<'_>) -> Table {
    let mut table = new_table(&["Entity", "Period", "Error", "Message", "At"]);
    for f in view.failures {
        table.add_row(vec![
            Cell::new(&f.entity_id),
            Cell::new(f.period),
            Cell::new(&f.error_kind),
            Cell::new(&f.message),
            Cell::new(f.timestamp.to_rfc3339()),
        ]);
    }
    table
}

/// Renders each non-empty section as a titled table
pub fn render_report(view: &ReportView<'_>) -> String {
    let sections = [
        ("Merged records", view.records.len(), render_records_table(view)),
        ("Trends", view.trends.len(), render_trends_table(view)),
        ("Period changes", view.changes.len(), render_changes_table(view)),
        ("Metric correlations", view.correlations.len(), render_correlations_table(view)),
        ("Group statistics", view.statistics.len(), render_statistics_table(view)),
        ("Fetch failures", view.failures.len(), render_failures_table(view)),
    ];

    let mut out = String::new();
    for (title, rows, table) in sections {
        if rows == 0 {
            continue;
        }
        out.push_str(&format!("\n📊 {} ({})\n{}\n", title, rows, table));
    }
    out
}

pub struct TableReportWriter {
    out: Box<dyn Write>,
}

impl TableReportWriter {
    pub fn new(out: Box<dyn Write>) -> Self {
        Self { out }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }
}

impl ReportWriterBackend for TableReportWriter {
    fn write_report(&mut self, view: &ReportView<'_>) -> Result<(), ReportError> {
        self.out.write_all(render_report(view).as_bytes())?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), ReportError> {
        self.out.flush()?;
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "Table"
    }
}
