//! CSV report rows
//!
//! Sections are written one after another, each with its own header row and
//! separated by a blank line.

use super::writer_backend::{ReportError, ReportWriterBackend};
use super::ReportView;
use serde::Serialize;
use std::io::Write;

/// Flat row shape for merged records (the anomaly flag is split into columns)
#[derive(Serialize)]
struct RecordRow<'a> {
    entity_id: &'a str,
    entity_name: &'a str,
    period: i32,
    metric_name: &'a str,
    value: f64,
    unit: &'a str,
    source: &'a str,
    anomaly: Option<&'static str>,
    anomaly_ratio: Option<f64>,
}

#[derive(Serialize)]
struct StatisticsRow<'a> {
    group_by: &'static str,
    group: &'a str,
    metric_name: &'a str,
    count: usize,
    mean: f64,
    median: f64,
    std: Option<f64>,
    min: f64,
    max: f64,
}

fn to_csv<S: Serialize>(rows: impl IntoIterator<Item = S>) -> Result<String, ReportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(row)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| ReportError::Io(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

pub fn render_records_csv(view: &ReportView<'_>) -> Result<String, ReportError> {
    to_csv(view.records.iter().map(|r| RecordRow {
        entity_id: &r.entity_id,
        entity_name: view.entities.name_of(&r.entity_id),
        period: r.period,
        metric_name: &r.metric_name,
        value: r.value,
        unit: &r.unit,
        source: r.source.as_str(),
        anomaly: r.anomaly.map(|a| a.kind.as_str()),
        anomaly_ratio: r.anomaly.map(|a| a.ratio),
    }))
}

pub fn render_trends_csv(view: &ReportView<'_>) -> Result<String, ReportError> {
    to_csv(view.trends)
}

pub fn render_changes_csv(view: &ReportView<'_>) -> Result<String, ReportError> {
    to_csv(view.changes)
}

pub fn render_correlations_csv(view: &ReportView<'_>) -> Result<String, ReportError> {
    to_csv(view.correlations)
}

pub fn render_statistics_csv(view: &ReportView<'_>) -> Result<String, ReportError> {
    to_csv(view.statistics.iter().map(|s| StatisticsRow {
        group_by: s.group_by.as_str(),
        group: &s.group,
        metric_name: &s.metric_name,
        count: s.stats.count,
        mean: s.stats.mean,
        median: s.stats.median,
        std: s.stats.std,
        min: s.stats.min,
        max: s.stats.max,
    }))
}

pub fn render_failures_csv(view: &ReportView<'_>) -> Result<String, ReportError> {
    to_csv(view.failures)
}

pub fn render_report(view: &ReportView<'_>) -> Result<String, ReportError> {
    let sections = [
        render_records_csv(view)?,
        render_trends_csv(view)?,
        render_changes_csv(view)?,
        render_correlations_csv(view)?,
        render_statistics_csv(view)?,
        render_failures_csv(view)?,
    ];

    Ok(sections
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n"))
}

pub struct CsvReportWriter {
    out: Box<dyn Write>,
}

impl CsvReportWriter {
    pub fn new(out: Box<dyn Write>) -> Self {
        Self { out }
    }
}

impl ReportWriterBackend for CsvReportWriter {
    fn write_report(&mut self, view: &ReportView<'_>) -> Result<(), ReportError> {
        self.out.write_all(render_report(view)?.as_bytes())?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), ReportError> {
        self.out.flush()?;
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "CSV"
    }
}
