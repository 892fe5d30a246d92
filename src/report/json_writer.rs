//! Nested JSON report: entity → period → metric → per-source values

use super::writer_backend::{ReportError, ReportWriterBackend};
use super::ReportView;
use crate::ingest_core::AnomalyFlag;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::io::Write;

#[derive(Serialize, Default)]
struct MetricNode<'a> {
    unit: &'a str,
    values: BTreeMap<&'a str, f64>,
    anomalies: BTreeMap<&'a str, AnomalyFlag>,
}

#[derive(Serialize)]
struct EntityNode<'a> {
    name: &'a str,
    periods: BTreeMap<i32, BTreeMap<&'a str, MetricNode<'a>>>,
}

/// ```json
/// {"entities": {"11100": {"name": "...", "periods": {"2012": {"establishments":
///     {"unit": "件", "values": {"API": 104.0, "FILE": 100.0}, "anomalies": {}}}}}}}
/// ```
pub fn render_json(view: &ReportView<'_>) -> Value {
    let mut entities: BTreeMap<&str, EntityNode<'_>> = BTreeMap::new();

    for r in view.records {
        let entity = entities.entry(&r.entity_id).or_insert_with(|| EntityNode {
            name: view.entities.name_of(&r.entity_id),
            periods: BTreeMap::new(),
        });

        let metric = entity
            .periods
            .entry(r.period)
            .or_default()
            .entry(&r.metric_name)
            .or_default();
        metric.unit = &r.unit;
        metric.values.insert(r.source.as_str(), r.value);
        if let Some(flag) = r.anomaly {
            metric.anomalies.insert(r.source.as_str(), flag);
        }
    }

    json!({
        "entities": entities,
        "trends": view.trends,
        "period_changes": view.changes,
        "correlations": view.correlations,
        "statistics": view.statistics,
        "failures": view.failures,
    })
}

pub struct JsonReportWriter {
    out: Box<dyn Write>,
}

impl JsonReportWriter {
    pub fn new(out: Box<dyn Write>) -> Self {
        Self { out }
    }
}

impl ReportWriterBackend for JsonReportWriter {
    fn write_report(&mut self, view: &ReportView<'_>) -> Result<(), ReportError> {
        serde_json::to_writer_pretty(&mut self.out, &render_json(view))?;
        writeln!(self.out)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), ReportError> {
        self.out.flush()?;
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "JSON"
    }
}
