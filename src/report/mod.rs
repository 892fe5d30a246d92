//! Reporter - console table, CSV, nested JSON and SQLite output
//!
//! Formatting only: every renderer borrows the analysis results immutably.
//!
//! ```text
//! ReportView (borrowed records, trends, changes, correlations, statistics, failures)
//!     ↓
//! ReportWriter (OutputMode router)
//!     ↓
//! TableReportWriter | CsvReportWriter | JsonReportWriter | SqliteReportWriter
//! ```

pub mod csv_writer;
pub mod json_writer;
pub mod sqlite_writer;
pub mod table_writer;
pub mod writer;
pub mod writer_backend;

pub use csv_writer::CsvReportWriter;
pub use json_writer::JsonReportWriter;
pub use sqlite_writer::SqliteReportWriter;
pub use table_writer::TableReportWriter;
pub use writer::{parse_output_mode_from_args, OutputMode, ReportWriter};
pub use writer_backend::{ReportError, ReportWriterBackend};

use crate::ingest_core::{
    EntityRegistry, GroupStatistics, MergedRecord, MetricCorrelation, PeriodChange, TrendSummary,
};
use crate::pipeline::collector::FetchFailure;

/// Everything a report renders, borrowed from the analysis run
#[derive(Clone, Copy)]
pub struct ReportView<'a> {
    pub entities: &'a EntityRegistry,
    pub records: &'a [MergedRecord],
    pub trends: &'a [TrendSummary],
    pub changes: &'a [PeriodChange],
    pub correlations: &'a [MetricCorrelation],
    pub statistics: &'a [GroupStatistics],
    pub failures: &'a [FetchFailure],
}

/// Fixed-precision number formatting shared by the text renderers
pub(crate) fn format_value(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{:.2}", value)
    }
}

pub(crate) fn format_optional_value(value: Option<f64>) -> String {
    value.map(format_value).unwrap_or_else(|| "n/a".to_string())
}

pub(crate) fn format_optional_pct(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:+.2}%", v),
        None => "n/a".to_string(),
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::ingest_core::{AnomalyFlag, AnomalyKind, DescriptiveStats, GroupBy, Source};
    use chrono::{TimeZone, Utc};

    pub fn create_test_registry() -> EntityRegistry {
        EntityRegistry::from_json(
            r#"[
                {"id": "11100", "name": "さいたま市", "parent_region_id": "11", "population": 1324000},
                {"id": "11203", "name": "川口市", "parent_region_id": "11", "population": 594000}
            ]"#,
        )
        .unwrap()
    }

    pub fn create_test_record(entity: &str, period: i32, value: f64, source: Source) -> MergedRecord {
        MergedRecord {
            entity_id: entity.to_string(),
            period,
            metric_name: "establishments".to_string(),
            value,
            unit: "件".to_string(),
            source,
            anomaly: None,
        }
    }

    pub fn create_test_records() -> Vec<MergedRecord> {
        let mut suspect = create_test_record("11100", 2014, 900.0, Source::Api);
        suspect.anomaly = Some(AnomalyFlag {
            kind: AnomalyKind::High,
            ratio: 9.0,
            neighbour_average: 100.0,
        });

        vec![
            create_test_record("11100", 2012, 100.0, Source::File),
            create_test_record("11100", 2012, 104.0, Source::Api),
            suspect,
            create_test_record("11100", 2021, 100.0, Source::File),
            create_test_record("11203", 2012, 40.0, Source::File),
        ]
    }

    pub fn create_test_trend() -> TrendSummary {
        TrendSummary {
            entity_id: "11100".to_string(),
            metric_name: "establishments".to_string(),
            mean: 101.0,
            min: 100.0,
            max: 102.0,
            slope: 0.0,
            annual_change_rate: 0.0,
            r_squared: 1.0,
            cagr: Some(0.0),
            first_period: 2012,
            last_period: 2021,
            points: 2,
        }
    }

    pub fn create_test_change() -> PeriodChange {
        PeriodChange {
            entity_id: "11100".to_string(),
            metric_name: "establishments".to_string(),
            start_period: 2012,
            end_period: 2021,
            start: 102.0,
            end: 100.0,
            change_abs: -2.0,
            change_pct: Some(-2.0 / 102.0 * 100.0),
        }
    }

    pub fn create_test_statistics() -> Vec<GroupStatistics> {
        let regional = GroupStatistics {
            group_by: GroupBy::Region,
            group: "11".to_string(),
            metric_name: "employeesPerEstablishment".to_string(),
            stats: DescriptiveStats {
                count: 4,
                mean: 7.25,
                median: 7.0,
                std: Some(1.5),
                min: 6.0,
                max: 9.0,
            },
        };
        let single = GroupStatistics {
            group_by: GroupBy::Entity,
            group: "11203".to_string(),
            metric_name: "establishments".to_string(),
            stats: DescriptiveStats {
                count: 1,
                mean: 40.0,
                median: 40.0,
                std: None,
                min: 40.0,
                max: 40.0,
            },
        };
        vec![regional, single]
    }

    pub fn create_test_failure() -> FetchFailure {
        FetchFailure {
            entity_id: "20202".to_string(),
            period: 2021,
            error_kind: "http".to_string(),
            message: "503 Service Unavailable".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }
}
