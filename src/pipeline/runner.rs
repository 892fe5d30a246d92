//! End-to-end analysis run
//!
//! read files → extract → aggregate → (API rows) → merge → trends,
//! period changes and correlations

use super::collector::{collect_batched, CollectorConfig, FetchFailure};
use super::source::{FetchTarget, StatsSource};
use super::PipelineError;
use crate::ingest_core::ratios::derive_ratios;
use crate::ingest_core::trend::DEFAULT_PERIOD_BOUNDARIES;
use crate::ingest_core::{
    compare_periods, compute_trend, describe_groups, AggregateKey, CorrelationEngine, CsvEncoding, CsvFileReader,
    EntityRegistry, ExtractorConfig, MergeConfig, MergedDataset, Merger, MetricAggregator,
    GroupStatistics, MetricCorrelation, MetricValues, PeriodChange, RawRow, RowExtractor, Source, SourcedAggregate,
    TrendError, TrendSummary,
};
use crate::report::ReportView;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

/// A CSV extract and the layout its columns follow
#[derive(Debug, Clone, PartialEq)]
pub struct FileInput {
    pub path: PathBuf,
    pub layout: String,
}

impl FileInput {
    pub fn new(path: impl Into<PathBuf>, layout: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            layout: layout.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    pub extractor: ExtractorConfig,
    pub merge: MergeConfig,
    pub files: Vec<FileInput>,
    pub encoding: CsvEncoding,
    pub skip_lines: usize,
    pub period_boundaries: Vec<(i32, i32)>,
    pub strong_correlation: f64,
    /// Entity id → parent region id, for regional statistics
    pub regions: BTreeMap<String, String>,
}

impl AnalysisOptions {
    pub fn new(extractor: ExtractorConfig, merge: MergeConfig, files: Vec<FileInput>) -> Self {
        Self {
            extractor,
            merge,
            files,
            encoding: CsvEncoding::default(),
            skip_lines: 0,
            period_boundaries: DEFAULT_PERIOD_BOUNDARIES.to_vec(),
            strong_correlation: 0.7,
            regions: BTreeMap::new(),
        }
    }
}

/// API collection request for one run
pub struct ApiCollection {
    pub source: Arc<dyn StatsSource>,
    pub targets: Vec<FetchTarget>,
    pub config: CollectorConfig,
}

#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub dataset: MergedDataset,
    /// Trusted per-(entity, period) values plus derived ratios
    pub groups: BTreeMap<AggregateKey, MetricValues>,
    pub trends: Vec<TrendSummary>,
    pub trend_errors: Vec<TrendError>,
    pub changes: Vec<PeriodChange>,
    pub correlations: Vec<MetricCorrelation>,
    pub statistics: Vec<GroupStatistics>,
    pub failures: Vec<FetchFailure>,
}

impl AnalysisReport {
    pub fn view<'a>(&'a self, entities: &'a EntityRegistry) -> ReportView<'a> {
        ReportView {
            entities,
            records: self.dataset.records(),
            trends: &self.trends,
            changes: &self.changes,
            correlations: &self.correlations,
            statistics: &self.statistics,
            failures: &self.failures,
        }
    }
}

/// Read every configured extract; any absent file fails the whole run
pub fn read_file_inputs(options: &AnalysisOptions) -> Result<Vec<RawRow>, PipelineError> {
    let mut rows = Vec::new();
    for input in &options.files {
        let reader = CsvFileReader::new(&input.path, input.layout.clone())
            .with_encoding(options.encoding)
            .with_skip_lines(options.skip_lines);
        rows.extend(reader.read()?);
    }
    Ok(rows)
}

/// Pure analysis over already-loaded rows
///
/// `api_rows` is `None` when the API was not consulted; an empty slice means
/// it was consulted and returned nothing.
pub fn analyze(
    options: &AnalysisOptions,
    file_rows: Option<&[RawRow]>,
    api_rows: Option<&[RawRow]>,
    failures: Vec<FetchFailure>,
) -> Result<AnalysisReport, PipelineError> {
    let extractor = RowExtractor::new(options.extractor.clone());

    let mut inputs = Vec::new();
    for (source, rows) in [(Source::File, file_rows), (Source::Api, api_rows)] {
        if let Some(rows) = rows {
            let records = extractor.extract_all(rows, source);
            inputs.push(SourcedAggregate::new(source, MetricAggregator::from_records(&records)));
        }
    }

    let dataset = Merger::new(options.merge.clone()).merge(&inputs)?;

    let base_groups = dataset.group_values(true);
    let groups: BTreeMap<AggregateKey, MetricValues> = base_groups
        .iter()
        .map(|(key, values)| {
            let mut all = values.clone();
            all.extend(derive_ratios(values));
            (key.clone(), all)
        })
        .collect();

    let mut series: BTreeMap<(String, String), Vec<(i32, f64)>> = BTreeMap::new();
    for (key, values) in &groups {
        for (metric, value) in values {
            series
                .entry((key.entity_id.clone(), metric.clone()))
                .or_default()
                .push((key.period, *value));
        }
    }

    let mut trends = Vec::new();
    let mut trend_errors = Vec::new();
    let mut changes = Vec::new();
    for ((entity_id, metric), points) in &series {
        match compute_trend(entity_id, metric, points) {
            Ok(summary) => trends.push(summary),
            Err(e) => {
                log::warn!("⚠️  {}", e);
                trend_errors.push(e);
            }
        }
        changes.extend(compare_periods(entity_id, metric, points, &options.period_boundaries));
    }

    let correlations = CorrelationEngine::new(options.strong_correlation).correlate(&base_groups);
    let statistics = describe_groups(&groups, &options.regions);

    let entities: BTreeSet<&str> = groups.keys().map(|k| k.entity_id.as_str()).collect();
    log::info!(
        "📈 Analysis: {} entities, {} trends ({} undefined), {} period changes, {} suspect records",
        entities.len(),
        trends.len(),
        trend_errors.len(),
        changes.len(),
        dataset.suspect_records().len()
    );

    Ok(AnalysisReport {
        dataset,
        groups,
        trends,
        trend_errors,
        changes,
        correlations,
        statistics,
        failures,
    })
}

/// Full run: files, then (optionally) the API, then analysis
pub async fn run_analysis(
    options: &AnalysisOptions,
    api: Option<ApiCollection>,
) -> Result<AnalysisReport, PipelineError> {
    let file_rows = if options.files.is_empty() {
        None
    } else {
        Some(read_file_inputs(options)?)
    };

    let (api_rows, failures) = match api {
        Some(api) => {
            let report = collect_batched(api.source, api.targets, api.config).await;
            (Some(report.rows), report.failures)
        }
        None => (None, Vec::new()),
    };

    analyze(options, file_rows.as_deref(), api_rows.as_deref(), failures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest_core::{GroupBy, MergeError};

    fn create_test_options() -> AnalysisOptions {
        AnalysisOptions::new(
            ExtractorConfig::new(["11100".to_string(), "11203".to_string()]),
            MergeConfig::default(),
            Vec::new(),
        )
    }

    fn create_test_row(layout: &str, area: &str, metric: &str, value: &str) -> RawRow {
        RawRow::new(layout)
            .with_field("地域コード", area)
            .with_field("産業分類コード", "58")
            .with_field("表章項目", metric)
            .with_field("値", value)
    }

    fn create_test_file_rows() -> Vec<RawRow> {
        vec![
            create_test_row("commerce_2007", "11100", "事業所数", "100"),
            create_test_row("commerce_2007", "11100", "従業者数", "800"),
            create_test_row("census_2012", "11100", "事業所数", "150"),
            create_test_row("census_2012", "11100", "従業者数", "1,300"),
            create_test_row("census_2021", "11100", "事業所数", "259"),
            create_test_row("census_2021", "11100", "従業者数", "2,000"),
            create_test_row("census_2012", "11203", "事業所数", "40"),
            create_test_row("census_2012", "13101", "事業所数", "999"),
        ]
    }

    #[test]
    fn test_no_sources_is_missing_input() {
        let result = analyze(&create_test_options(), None, None, Vec::new());
        assert!(matches!(result, Err(PipelineError::Merge(MergeError::NoInputs))));
    }

    #[test]
    fn test_file_only_analysis() {
        let rows = create_test_file_rows();
        let report = analyze(&create_test_options(), Some(&rows), None, Vec::new()).unwrap();

        assert_eq!(report.dataset.len(), 7);
        assert!(report.dataset.entities().iter().all(|e| e != "13101"));

        let trend = report
            .trends
            .iter()
            .find(|t| t.entity_id == "11100" && t.metric_name == "establishments")
            .unwrap();
        assert_eq!(trend.points, 3);
        assert_eq!(trend.min, 100.0);

        let ratio_trend = report
            .trends
            .iter()
            .find(|t| t.metric_name == "employeesPerEstablishment")
            .unwrap();
        assert_eq!(ratio_trend.first_period, 2007);

        // 11203 has a single period
        assert!(report.trend_errors.iter().any(|e| matches!(
            e,
            TrendError::InsufficientPoints { entity_id, .. } if entity_id == "11203"
        )));

        let est_changes: Vec<&PeriodChange> = report
            .changes
            .iter()
            .filter(|c| c.entity_id == "11100" && c.metric_name == "establishments")
            .collect();
        assert_eq!(est_changes.len(), 2);
        assert_eq!(est_changes[0].change_pct, Some(50.0));
    }

    #[test]
    fn test_grouped_statistics_by_region() {
        let rows = create_test_file_rows();
        let mut options = create_test_options();
        options.regions = [("11100", "11"), ("11203", "11")]
            .iter()
            .map(|(e, r)| (e.to_string(), r.to_string()))
            .collect();

        let report = analyze(&options, Some(&rows), None, Vec::new()).unwrap();
        let find = |group_by: GroupBy, group: &str, metric: &str| {
            report
                .statistics
                .iter()
                .find(|s| s.group_by == group_by && s.group == group && s.metric_name == metric)
                .map(|s| s.stats)
                .unwrap()
        };

        let region = find(GroupBy::Region, "11", "establishments");
        assert_eq!(region.count, 4);
        assert_eq!(region.max, 259.0);

        let period = find(GroupBy::Period, "2012", "establishments");
        assert_eq!(period.count, 2);
        assert_eq!(period.mean, 95.0);

        // 800/100, 1300/150, 2000/259
        let efficiency = find(GroupBy::Entity, "11100", "employeesPerEstablishment");
        assert_eq!(efficiency.count, 3);
        assert_eq!(efficiency.median, 8.0);

        let entities = EntityRegistry::default();
        assert_eq!(report.view(&entities).statistics.len(), report.statistics.len());
    }

    #[test]
    fn test_lone_api_outlier_flagged_but_kept() {
        let files = create_test_file_rows();
        let api = vec![RawRow::new("estat_api")
            .with_field("@area", "11100")
            .with_field("@time", "2014000000")
            .with_field("@cat01", "58")
            .with_field("tab_name", "事業所数")
            .with_field("$", "9,000")];

        let report = analyze(&create_test_options(), Some(&files), Some(&api), Vec::new()).unwrap();

        let suspects = report.dataset.suspect_records();
        assert_eq!(suspects.len(), 1);
        assert_eq!(suspects[0].source, Source::Api);
        assert_eq!(suspects[0].period, 2014);

        // the only 2014 value is suspect, so it is kept rather than dropped
        assert_eq!(
            report.groups[&AggregateKey::new("11100", 2014)]["establishments"],
            9000.0
        );
    }

    #[tokio::test]
    async fn test_missing_file_fails_run() {
        let mut options = create_test_options();
        options.files.push(FileInput::new("/nonexistent/census_2012.csv", "census_2012"));

        let result = run_analysis(&options, None).await;
        assert!(matches!(result, Err(PipelineError::Reader(_))));
    }
}
